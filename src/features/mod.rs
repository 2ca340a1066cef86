//! Feature engineering module
//!
//! This module provides:
//! - Ring-buffer backed rolling indicators (SMA, RSI, returns)
//! - Feature engineering for the direction classifier
//! - Next-day direction labels

pub mod buffer;
pub mod engineering;
pub mod labels;
pub mod technical;

pub use engineering::{FeatureConfig, FeatureEngineer};
pub use labels::LabelGenerator;
