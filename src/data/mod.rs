//! Data module for loading and holding price data
//!
//! This module provides:
//! - CSV loading of daily price bars
//! - Data types for bars, feature rows and labeled examples
//! - Dataset structures and the chronological train/test split

pub mod loader;
pub mod split;
pub mod types;

pub use loader::{DataLoader, REQUIRED_COLUMNS};
pub use split::DatasetSplitter;
pub use types::{
    Dataset, FeatureRow, LabeledExample, PriceBar, FEATURE_COLUMNS, NUM_FEATURES,
};
