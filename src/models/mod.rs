//! Machine learning models module
//!
//! This module provides:
//! - A leaf-wise gradient boosted tree ensemble for binary direction
//! - Model training, prediction, and evaluation utilities

pub mod gbm;
pub mod metrics;
pub mod tree;

pub use gbm::{
    sigmoid, BoostingEngine, GbdtEngine, GbmClassifier, GbmParams, Metric, ModelError, Objective,
    TrainedModel,
};
pub use metrics::{Evaluator, ModelMetrics};
pub use tree::Tree;
