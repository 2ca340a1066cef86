//! Held-out evaluation of a trained classifier

use serde::{Deserialize, Serialize};
use std::fmt;

use super::gbm::{ModelError, TrainedModel};
use crate::data::Dataset;

/// Evaluation metrics for the direction classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Share of rows where `p > 0.5` equals the stored label
    pub accuracy: f64,
    /// `1 - accuracy`
    pub binary_error: f64,
    /// Mean negative log-likelihood
    pub log_loss: f64,
    /// Share of positive labels in the evaluated set
    pub positive_rate: f64,
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Calculate classification metrics from labels (0/1) and positive-class probabilities
    pub fn classification(y_true: &[f64], proba: &[f64]) -> Option<Self> {
        let n = y_true.len();
        if n == 0 || n != proba.len() {
            return None;
        }

        let correct = y_true
            .iter()
            .zip(proba)
            .filter(|(t, p)| (**p > 0.5) == (**t > 0.5))
            .count();
        let accuracy = correct as f64 / n as f64;

        let eps = 1e-15;
        let log_loss = y_true
            .iter()
            .zip(proba)
            .map(|(t, p)| {
                let p = p.clamp(eps, 1.0 - eps);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum::<f64>()
            / n as f64;

        Some(Self {
            accuracy,
            binary_error: 1.0 - accuracy,
            log_loss,
            positive_rate: y_true.iter().sum::<f64>() / n as f64,
            n_samples: n,
        })
    }
}

impl fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accuracy {:.4}, binary_error {:.4}, log_loss {:.4} ({} rows, {:.1}% up)",
            self.accuracy,
            self.binary_error,
            self.log_loss,
            self.n_samples,
            self.positive_rate * 100.0
        )
    }
}

/// Scores a trained model against a labeled dataset
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, model: &TrainedModel, dataset: &Dataset) -> Result<ModelMetrics, ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::DataShape("test set is empty".to_string()));
        }
        let proba = model.predict_proba(dataset.features_array().view())?.to_vec();
        let labels = dataset.labels_array().to_vec();

        ModelMetrics::classification(&labels, &proba)
            .ok_or_else(|| ModelError::DataShape("prediction count does not match labels".to_string()))
    }
}
