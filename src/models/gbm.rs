//! Gradient Boosting Machine implementation
//!
//! This module provides a gradient boosted decision tree classifier for the
//! binary next-day direction target, plus the training, prediction and
//! validation-monitoring utilities around it.
//!
//! The boosting engine is hidden behind [`BoostingEngine`] so the pipeline
//! only depends on `fit` and `predict`.

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use super::tree::{Tree, TreeLearner};
use crate::data::{Dataset, FEATURE_COLUMNS};

/// Clamp used when turning probabilities into log-odds
const PROBABILITY_EPSILON: f64 = 1e-15;

/// Errors that can occur with the model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Data shape error: {0}")]
    DataShape(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Binary log-loss with a sigmoid link
    Binary,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Binary => write!(f, "binary"),
        }
    }
}

/// Metric tracked on the validation set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of rows where `p > 0.5` disagrees with the label
    BinaryError,
    /// Mean negative log-likelihood
    BinaryLogloss,
}

impl Metric {
    /// Evaluate on raw scores
    pub fn compute(&self, raw_scores: &[f64], labels: &[f64]) -> f64 {
        if labels.is_empty() {
            return f64::NAN;
        }
        let n = labels.len() as f64;
        match self {
            Metric::BinaryError => {
                let wrong = raw_scores
                    .iter()
                    .zip(labels)
                    .filter(|(score, label)| (sigmoid(**score) > 0.5) != (**label > 0.5))
                    .count();
                wrong as f64 / n
            }
            Metric::BinaryLogloss => {
                raw_scores
                    .iter()
                    .zip(labels)
                    .map(|(score, label)| {
                        let p = sigmoid(*score).clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                        -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / n
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::BinaryError => write!(f, "binary_error"),
            Metric::BinaryLogloss => write!(f, "binary_logloss"),
        }
    }
}

/// GBM hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    pub objective: Objective,
    pub metric: Metric,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum number of leaves per tree
    pub num_leaves: usize,
    /// Number of boosting iterations (trees); all of them are kept
    pub num_boost_round: usize,
    /// Minimum samples in a leaf
    pub min_data_in_leaf: usize,
    /// Minimum hessian sum in a leaf
    pub min_sum_hessian_in_leaf: f64,
    /// L2 regularization on leaf values
    pub lambda_l2: f64,
    /// Minimum gain required to split
    pub min_gain_to_split: f64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            objective: Objective::Binary,
            metric: Metric::BinaryError,
            learning_rate: 0.05,
            num_leaves: 31,
            num_boost_round: 200,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            lambda_l2: 0.0,
            min_gain_to_split: 0.0,
        }
    }
}

/// Logistic link
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// A fitted tree ensemble and its training metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub objective: Objective,
    pub metric: Metric,
    pub feature_names: Vec<String>,
    /// Trees in boosting order; the initial score is folded into the first
    pub trees: Vec<Tree>,
    /// Log-odds of the training positive rate
    pub init_score: f64,
    pub learning_rate: f64,
    /// Rounds requested at training time
    pub num_boost_round: usize,
    /// Validation metric after each round (empty without a validation set)
    pub valid_history: Vec<f64>,
}

impl TrainedModel {
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Boosting rounds actually present in the ensemble
    pub fn num_iterations(&self) -> usize {
        self.trees.len()
    }

    /// Sum of tree outputs for one row already in `f32`
    pub fn raw_score_f32(&self, features: &[f32]) -> f64 {
        self.trees.iter().map(|tree| tree.predict(features)).sum()
    }

    /// Sum of tree outputs; inputs are evaluated in `f32` precision
    pub fn raw_score(&self, features: &[f64]) -> f64 {
        let narrowed: Vec<f32> = features.iter().map(|v| *v as f32).collect();
        self.raw_score_f32(&narrowed)
    }

    /// Positive-class probability for one row
    pub fn predict_proba_row(&self, features: &[f64]) -> f64 {
        sigmoid(self.raw_score(features))
    }

    /// Positive-class probabilities for a feature matrix
    pub fn predict_proba(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if features.ncols() != self.num_features() {
            return Err(ModelError::DataShape(format!(
                "model expects {} features, got {}",
                self.num_features(),
                features.ncols()
            )));
        }

        let mut row_buffer = vec![0.0f32; features.ncols()];
        Ok(features
            .rows()
            .into_iter()
            .map(|row| {
                for (slot, value) in row_buffer.iter_mut().zip(row.iter()) {
                    *slot = *value as f32;
                }
                sigmoid(self.raw_score_f32(&row_buffer))
            })
            .collect())
    }

    /// Structural checks used before export and after loading
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::InvalidModel("ensemble has no trees".to_string()));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|reason| ModelError::InvalidModel(format!("tree {}: {}", index, reason)))?;
            if let Some(feature) = tree.max_feature_index() {
                if feature >= self.num_features() {
                    return Err(ModelError::InvalidModel(format!(
                        "tree {} splits on feature {} but the model has {} features",
                        index,
                        feature,
                        self.num_features()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Narrow interface to a gradient boosting engine
pub trait BoostingEngine {
    /// Fit an ensemble on `features` / `labels` (0.0 or 1.0), tracking the
    /// configured metric on `valid` after every round
    fn fit(
        &self,
        features: ArrayView2<f64>,
        labels: ArrayView1<f64>,
        valid: Option<(ArrayView2<f64>, ArrayView1<f64>)>,
        params: &GbmParams,
    ) -> Result<TrainedModel, ModelError>;

    /// Positive-class probabilities
    fn predict(&self, model: &TrainedModel, features: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        model.predict_proba(features)
    }
}

/// Leaf-wise histogram-free gradient boosted trees
#[derive(Debug, Clone, Copy, Default)]
pub struct GbdtEngine;

impl GbdtEngine {
    pub fn new() -> Self {
        Self
    }
}

impl BoostingEngine for GbdtEngine {
    fn fit(
        &self,
        features: ArrayView2<f64>,
        labels: ArrayView1<f64>,
        valid: Option<(ArrayView2<f64>, ArrayView1<f64>)>,
        params: &GbmParams,
    ) -> Result<TrainedModel, ModelError> {
        let (n_samples, n_features) = features.dim();
        if n_samples == 0 {
            return Err(ModelError::DataShape("training set is empty".to_string()));
        }
        if n_features == 0 {
            return Err(ModelError::DataShape("training set has no features".to_string()));
        }
        if labels.len() != n_samples {
            return Err(ModelError::DataShape(format!(
                "{} feature rows but {} labels",
                n_samples,
                labels.len()
            )));
        }
        if labels.iter().any(|y| *y != 0.0 && *y != 1.0) {
            return Err(ModelError::DataShape(
                "binary objective requires labels in {0, 1}".to_string(),
            ));
        }
        if let Some((valid_x, valid_y)) = &valid {
            if valid_x.ncols() != n_features || valid_x.nrows() != valid_y.len() {
                return Err(ModelError::DataShape(format!(
                    "validation set is {}x{} with {} labels, expected {} features",
                    valid_x.nrows(),
                    valid_x.ncols(),
                    valid_y.len(),
                    n_features
                )));
            }
        }

        info!(
            "Training GBM classifier with {} samples and {} features",
            n_samples, n_features
        );
        debug!("Parameters: {:?}", params);

        let columns: Vec<Vec<f32>> = features
            .columns()
            .into_iter()
            .map(|column| column.iter().map(|v| *v as f32).collect())
            .collect();
        let sorted = TreeLearner::presort(&columns);
        let learner = TreeLearner::new(&columns, &sorted, params);
        let y: Vec<f64> = labels.to_vec();

        let positive_rate = (y.iter().sum::<f64>() / n_samples as f64)
            .clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
        let init_score = (positive_rate / (1.0 - positive_rate)).ln();
        info!("Start training from score {:.6}", init_score);

        let valid_rows: Option<(Vec<Vec<f32>>, Vec<f64>)> = valid.map(|(x, y)| {
            let rows = x
                .rows()
                .into_iter()
                .map(|row| row.iter().map(|v| *v as f32).collect())
                .collect();
            (rows, y.to_vec())
        });
        let mut valid_scores = vec![0.0; valid_rows.as_ref().map_or(0, |(rows, _)| rows.len())];
        let mut valid_history = Vec::new();

        let mut scores = vec![init_score; n_samples];
        let mut gradients = vec![0.0; n_samples];
        let mut hessians = vec![0.0; n_samples];
        let mut trees = Vec::with_capacity(params.num_boost_round);

        for iteration in 0..params.num_boost_round {
            for i in 0..n_samples {
                let p = sigmoid(scores[i]);
                gradients[i] = p - y[i];
                hessians[i] = p * (1.0 - p);
            }

            let (mut tree, leaf_of_row) = learner.grow(&gradients, &hessians);
            for (score, leaf) in scores.iter_mut().zip(&leaf_of_row) {
                *score += tree.leaf_value[*leaf as usize];
            }
            if iteration == 0 {
                tree.add_bias(init_score);
            }

            if let Some((rows, valid_y)) = &valid_rows {
                for (score, row) in valid_scores.iter_mut().zip(rows) {
                    *score += tree.predict(row);
                }
                let value = params.metric.compute(&valid_scores, valid_y);
                debug!("[{}]\tvalid's {}: {:.6}", iteration + 1, params.metric, value);
                if (iteration + 1) % 50 == 0 {
                    info!("[{}]\tvalid's {}: {:.6}", iteration + 1, params.metric, value);
                }
                valid_history.push(value);
            }

            trees.push(tree);
        }

        info!("Finished training {} trees", trees.len());

        Ok(TrainedModel {
            objective: params.objective,
            metric: params.metric,
            feature_names: (0..n_features).map(|j| format!("Column_{}", j)).collect(),
            trees,
            init_score,
            learning_rate: params.learning_rate,
            num_boost_round: params.num_boost_round,
            valid_history,
        })
    }
}

/// Gradient Boosting Classifier for direction prediction
#[derive(Debug, Clone)]
pub struct GbmClassifier<E: BoostingEngine = GbdtEngine> {
    params: GbmParams,
    engine: E,
}

impl GbmClassifier<GbdtEngine> {
    /// Create a new GBM classifier with default parameters
    pub fn new() -> Self {
        Self::with_params(GbmParams::default())
    }

    /// Create a new GBM classifier with custom parameters
    pub fn with_params(params: GbmParams) -> Self {
        Self {
            params,
            engine: GbdtEngine,
        }
    }
}

impl Default for GbmClassifier<GbdtEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BoostingEngine> GbmClassifier<E> {
    /// Use a different boosting engine
    pub fn with_engine(params: GbmParams, engine: E) -> Self {
        Self { params, engine }
    }

    /// Train on `train`, monitoring `valid` every round
    pub fn fit(&self, train: &Dataset, valid: &Dataset) -> Result<TrainedModel, ModelError> {
        check_columns(train)?;
        check_columns(valid)?;

        let x = train.features_array();
        let y = train.labels_array();
        let valid_x = valid.features_array();
        let valid_y = valid.labels_array();
        let monitor = (!valid.is_empty()).then(|| (valid_x.view(), valid_y.view()));

        let mut model = self.engine.fit(x.view(), y.view(), monitor, &self.params)?;
        model.feature_names = train.feature_names.clone();

        if let Some(last) = model.valid_history.last() {
            info!("Final validation {}: {:.4}", self.params.metric, last);
        }

        Ok(model)
    }

    /// Positive-class probabilities for every example of a dataset
    pub fn predict_dataset(&self, model: &TrainedModel, dataset: &Dataset) -> Result<Array1<f64>, ModelError> {
        check_columns(dataset)?;
        self.engine.predict(model, dataset.features_array().view())
    }
}

fn check_columns(dataset: &Dataset) -> Result<(), ModelError> {
    let missing: Vec<&str> = FEATURE_COLUMNS
        .iter()
        .filter(|column| !dataset.feature_names.iter().any(|name| name == *column))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ModelError::DataShape(format!(
            "missing feature column(s): {}",
            missing.join(", ")
        )));
    }
    if dataset.feature_names.len() != FEATURE_COLUMNS.len() {
        return Err(ModelError::DataShape(format!(
            "expected {} feature columns, found {}",
            FEATURE_COLUMNS.len(),
            dataset.feature_names.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn toy_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7) % 5) as f64
            }
        });
        let y = (0..n).map(|i| if i >= n / 2 { 1.0 } else { 0.0 }).collect();
        (x, y)
    }

    fn small_params(rounds: usize) -> GbmParams {
        GbmParams {
            num_boost_round: rounds,
            min_data_in_leaf: 5,
            learning_rate: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_uses_every_round() {
        let (x, y) = toy_problem(100);
        let model = GbdtEngine
            .fit(x.view(), y.view(), Some((x.view(), y.view())), &small_params(30))
            .unwrap();

        assert_eq!(model.num_iterations(), 30);
        assert_eq!(model.valid_history.len(), 30);
        assert_eq!(model.feature_names, vec!["Column_0", "Column_1"]);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_fit_learns_threshold() {
        let (x, y) = toy_problem(100);
        let model = GbdtEngine.fit(x.view(), y.view(), None, &small_params(50)).unwrap();
        let proba = GbdtEngine.predict(&model, x.view()).unwrap();

        assert!(proba[0] < 0.2);
        assert!(proba[99] > 0.8);
        for (p, label) in proba.iter().zip(y.iter()) {
            assert_eq!(*p > 0.5, *label == 1.0);
        }
    }

    #[test]
    fn test_init_score_is_log_odds() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..40).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        let model = GbdtEngine.fit(x.view(), y.view(), None, &small_params(1)).unwrap();

        assert!((model.init_score - (0.25f64 / 0.75).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_training_does_not_mutate_inputs() {
        let (x, y) = toy_problem(60);
        let (x_before, y_before) = (x.clone(), y.clone());
        GbdtEngine.fit(x.view(), y.view(), None, &small_params(3)).unwrap();

        assert_eq!(x, x_before);
        assert_eq!(y, y_before);
    }

    #[test]
    fn test_empty_training_set() {
        let x = Array2::<f64>::zeros((0, 9));
        let y = Array1::<f64>::zeros(0);
        let err = GbdtEngine.fit(x.view(), y.view(), None, &GbmParams::default()).unwrap_err();
        assert!(matches!(err, ModelError::DataShape(_)));
    }

    #[test]
    fn test_label_mismatch() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = Array1::from(vec![0.0, 1.0]);
        assert!(GbdtEngine.fit(x.view(), y.view(), None, &GbmParams::default()).is_err());

        let y = Array1::from(vec![0.0, 2.0, 1.0]);
        assert!(GbdtEngine.fit(x.view(), y.view(), None, &GbmParams::default()).is_err());
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = toy_problem(50);
        let model = GbdtEngine.fit(x.view(), y.view(), None, &small_params(2)).unwrap();
        let wide = Array2::<f64>::zeros((1, 3));
        assert!(model.predict_proba(wide.view()).is_err());
    }

    #[test]
    fn test_wider_model_rejects_narrow_rows() {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| if j == 2 { i as f64 } else { 0.0 });
        let y: Array1<f64> = (0..60).map(|i| if i >= 30 { 1.0 } else { 0.0 }).collect();
        let model = GbdtEngine.fit(x.view(), y.view(), None, &small_params(3)).unwrap();
        assert!(model.trees.iter().any(|tree| tree.max_feature_index() == Some(2)));

        let narrow = Array2::<f64>::zeros((1, 2));
        assert!(matches!(
            model.predict_proba(narrow.view()),
            Err(ModelError::DataShape(_))
        ));
    }

    #[test]
    fn test_classifier_requires_feature_columns() {
        let mut dataset = Dataset::new(Vec::new());
        dataset.feature_names.retain(|name| name != "rsi");

        let err = GbmClassifier::new().fit(&dataset, &Dataset::new(Vec::new())).unwrap_err();
        match err {
            ModelError::DataShape(msg) => assert!(msg.contains("rsi")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classifier_rejects_empty_train() {
        let err = GbmClassifier::new()
            .fit(&Dataset::new(Vec::new()), &Dataset::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, ModelError::DataShape(_)));
    }

    #[test]
    fn test_metrics() {
        let scores = [2.0, -2.0, 0.5, -0.5];
        let labels = [1.0, 0.0, 0.0, 1.0];
        assert_eq!(Metric::BinaryError.compute(&scores, &labels), 0.5);
        assert!(Metric::BinaryLogloss.compute(&scores, &labels) > 0.0);
        assert!(Metric::BinaryError.compute(&[], &[]).is_nan());
    }
}
