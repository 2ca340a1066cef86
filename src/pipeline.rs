//! End-to-end training pipeline
//!
//! bars → features → labels → chronological split → training →
//! evaluation → export. Each stage hands an immutable value to the next.

use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data::{DataLoader, Dataset, DatasetSplitter, PriceBar};
use crate::error::{PipelineError, PipelineResult};
use crate::export::{ModelExporter, NativeTextFormat, OnnxExporter, SnapshotFormat};
use crate::features::{FeatureEngineer, LabelGenerator};
use crate::models::{Evaluator, GbmClassifier, ModelMetrics, TrainedModel};

/// Summary of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub n_bars: usize,
    pub n_feature_rows: usize,
    pub n_labeled: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub train_range: Option<(NaiveDate, NaiveDate)>,
    pub test_range: Option<(NaiveDate, NaiveDate)>,
    pub metrics: ModelMetrics,
    pub model: TrainedModel,
    /// Written artifacts: native text, snapshot, ONNX graph
    pub artifacts: Vec<PathBuf>,
}

/// Runs the training pipeline for one configuration
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the configured CSV and run every stage
    pub fn run(&self) -> PipelineResult<PipelineReport> {
        let bars = DataLoader::load_bars(&self.config.data.csv_path)?;
        self.run_with_bars(&bars)
    }

    /// Run every stage on bars already in memory
    pub fn run_with_bars(&self, bars: &[PriceBar]) -> PipelineResult<PipelineReport> {
        let engineer = FeatureEngineer::with_config(self.config.features.clone());
        let rows = engineer.transform(bars);
        let dataset = Dataset::new(LabelGenerator::new().label(&rows));
        info!(
            "{} bars -> {} feature rows -> {} labeled examples",
            bars.len(),
            rows.len(),
            dataset.len()
        );
        if dataset.is_empty() {
            return Err(PipelineError::DataShape(format!(
                "no labeled examples: {} bars given, at least {} needed",
                bars.len(),
                engineer.config().warmup() + 2
            )));
        }

        let splitter = DatasetSplitter::new(self.config.split.test_fraction)?;
        let (train, test) = splitter.split(&dataset);
        if train.is_empty() || test.is_empty() {
            return Err(PipelineError::DataShape(format!(
                "split of {} examples left {} train and {} test rows",
                dataset.len(),
                train.len(),
                test.len()
            )));
        }
        let positive = train.examples.iter().filter(|e| e.label == 1).count();
        if positive == 0 || positive == train.len() {
            warn!("Training labels are all {}", u8::from(positive > 0));
        }

        let classifier = GbmClassifier::with_params(self.config.training.clone());
        let model = classifier.fit(&train, &test)?;

        let metrics = Evaluator::new().evaluate(&model, &test)?;
        info!("Test accuracy: {:.4}", metrics.accuracy);

        let export = &self.config.export;
        let exporters: Vec<Box<dyn ModelExporter>> = vec![
            Box::new(NativeTextFormat::new(export)),
            Box::new(SnapshotFormat::new(export)),
            Box::new(OnnxExporter::new(export)),
        ];
        // Serialize everything before touching the output directory
        let artifacts = exporters
            .iter()
            .map(|exporter| {
                info!("Exporting {} artifact", exporter.format_name());
                exporter.export(&model)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let artifacts = artifacts
            .iter()
            .map(|artifact| artifact.write_to(&export.output_dir))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PipelineReport {
            n_bars: bars.len(),
            n_feature_rows: rows.len(),
            n_labeled: dataset.len(),
            n_train: train.len(),
            n_test: test.len(),
            train_range: train.date_range(),
            test_range: test.date_range(),
            metrics,
            model,
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn flat_bars(n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        (0..n)
            .map(|i| PriceBar {
                date: start + Duration::days(i as i64),
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_too_few_bars() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run_with_bars(&flat_bars(15)).unwrap_err();
        assert!(matches!(err, PipelineError::DataShape(_)));
    }

    #[test]
    fn test_empty_test_partition() {
        // 16 bars give one labeled example, which rounds to an empty test set
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run_with_bars(&flat_bars(16)).unwrap_err();
        assert!(matches!(err, PipelineError::DataShape(_)));
    }

    #[test]
    fn test_missing_csv() {
        let mut config = PipelineConfig::default();
        config.data.csv_path = PathBuf::from("no/such/prices.csv");
        let err = Pipeline::new(config).unwrap().run().unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile(_)));
        assert!(err.to_string().contains("no/such/prices.csv"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.training.num_boost_round = 0;
        assert!(Pipeline::new(config).is_err());
    }
}
