//! Configuration management
//!
//! Provides unified configuration for the whole training pipeline. Every
//! path the pipeline touches is carried here and handed to
//! [`Pipeline::new`](crate::pipeline::Pipeline::new) explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::export::ExportConfig;
use crate::features::FeatureConfig;
use crate::models::GbmParams;

/// Default location of the price history CSV
pub const DEFAULT_CSV_PATH: &str = "data/stock_history.csv";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input data configuration
    pub data: DataConfig,
    /// Indicator windows
    pub features: FeatureConfig,
    /// Chronological split
    pub split: SplitConfig,
    /// Boosting parameters
    pub training: GbmParams,
    /// Artifact output
    pub export: ExportConfig,
}

/// Input data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Path to the price bar CSV
    pub csv_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
        }
    }
}

/// Train/test split configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of the labeled rows held out at the end of the series
    pub test_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { test_fraction: 0.2 }
    }
}

impl PipelineConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInputFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test_fraction must lie in (0, 1), got {}",
                fraction
            )));
        }
        self.features.validate()?;
        if self.training.num_leaves < 2 {
            return Err(PipelineError::InvalidConfig(
                "num_leaves must be at least 2".to_string(),
            ));
        }
        if self.training.num_boost_round == 0 {
            return Err(PipelineError::InvalidConfig(
                "num_boost_round must be positive".to_string(),
            ));
        }
        if !(self.training.learning_rate > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "learning_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.data.csv_path, PathBuf::from("data/stock_history.csv"));
        assert_eq!(config.split.test_fraction, 0.2);
        assert_eq!(config.training.num_boost_round, 200);
        assert_eq!(config.training.num_leaves, 31);
        assert_eq!(config.export.output_dir, PathBuf::from("model"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [split]
            test_fraction = 0.25

            [training]
            num_boost_round = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.split.test_fraction, 0.25);
        assert_eq!(config.training.num_boost_round, 50);
        assert_eq!(config.training.learning_rate, 0.05);
        assert_eq!(config.features.rsi_period, 14);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let mut config = PipelineConfig::default();
        config.split.test_fraction = 1.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");

        let mut config = PipelineConfig::default();
        config.training.num_boost_round = 10;
        config.save_toml(&path).unwrap();

        let loaded = PipelineConfig::from_toml(&path).unwrap();
        assert_eq!(loaded.training.num_boost_round, 10);
    }

    #[test]
    fn test_missing_config_file() {
        let err = PipelineConfig::from_toml("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile(_)));
    }
}
