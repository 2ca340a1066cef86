//! Feature engineering for machine learning models
//!
//! This module transforms raw price bars into feature rows suitable for
//! the direction classifier.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{FeatureRow, PriceBar};
use crate::error::{PipelineError, PipelineResult};
use crate::features::technical::{Returns, Rsi, Sma};

/// Feature engineering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Window of the short moving average (`ma5`)
    pub ma_short: usize,
    /// Window of the long moving average (`ma10`)
    pub ma_long: usize,
    /// Number of close deltas averaged by the RSI
    pub rsi_period: usize,
    /// Added to the mean loss so a loss-free window does not divide by zero
    pub rsi_epsilon: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ma_short: 5,
            ma_long: 10,
            rsi_period: 14,
            rsi_epsilon: 1e-9,
        }
    }
}

impl FeatureConfig {
    /// Number of leading bars that never produce a feature row
    ///
    /// All indicators share one cutoff: a bar is usable only once the
    /// longest window is full. The RSI consumes deltas, so it needs
    /// `rsi_period + 1` closes; the return needs two.
    pub fn warmup(&self) -> usize {
        self.ma_short
            .max(self.ma_long)
            .max(self.rsi_period + 1)
            .max(2)
            - 1
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.ma_short == 0 || self.ma_long == 0 || self.rsi_period == 0 {
            return Err(PipelineError::InvalidConfig(
                "indicator windows must be positive".to_string(),
            ));
        }
        if !(self.rsi_epsilon >= 0.0) {
            return Err(PipelineError::InvalidConfig(
                "rsi_epsilon must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Feature engineer that creates ML features from price bars
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    /// Create a new feature engineer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new feature engineer with custom configuration
    pub fn with_config(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Build feature rows from bars sorted ascending by date
    ///
    /// Rows whose windows are incomplete are dropped, so the output has
    /// `bars.len().saturating_sub(warmup)` rows.
    pub fn transform(&self, bars: &[PriceBar]) -> Vec<FeatureRow> {
        let mut returns = Returns::new();
        let mut ma_short = Sma::new(self.config.ma_short);
        let mut ma_long = Sma::new(self.config.ma_long);
        let mut rsi = Rsi::new(self.config.rsi_period, self.config.rsi_epsilon);

        let mut rows = Vec::with_capacity(bars.len().saturating_sub(self.config.warmup()));
        for bar in bars {
            // Every indicator sees every bar, even when another is still warming up
            let ret = returns.update(bar.close);
            let ma5 = ma_short.update(bar.close);
            let ma10 = ma_long.update(bar.close);
            let rsi_value = rsi.update(bar.close);

            if let (Some(ret), Some(ma5), Some(ma10), Some(rsi)) = (ret, ma5, ma10, rsi_value) {
                rows.push(FeatureRow {
                    bar: *bar,
                    ret,
                    ma5,
                    ma10,
                    rsi,
                });
            }
        }

        debug!(
            "Built {} feature rows from {} bars (warmup {})",
            rows.len(),
            bars.len(),
            self.config.warmup()
        );

        rows
    }
}
