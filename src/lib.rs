//! Gradient boosted next-day direction classifier
//!
//! This library turns a table of daily price bars into a binary
//! "will tomorrow close higher?" classifier and exports it both as a native
//! model dump and as an ONNX inference graph.
//!
//! # Modules
//!
//! - [`data`] - CSV loading, data structures and the chronological split
//! - [`features`] - Rolling indicators and next-day labels
//! - [`models`] - Gradient boosted trees, training and evaluation
//! - [`export`] - Native text, binary snapshot and ONNX artifacts
//! - [`pipeline`] - The end-to-end run
//!
//! # Example
//!
//! ```rust,no_run
//! use gbm_direction::{Pipeline, PipelineConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = PipelineConfig::default();
//!     config.data.csv_path = "data/stock_history.csv".into();
//!
//!     let report = Pipeline::new(config)?.run()?;
//!     println!("Test accuracy: {:.4}", report.metrics.accuracy);
//!     for path in &report.artifacts {
//!         println!("Wrote {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod models;
pub mod pipeline;

// Re-export commonly used items at the crate level
pub use config::PipelineConfig;
pub use data::{DataLoader, Dataset, DatasetSplitter, PriceBar, FEATURE_COLUMNS, NUM_FEATURES};
pub use error::{PipelineError, PipelineResult};
pub use export::{ExportConfig, ExportError, ModelExporter, NativeTextFormat, OnnxExporter, OnnxGraph, SnapshotFormat};
pub use features::{FeatureConfig, FeatureEngineer, LabelGenerator};
pub use models::{Evaluator, GbmClassifier, GbmParams, ModelError, ModelMetrics, TrainedModel};
pub use pipeline::{Pipeline, PipelineReport};
