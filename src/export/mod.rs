//! Model export module
//!
//! This module provides:
//! - A human-readable native text dump that parses back bit-for-bit
//! - A binary snapshot of the full trained model
//! - An ONNX inference graph with a fixed `float_input` contract
//!
//! All three formats implement [`ModelExporter`].

pub mod native;
pub mod onnx;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::models::{ModelError, TrainedModel};

pub use native::NativeTextFormat;
pub use onnx::{OnnxExporter, OnnxGraph, TensorSignature};
pub use snapshot::SnapshotFormat;

/// Errors raised while exporting or loading a model artifact
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Tree {tree} node {node}: threshold {threshold} is not representable as f32")]
    ThresholdNotRepresentable { tree: usize, node: usize, threshold: f64 },

    #[error("Tree {tree} leaf {leaf}: value {value} cannot be stored as a finite f32")]
    NonFiniteLeaf { tree: usize, leaf: usize, value: f64 },

    #[error("Accumulated leaf rounding {error:e} exceeds tolerance {tolerance:e}")]
    LeafRounding { error: f64, tolerance: f64 },

    #[error("Feature width mismatch: declared input has {declared} features, model uses {model}")]
    FeatureWidth { declared: usize, model: usize },

    #[error("Malformed {format} artifact: {reason}")]
    Malformed { format: &'static str, reason: String },

    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to decode ONNX graph: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("ONNX runtime error: {0}")]
    Runtime(String),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Artifact naming and graph metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory every artifact is written to; created if absent
    pub output_dir: PathBuf,
    /// File stem shared by the native and snapshot artifacts and the graph
    pub model_name: String,
    /// Name stored in the ONNX graph
    pub graph_name: String,
    /// `ai.onnx` opset version
    pub target_opset: i64,
    /// `ai.onnx.ml` opset version
    pub ml_opset: i64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("model"),
            model_name: "lgb_stock_model".to_string(),
            graph_name: "LGBMClassifier".to_string(),
            target_opset: 15,
            ml_opset: 2,
        }
    }
}

impl ExportConfig {
    /// Path of an artifact with the given extension inside `output_dir`
    pub fn artifact_path(&self, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.model_name, extension))
    }
}

/// Serialized model ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Write into `dir`, creating it if needed
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, ExportError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        info!("Wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// A persisted representation of a trained model
pub trait ModelExporter {
    /// Short format name used in logs
    fn format_name(&self) -> &'static str;

    fn export(&self, model: &TrainedModel) -> Result<Artifact, ExportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_artifact_paths() {
        let config = ExportConfig::default();
        assert_eq!(config.artifact_path("txt"), PathBuf::from("model/lgb_stock_model.txt"));
        assert_eq!(config.artifact_path("onnx"), PathBuf::from("model/lgb_stock_model.onnx"));
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("model");
        let artifact = Artifact {
            file_name: "m.txt".to_string(),
            bytes: b"tree\n".to_vec(),
        };

        let path = artifact.write_to(&target).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"tree\n");
    }
}
