//! Crate-level error types

use std::path::PathBuf;
use thiserror::Error;

use crate::export::ExportError;
use crate::models::ModelError;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input file does not exist: {}", .0.display())]
    MissingInputFile(PathBuf),

    #[error("Data shape error: {0}")]
    DataShape(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid record at line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
