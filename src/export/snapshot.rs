//! Binary snapshot of a trained model

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{Artifact, ExportConfig, ExportError, ModelExporter};
use crate::models::TrainedModel;

const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot payload: the model plus a format version
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    model: TrainedModel,
}

/// bincode serializer for [`TrainedModel`]
#[derive(Debug, Clone)]
pub struct SnapshotFormat {
    file_name: String,
}

impl Default for SnapshotFormat {
    fn default() -> Self {
        Self::new(&ExportConfig::default())
    }
}

impl SnapshotFormat {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            file_name: format!("{}.bin", config.model_name),
        }
    }

    /// Decode a snapshot produced by [`ModelExporter::export`]
    pub fn decode(bytes: &[u8]) -> Result<TrainedModel, ExportError> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ExportError::Malformed {
                format: "snapshot",
                reason: format!("unsupported version {}", snapshot.version),
            });
        }
        snapshot.model.validate()?;
        Ok(snapshot.model)
    }

    /// Load a snapshot from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrainedModel, ExportError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}

impl ModelExporter for SnapshotFormat {
    fn format_name(&self) -> &'static str {
        "snapshot"
    }

    fn export(&self, model: &TrainedModel) -> Result<Artifact, ExportError> {
        model.validate()?;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            model: model.clone(),
        };
        Ok(Artifact {
            file_name: self.file_name.clone(),
            bytes: bincode::serialize(&snapshot)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoostingEngine, GbdtEngine, GbmParams};
    use ndarray::{Array1, Array2};
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_save_load() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i + j) as f64);
        let y: Array1<f64> = (0..40).map(|i| (i % 3 == 0) as u8 as f64).collect();
        let params = GbmParams {
            num_boost_round: 5,
            min_data_in_leaf: 3,
            ..Default::default()
        };
        let model = GbdtEngine.fit(x.view(), y.view(), None, &params).unwrap();

        let dir = tempdir().unwrap();
        let path = SnapshotFormat::default().export(&model).unwrap().write_to(dir.path()).unwrap();
        assert!(path.ends_with("lgb_stock_model.bin"));

        let loaded = SnapshotFormat::load(&path).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_truncated_snapshot() {
        assert!(SnapshotFormat::decode(&[1, 0, 0]).is_err());
    }
}
