//! Materializes persisted model blobs to filesystem paths the external
//! scorer can read.
//!
//! Paths are stable per model id (`model_{id}.pkl`), so concurrent
//! materializations of the same model race harmlessly: writes are atomic
//! (temp file + rename) and skipped entirely when the on-disk digest already
//! matches the blob.

use crate::domain::error::{AppError, Result};
use crate::domain::model::PredictionModel;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

fn io_err(msg: impl Into<String>) -> AppError {
    AppError::IoError(msg.into())
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the store directory if missing.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| io_err(format!("Failed to create dir {}: {e}", self.dir.display())))?;
        Ok(())
    }

    pub fn model_path(&self, model_id: i64) -> PathBuf {
        self.dir.join(format!("model_{}.pkl", model_id))
    }

    /// Write the model's blob to its path and return the path.
    ///
    /// A model without a blob still yields the computed path; the scorer is
    /// the one to complain about the missing file. Re-materializing an
    /// unchanged blob is a no-op.
    pub fn materialize(&self, model: &PredictionModel) -> Result<PathBuf> {
        let path = self.model_path(model.id);
        let Some(bytes) = model.model_data.as_deref() else {
            return Ok(path);
        };

        if file_matches(&path, bytes) {
            debug!(model_id = model.id, "Model blob unchanged, skipping write");
            return Ok(path);
        }

        self.ensure()?;
        atomic_write_bytes(&path, bytes)?;
        debug!(
            model_id = model.id,
            path = %path.display(),
            sha256 = %hex::encode(Sha256::digest(bytes)),
            "Materialized model blob"
        );
        Ok(path)
    }
}

fn file_matches(path: &Path, bytes: &[u8]) -> bool {
    match fs::read(path) {
        Ok(existing) => existing == bytes,
        Err(_) => false,
    }
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| {
            io_err(format!(
                "Failed to create temp file {}: {e}",
                tmp_path.display()
            ))
        })?;
        file.write_all(bytes).map_err(|e| {
            io_err(format!(
                "Failed to write temp file {}: {e}",
                tmp_path.display()
            ))
        })?;
        file.sync_all().ok();
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(format!(
            "Failed to rename temp file {} to {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ModelStatus;

    fn model(id: i64, data: Option<Vec<u8>>) -> PredictionModel {
        PredictionModel {
            id,
            name: format!("m{id}"),
            status: ModelStatus::Active,
            performance: None,
            model_data: data,
            parameters: None,
            created_at: None,
        }
    }

    fn temp_store(tag: &str) -> ModelStore {
        let dir = std::env::temp_dir().join(format!("model_store_test_{tag}_{}", Uuid::new_v4()));
        ModelStore::new(dir)
    }

    #[test]
    fn test_materialize_writes_blob_to_stable_path() {
        let store = temp_store("write");
        let path = store.materialize(&model(3, Some(vec![9, 8, 7]))).unwrap();

        assert_eq!(path.file_name().unwrap(), "model_3.pkl");
        assert_eq!(fs::read(&path).unwrap(), vec![9, 8, 7]);

        // Same blob again: path is stable and the content stays intact.
        let again = store.materialize(&model(3, Some(vec![9, 8, 7]))).unwrap();
        assert_eq!(again, path);
        assert_eq!(fs::read(&path).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn test_materialize_overwrites_changed_blob() {
        let store = temp_store("overwrite");
        store.materialize(&model(4, Some(vec![1]))).unwrap();
        let path = store.materialize(&model(4, Some(vec![2, 2]))).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![2, 2]);
    }

    #[test]
    fn test_missing_blob_returns_path_without_file() {
        let store = temp_store("missing");
        let path = store.materialize(&model(5, None)).unwrap();
        assert_eq!(path.file_name().unwrap(), "model_5.pkl");
        assert!(!path.exists());
    }
}
