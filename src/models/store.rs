//! Filesystem persistence for fitted fare models

use crate::config::ModelsConfig;
use crate::error::StoreError;
use crate::models::linear::Model;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Format tag written into every persisted model
pub const MODEL_FORMAT: &str = "fare-linear/1";

const MODEL_FILE: &str = "model.json";

/// On-disk representation of a [`Model`]
#[derive(Debug, Serialize, Deserialize)]
struct ModelDocument {
    format: String,
    version: String,
    coefficient: f64,
    intercept: f64,
    trained_at: DateTime<Utc>,
    #[serde(default)]
    training_rows: usize,
}

/// Stores models by name under a root directory: `<root>/<name>/model.json`
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(&config.store_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `model` under `name`, replacing any previous model of that name
    pub fn save(&self, name: &str, model: &Model) -> Result<PathBuf, StoreError> {
        let dir = self.model_dir(name)?;
        fs::create_dir_all(&dir)?;

        let document = ModelDocument {
            format: MODEL_FORMAT.to_string(),
            version: model.version.clone(),
            coefficient: model.coefficient,
            intercept: model.intercept,
            trained_at: model.trained_at,
            training_rows: model.training_rows,
        };
        let payload = serde_json::to_vec_pretty(&document).map_err(std::io::Error::from)?;

        // Write then rename so readers never observe a half-written model
        let path = dir.join(MODEL_FILE);
        let tmp = dir.join(format!("{MODEL_FILE}.tmp"));
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;

        info!(
            model = %name,
            version = %model.version,
            path = %path.display(),
            "Model saved"
        );

        Ok(path)
    }

    /// Load the model persisted under `name`
    pub fn load(&self, name: &str) -> Result<Model, StoreError> {
        let path = self.model_dir(name)?.join(MODEL_FILE);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ModelNotFound(name.to_string()))
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let corrupt = |reason: String| StoreError::ModelCorrupt {
            name: name.to_string(),
            reason,
        };

        let document: ModelDocument =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if document.format != MODEL_FORMAT {
            return Err(corrupt(format!("unknown format `{}`", document.format)));
        }
        if !document.coefficient.is_finite() || !document.intercept.is_finite() {
            return Err(corrupt("non-finite parameters".to_string()));
        }

        info!(
            model = %name,
            version = %document.version,
            coefficient = document.coefficient,
            intercept = document.intercept,
            "Model loaded"
        );

        Ok(Model {
            coefficient: document.coefficient,
            intercept: document.intercept,
            version: document.version,
            trained_at: document.trained_at,
            training_rows: document.training_rows,
        })
    }

    fn model_dir(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.contains("..");
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        let model = Model::new(0.1 + 0.2, -1.0 / 3.0).with_training_rows(42);
        store.save("fare_model", &model).unwrap();
        let loaded = store.load("fare_model").unwrap();

        assert_eq!(loaded, model);
        assert_eq!(loaded.coefficient.to_bits(), model.coefficient.to_bits());
        assert_eq!(loaded.intercept.to_bits(), model.intercept.to_bits());
        assert_eq!(loaded.training_rows, 42);
        assert_eq!(loaded.trained_at, model.trained_at);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        store.save("fare_model", &Model::new(1.0, 1.0)).unwrap();
        let second = Model::new(2.0, 1.0);
        store.save("fare_model", &second).unwrap();

        assert_eq!(store.load("fare_model").unwrap(), second);
    }

    #[test]
    fn test_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        let err = store.load("absent").unwrap_err();
        assert!(matches!(err, StoreError::ModelNotFound(name) if name == "absent"));
    }

    #[test]
    fn test_corrupt_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model_dir = dir.path().join("fare_model");
        fs::create_dir_all(&model_dir).unwrap();

        fs::write(model_dir.join(MODEL_FILE), b"{not json").unwrap();
        assert!(matches!(
            store.load("fare_model"),
            Err(StoreError::ModelCorrupt { .. })
        ));

        fs::write(
            model_dir.join(MODEL_FILE),
            br#"{"format":"onnx/9","version":"v","coefficient":1.0,"intercept":0.0,"trained_at":"2025-10-15T08:30:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load("fare_model"),
            Err(StoreError::ModelCorrupt { reason, .. }) if reason.contains("onnx/9")
        ));

        fs::write(
            model_dir.join(MODEL_FILE),
            br#"{"format":"fare-linear/1","version":"v","intercept":0.0,"trained_at":"2025-10-15T08:30:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load("fare_model"),
            Err(StoreError::ModelCorrupt { .. })
        ));
    }

    #[test]
    fn test_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model = Model::new(1.0, 0.0);

        for name in ["", "..", "../escape", "a/b", "a\\b"] {
            assert!(matches!(
                store.save(name, &model),
                Err(StoreError::InvalidName(_))
            ));
        }
    }
}
