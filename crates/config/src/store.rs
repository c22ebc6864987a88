// SPDX-License-Identifier: MIT

//! Configuration store: one JSON document per configuration.
//!
//! Configurations are created and edited externally; the pipeline reads
//! them. The store also keeps two small per-config side documents: the last
//! validation parameters and the local portal metadata bundle.

use crate::model::{Configuration, ValidationParams};
use async_trait::async_trait;
use porter_core::ConfigId;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration lookup and persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration not found: {0}")]
    NotFound(ConfigId),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to persisted configurations, plus the per-config side
/// documents the pipeline owns.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load a configuration by ID.
    async fn get(&self, id: &ConfigId) -> Result<Configuration, ConfigError>;

    /// All known configuration IDs, sorted.
    async fn list_ids(&self) -> Result<Vec<ConfigId>, ConfigError>;

    /// Persist the parameters of the latest validation run for a config.
    async fn save_validation_params(
        &self,
        id: &ConfigId,
        params: &ValidationParams,
    ) -> Result<(), ConfigError>;

    /// Load the latest validation parameters, if any.
    async fn load_validation_params(
        &self,
        id: &ConfigId,
    ) -> Result<Option<ValidationParams>, ConfigError>;

    /// Local portal metadata bundle for the `flexiportal-config` metadata
    /// source. `None` when the config has no local bundle.
    async fn portal_metadata(&self, id: &ConfigId)
        -> Result<Option<serde_json::Value>, ConfigError>;
}

/// File-backed store: `{root}/{configId}.json` per configuration,
/// `{root}/validation/{configId}.json` for validation parameters,
/// `{root}/portal/{configId}.json` for local portal metadata.
#[derive(Clone)]
pub struct FileConfigStore {
    root: PathBuf,
}

impl FileConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn config_path(&self, id: &ConfigId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn validation_path(&self, id: &ConfigId) -> PathBuf {
        self.root.join("validation").join(format!("{id}.json"))
    }

    fn portal_path(&self, id: &ConfigId) -> PathBuf {
        self.root.join("portal").join(format!("{id}.json"))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, bytes).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, id: &ConfigId) -> Result<Configuration, ConfigError> {
        let path = self.config_path(id);
        Self::read_json(&path)?.ok_or_else(|| ConfigError::NotFound(id.clone()))
    }

    async fn list_ids(&self) -> Result<Vec<ConfigId>, ConfigError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::Io {
                path: self.root.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(ConfigId::new(stem));
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn save_validation_params(
        &self,
        id: &ConfigId,
        params: &ValidationParams,
    ) -> Result<(), ConfigError> {
        Self::write_json(&self.validation_path(id), params)
    }

    async fn load_validation_params(
        &self,
        id: &ConfigId,
    ) -> Result<Option<ValidationParams>, ConfigError> {
        Self::read_json(&self.validation_path(id))
    }

    async fn portal_metadata(
        &self,
        id: &ConfigId,
    ) -> Result<Option<serde_json::Value>, ConfigError> {
        Self::read_json(&self.portal_path(id))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
