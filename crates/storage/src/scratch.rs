// SPDX-License-Identifier: MIT

//! Scratch files: short-lived JSON buffers between download and upload jobs.
//!
//! Layout is `{root}/{configId}/{uuid}.json`. A scratch file is owned by the
//! job that references it: the download handler creates it, the consuming
//! upload handler deletes it on success or on a definitive rejection. No
//! other actor may delete a file referenced by a live message.

use porter_core::{ConfigId, DataValueSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from scratch-file I/O.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("scratch file missing: {0}")]
    Missing(PathBuf),
    #[error("scratch file corrupt: {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Store for scratch files under a fixed output root.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    root: PathBuf,
}

impl ScratchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write a data-value set to a fresh scratch file and return its path.
    pub fn write(
        &self,
        config_id: &ConfigId,
        set: &DataValueSet,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(config_id.as_str());
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("{}.json", uuid::Uuid::new_v4()));
        let bytes = serde_json::to_vec(set).map_err(|source| StorageError::Corrupt {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, bytes).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), values = set.len(), "wrote scratch file");
        Ok(path)
    }

    /// Read a scratch file back into a data-value set.
    pub fn read(&self, path: &Path) -> Result<DataValueSet, StorageError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::Missing(path.to_path_buf()))
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a scratch file as raw JSON (metadata bundles are not value
    /// sets).
    pub fn read_raw(&self, path: &Path) -> Result<serde_json::Value, StorageError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::Missing(path.to_path_buf()))
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Delete a scratch file. Removing an already-absent file is fine; the
    /// consumer may be re-running after a partial completion.
    pub fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "scratch file already removed");
                Ok(())
            }
            Err(source) => Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[path = "scratch_tests.rs"]
mod tests;
