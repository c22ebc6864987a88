// SPDX-License-Identifier: MIT

//! In-memory configuration store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::model::{Configuration, ValidationParams};
use crate::store::{ConfigError, ConfigStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use porter_core::ConfigId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct MemoryConfigState {
    configs: HashMap<ConfigId, Configuration>,
    validation_params: HashMap<ConfigId, ValidationParams>,
    portal_metadata: HashMap<ConfigId, serde_json::Value>,
}

/// In-memory configuration store for testing
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<MemoryConfigState>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a configuration.
    pub fn insert(&self, config: Configuration) {
        self.inner.lock().configs.insert(config.id.clone(), config);
    }

    /// Set the local portal metadata bundle for a config.
    pub fn set_portal_metadata(&self, id: &ConfigId, bundle: serde_json::Value) {
        self.inner
            .lock()
            .portal_metadata
            .insert(id.clone(), bundle);
    }

    /// Read back the stored validation parameters (test assertion helper).
    pub fn validation_params(&self, id: &ConfigId) -> Option<ValidationParams> {
        self.inner.lock().validation_params.get(id).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, id: &ConfigId) -> Result<Configuration, ConfigError> {
        self.inner
            .lock()
            .configs
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(id.clone()))
    }

    async fn list_ids(&self) -> Result<Vec<ConfigId>, ConfigError> {
        let mut ids: Vec<ConfigId> = self.inner.lock().configs.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn save_validation_params(
        &self,
        id: &ConfigId,
        params: &ValidationParams,
    ) -> Result<(), ConfigError> {
        self.inner
            .lock()
            .validation_params
            .insert(id.clone(), params.clone());
        Ok(())
    }

    async fn load_validation_params(
        &self,
        id: &ConfigId,
    ) -> Result<Option<ValidationParams>, ConfigError> {
        Ok(self.inner.lock().validation_params.get(id).cloned())
    }

    async fn portal_metadata(
        &self,
        id: &ConfigId,
    ) -> Result<Option<serde_json::Value>, ConfigError> {
        Ok(self.inner.lock().portal_metadata.get(id).cloned())
    }
}
