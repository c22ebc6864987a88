// SPDX-License-Identifier: MIT

//! Test harness for behavioral specifications.
//!
//! One `Harness` is a full service instance: engine, router, in-memory
//! broker, fake upstream APIs, and an in-memory configuration store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use porter_adapters::{Broker, FakeDhisApi, MemoryBroker};
use porter_config::{
    Configuration, DataItemConfig, InstanceConfig, Mapping, MemoryConfigStore,
};
use porter_core::{ConfigId, PeriodType, SystemClock};
use porter_engine::{Engine, EngineDefaults, EngineDeps};
use porter_storage::ScratchStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub const SOURCE_URL: &str = "https://source.example.org";
pub const DEST_URL: &str = "https://dest.example.org";

/// Maximum time a spec waits for background work. Generous enough to cover
/// the handlers' 2-second inline retry delays.
pub const SPEC_WAIT_MAX: Duration = Duration::from_secs(20);
pub const SPEC_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Harness {
    pub engine: Arc<Engine>,
    pub router: Router,
    pub broker: MemoryBroker,
    pub dhis: FakeDhisApi,
    pub configs: MemoryConfigStore,
    scratch_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let broker = MemoryBroker::new();
        let dhis = FakeDhisApi::new();
        let configs = MemoryConfigStore::new();
        let scratch_dir = tempfile::TempDir::new().unwrap();
        let engine = Arc::new(Engine::new(
            EngineDeps {
                broker: Arc::new(broker.clone()),
                dhis: Arc::new(dhis.clone()),
                configs: Arc::new(configs.clone()),
                scratch: ScratchStore::new(scratch_dir.path()),
            },
            SystemClock,
            EngineDefaults::default(),
        ));
        let router = porter_daemon::build_router(Arc::clone(&engine));
        Self {
            engine,
            router,
            broker,
            dhis,
            configs,
            scratch_dir,
        }
    }

    /// Register a configuration with one monthly data item mapping
    /// `source_id` to `destination_id`.
    pub fn with_monthly_config(&self, config_id: &str, source_id: &str, destination_id: &str) {
        self.configs.insert(Configuration {
            id: ConfigId::new(config_id),
            source: InstanceConfig {
                base_url: SOURCE_URL.to_string(),
                username: "admin".to_string(),
                password: "district".to_string(),
                route_id: None,
            },
            destination: InstanceConfig {
                base_url: DEST_URL.to_string(),
                username: "admin".to_string(),
                password: "district".to_string(),
                route_id: None,
            },
            data_items: vec![DataItemConfig {
                id: "item-1".to_string(),
                period_type: PeriodType::Monthly,
                parent_org_unit: "OU_ROOT".to_string(),
                org_unit_level: Some("3".to_string()),
                mappings: vec![Mapping {
                    source_id: source_id.to_string(),
                    destination_id: destination_id.to_string(),
                }],
                attribute_combo: None,
            }],
        });
    }

    /// Start the background workers for a configuration (declares the queue
    /// family too).
    pub async fn start_workers(&self, config_id: &str) {
        self.engine
            .start_config_workers(&ConfigId::new(config_id))
            .await
            .unwrap();
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Poll until `condition` holds or the spec timeout elapses.
    pub async fn wait_until<F>(&self, what: &str, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + SPEC_WAIT_MAX;
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for: {what}"
            );
            tokio::time::sleep(SPEC_POLL_INTERVAL).await;
        }
    }

    /// Poll until an async probe yields `Some(T)`.
    pub async fn wait_for<T, F, Fut>(&self, what: &str, mut probe: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Option<T>>,
    {
        let deadline = tokio::time::Instant::now() + SPEC_WAIT_MAX;
        loop {
            if let Some(value) = probe().await {
                return value;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for: {what}"
            );
            tokio::time::sleep(SPEC_POLL_INTERVAL).await;
        }
    }

    /// Current depth of a queue (ready messages), zero when undeclared.
    pub async fn queue_depth(&self, queue: &str) -> u64 {
        self.broker
            .queue_stats(queue)
            .await
            .map(|s| s.ready)
            .unwrap_or(0)
    }

    /// Files currently present under the scratch root.
    pub fn scratch_files(&self) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        let Ok(configs) = std::fs::read_dir(self.scratch_dir.path()) else {
            return files;
        };
        for config_dir in configs.flatten() {
            if let Ok(entries) = std::fs::read_dir(config_dir.path()) {
                files.extend(entries.flatten().map(|e| e.path()));
            }
        }
        files
    }
}

/// A canned source data value for analytics responses.
pub fn source_value(de: &str, period: &str, ou: &str, value: &str) -> porter_core::DataValue {
    porter_core::DataValue {
        data_element: de.to_string(),
        period: period.to_string(),
        org_unit: ou.to_string(),
        category_option_combo: None,
        attribute_option_combo: None,
        value: value.to_string(),
    }
}

pub fn combo(id: &str, name: &str) -> porter_adapters::CategoryOptionCombo {
    porter_adapters::CategoryOptionCombo {
        id: id.to_string(),
        name: name.to_string(),
    }
}
