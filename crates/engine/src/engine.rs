// SPDX-License-Identifier: MIT

//! The engine: shared dependencies and state for planner, queue manager,
//! worker runtime, and validation.

use crate::sessions::ValidationSessionStore;
use crate::worker::WorkerMetrics;
use parking_lot::Mutex;
use porter_adapters::{Broker, DhisApi, Endpoint};
use porter_config::{ConfigStore, Configuration, InstanceConfig};
use porter_core::{Clock, SystemClock};
use porter_storage::ScratchStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tunables applied when a request carries no override.
#[derive(Debug, Clone)]
pub struct EngineDefaults {
    /// Per-channel consumer prefetch.
    pub prefetch: u16,
    /// Timeout for source reads.
    pub source_timeout: Duration,
    /// Timeout for destination writes.
    pub dest_timeout: Duration,
    /// Timeout for bulk data fetches.
    pub data_timeout: Duration,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            prefetch: 20,
            source_timeout: Duration::from_secs(30),
            dest_timeout: Duration::from_secs(30),
            data_timeout: Duration::from_secs(120),
        }
    }
}

/// Adapter dependencies handed to the engine.
pub struct EngineDeps {
    pub broker: Arc<dyn Broker>,
    pub dhis: Arc<dyn DhisApi>,
    pub configs: Arc<dyn ConfigStore>,
    pub scratch: ScratchStore,
}

/// Coordinates the migration pipeline: expands requests into jobs, runs the
/// per-queue consumers, and answers operator queries.
pub struct Engine<C: Clock = SystemClock> {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) dhis: Arc<dyn DhisApi>,
    pub(crate) configs: Arc<dyn ConfigStore>,
    pub(crate) scratch: ScratchStore,
    pub(crate) clock: C,
    pub(crate) defaults: EngineDefaults,
    /// Transient retry attempts per job, across redeliveries. Keys are
    /// removed on success and on DLQ routing.
    pub(crate) retry_counts: Mutex<HashMap<String, u32>>,
    pub(crate) metrics: WorkerMetrics,
    pub(crate) sessions: ValidationSessionStore,
}

impl<C: Clock> Engine<C> {
    pub fn new(deps: EngineDeps, clock: C, defaults: EngineDefaults) -> Self {
        Self {
            broker: deps.broker,
            dhis: deps.dhis,
            configs: deps.configs,
            scratch: deps.scratch,
            clock,
            defaults,
            retry_counts: Mutex::new(HashMap::new()),
            metrics: WorkerMetrics::default(),
            sessions: ValidationSessionStore::default(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn sessions(&self) -> &ValidationSessionStore {
        &self.sessions
    }

    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    /// Source endpoint of a configuration, for direct source reads.
    pub(crate) fn source_endpoint(&self, config: &Configuration) -> Endpoint {
        endpoint_of(&config.source, None)
    }

    /// Destination endpoint of a configuration.
    pub(crate) fn dest_endpoint(&self, config: &Configuration) -> Endpoint {
        endpoint_of(&config.destination, None)
    }

    /// Source reads proxied through the destination's route, used when the
    /// source is only reachable from the destination instance.
    pub(crate) fn proxied_source_endpoint(&self, config: &Configuration) -> Endpoint {
        match &config.source.route_id {
            Some(route) => endpoint_of(&config.destination, Some(route.clone())),
            None => self.source_endpoint(config),
        }
    }
}

fn endpoint_of(instance: &InstanceConfig, route: Option<String>) -> Endpoint {
    Endpoint {
        base_url: instance.base_url.clone(),
        username: instance.username.clone(),
        password: instance.password.clone(),
        route,
    }
}
