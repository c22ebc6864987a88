// SPDX-License-Identifier: MIT

//! Validation session store.
//!
//! Sessions are created when a validation run starts, mutated only by the
//! owning task, and expired by TTL. The planner-side trigger and the status
//! API share one store.

use parking_lot::Mutex;
use porter_core::{ConfigId, Discrepancy};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default session lifetime after completion.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Lifecycle state of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Running,
    Completed,
    Failed,
}

/// Live progress counters, observable through the status API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationProgress {
    pub records_processed: u64,
    pub total_records: u64,
    pub discrepancies_found: u64,
}

/// One validation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSession {
    pub id: String,
    pub config_id: ConfigId,
    pub status: ValidationStatus,
    pub progress: ValidationProgress,
    pub discrepancies: Vec<Discrepancy>,
    /// Destination fetch failures are surfaced, never silently treated as
    /// "no destination data".
    pub destination_errors: Vec<String>,
    pub started_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationSession {
    pub fn new(id: impl Into<String>, config_id: ConfigId, started_at_ms: u64) -> Self {
        Self {
            id: id.into(),
            config_id,
            status: ValidationStatus::Running,
            progress: ValidationProgress::default(),
            discrepancies: Vec::new(),
            destination_errors: Vec::new(),
            started_at_ms,
            finished_at_ms: None,
            error: None,
        }
    }
}

/// In-process session store with TTL expiry.
#[derive(Clone)]
pub struct ValidationSessionStore {
    inner: Arc<Mutex<HashMap<String, ValidationSession>>>,
    ttl_ms: u64,
}

impl Default for ValidationSessionStore {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl ValidationSessionStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Register a new session.
    pub fn create(&self, session: ValidationSession) {
        self.inner.lock().insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<ValidationSession> {
        self.inner.lock().get(id).cloned()
    }

    /// Most recently started session for a configuration.
    pub fn latest_for(&self, config_id: &ConfigId) -> Option<ValidationSession> {
        self.inner
            .lock()
            .values()
            .filter(|s| &s.config_id == config_id)
            .max_by_key(|s| s.started_at_ms)
            .cloned()
    }

    /// Mutate a session in place (owning-task use only).
    pub fn update(&self, id: &str, f: impl FnOnce(&mut ValidationSession)) {
        if let Some(session) = self.inner.lock().get_mut(id) {
            f(session);
        }
    }

    /// Drop sessions whose TTL has elapsed since they finished (or started,
    /// for runs that died without finishing).
    pub fn expire(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        let ttl_ms = self.ttl_ms;
        inner.retain(|_, s| {
            let anchor = s.finished_at_ms.unwrap_or(s.started_at_ms);
            now_ms.saturating_sub(anchor) < ttl_ms
        });
        before - inner.len()
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
