// SPDX-License-Identifier: MIT

//! Error types for the engine

use porter_adapters::{BrokerError, UpstreamError};
use porter_config::ConfigError;
use porter_core::ConfigId;
use porter_storage::StorageError;
use thiserror::Error;

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration not found: {0}")]
    ConfigNotFound(ConfigId),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("configuration store error: {0}")]
    Config(#[source] ConfigError),
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::NotFound(id) => EngineError::ConfigNotFound(id),
            other => EngineError::Config(other),
        }
    }
}

impl From<porter_core::PeriodError> for EngineError {
    fn from(e: porter_core::PeriodError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

/// Errors from a job handler, classified for the retry machinery.
///
/// Transient faults get broker-level retries up to the immediate-requeue
/// limit; everything else dead-letters on the first occurrence.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("transient upstream fault: {0}")]
    Transient(#[source] UpstreamError),
    #[error("fatal upstream fault: {0}")]
    Fatal(#[source] UpstreamError),
    #[error("invalid payload: {0}")]
    PayloadInvalid(String),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Classify an upstream error. Conflicts are not handled here: handlers
    /// resolve 409s themselves (partial success).
    pub fn from_upstream(e: UpstreamError) -> Self {
        if e.is_transient() {
            HandlerError::Transient(e)
        } else {
            HandlerError::Fatal(e)
        }
    }

    /// Whether the broker-level retry budget applies. Broker faults are
    /// retried too: redelivery after reconnect is the broker contract.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_) | HandlerError::Broker(_))
    }

    /// Taxonomy name recorded in the `x-error-name` header.
    pub fn taxonomy_name(&self) -> &'static str {
        match self {
            HandlerError::Transient(_) => "UpstreamTransient",
            HandlerError::Fatal(_) => "UpstreamFatal",
            HandlerError::PayloadInvalid(_) => "PayloadInvalid",
            HandlerError::Broker(_) => "BrokerUnavailable",
            HandlerError::Config(ConfigError::NotFound(_)) => "ConfigNotFound",
            HandlerError::Config(_) => "Internal",
            HandlerError::Internal(_) => "Internal",
        }
    }

    /// Underlying upstream error, when there is one.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            HandlerError::Transient(e) | HandlerError::Fatal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for HandlerError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Broker(b) => HandlerError::Broker(b),
            EngineError::ConfigNotFound(id) => HandlerError::Config(ConfigError::NotFound(id)),
            other => HandlerError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for HandlerError {
    fn from(e: StorageError) -> Self {
        // A missing or corrupt scratch file cannot be fixed by retrying.
        HandlerError::PayloadInvalid(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
