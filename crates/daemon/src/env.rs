// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon.

use std::path::PathBuf;
use std::time::Duration;

/// AMQP-style URI of the broker.
pub fn broker_uri() -> String {
    std::env::var("BROKER_URI").unwrap_or_else(|_| "amqp://localhost".to_string())
}

/// Per-channel consumer prefetch.
pub fn prefetch_count() -> u16 {
    std::env::var("BROKER_PREFETCH_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20)
}

/// HTTP listen port.
pub fn data_service_port() -> u16 {
    std::env::var("DATA_SERVICE_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3009)
}

fn timeout_from(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Default timeout for source reads.
pub fn source_timeout() -> Duration {
    timeout_from("SOURCE_TIMEOUT_MS", Duration::from_secs(30))
}

/// Default timeout for destination writes.
pub fn dest_timeout() -> Duration {
    timeout_from("DEST_TIMEOUT_MS", Duration::from_secs(30))
}

/// Directory holding configuration documents.
pub fn config_dir() -> PathBuf {
    std::env::var("PORTER_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("configs"))
}

/// Root directory for scratch files.
pub fn output_dir() -> PathBuf {
    std::env::var("PORTER_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("outputs"))
}

/// Optional log file; stderr when unset.
pub fn log_file() -> Option<PathBuf> {
    std::env::var("PORTER_LOG_FILE").ok().map(PathBuf::from)
}
