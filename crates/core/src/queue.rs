// SPDX-License-Identifier: MIT

//! Queue family naming for per-configuration work queues.
//!
//! Every configuration owns exactly five work queues plus one dead-letter
//! queue. Operators depend on these exact names; do not change the patterns.

use crate::ConfigId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five kinds of work queue in a configuration's queue family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueKind {
    MetadataDownload,
    MetadataUpload,
    DataDownload,
    DataUpload,
    DataDeletion,
}

impl QueueKind {
    /// All work-queue kinds, in declaration order.
    pub const ALL: [QueueKind; 5] = [
        QueueKind::MetadataDownload,
        QueueKind::MetadataUpload,
        QueueKind::DataDownload,
        QueueKind::DataUpload,
        QueueKind::DataDeletion,
    ];

    /// Queue-name prefix (the part before the config ID).
    pub fn prefix(&self) -> &'static str {
        match self {
            QueueKind::MetadataDownload => "metadata.download",
            QueueKind::MetadataUpload => "metadata.upload",
            QueueKind::DataDownload => "data.download",
            QueueKind::DataUpload => "data.upload",
            QueueKind::DataDeletion => "data.delete",
        }
    }

    /// Operator-facing process-type key (used in status payloads, retry
    /// filters, and the `x-queue-type` header).
    pub fn api_key(&self) -> &'static str {
        match self {
            QueueKind::MetadataDownload => "metadataDownload",
            QueueKind::MetadataUpload => "metadataUpload",
            QueueKind::DataDownload => "dataDownload",
            QueueKind::DataUpload => "dataUpload",
            QueueKind::DataDeletion => "dataDeletion",
        }
    }

    /// Parse an operator-facing process-type key.
    pub fn from_api_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.api_key() == key)
    }

    /// Full queue name for a configuration.
    pub fn queue_name(&self, config_id: &ConfigId) -> String {
        format!("{}.{}", self.prefix(), config_id)
    }

    /// Parse a queue name back into `(kind, config_id)`.
    ///
    /// The config ID is everything after the kind prefix; config IDs may
    /// themselves contain dots, so the prefix match is anchored.
    pub fn parse_queue_name(name: &str) -> Option<(Self, ConfigId)> {
        for kind in Self::ALL {
            let prefix = kind.prefix();
            if let Some(rest) = name.strip_prefix(prefix) {
                if let Some(id) = rest.strip_prefix('.') {
                    if !id.is_empty() {
                        return Some((kind, ConfigId::new(id)));
                    }
                }
            }
        }
        None
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_key())
    }
}

/// Name of the dead-letter queue for a configuration.
pub fn failed_queue_name(config_id: &ConfigId) -> String {
    format!("failed.{}", config_id)
}

/// The full queue family of one configuration: five work queues plus the DLQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFamily {
    pub config_id: ConfigId,
}

impl QueueFamily {
    pub fn new(config_id: ConfigId) -> Self {
        Self { config_id }
    }

    /// Names of the five work queues, in declaration order.
    pub fn work_queues(&self) -> Vec<String> {
        QueueKind::ALL
            .iter()
            .map(|k| k.queue_name(&self.config_id))
            .collect()
    }

    /// Name of the family's dead-letter queue.
    pub fn dead_letter_queue(&self) -> String {
        failed_queue_name(&self.config_id)
    }

    /// All six queue names (work queues followed by the DLQ).
    pub fn all_queues(&self) -> Vec<String> {
        let mut queues = self.work_queues();
        queues.push(self.dead_letter_queue());
        queues
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
