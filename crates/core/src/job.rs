// SPDX-License-Identifier: MIT

//! Job envelope and per-kind payloads.
//!
//! A job is the unit of work placed on a queue. The envelope is the broker
//! wire contract: UTF-8 JSON with a `kind` discriminator and camelCase
//! fields. Changing field names breaks operators' tooling.

use crate::{ConfigId, JobId, QueueKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the metadata-download handler reads metadata from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataSource {
    /// The source instance, proxied through the destination's route.
    #[serde(rename = "source")]
    Source,
    /// The local portal configuration store.
    #[serde(rename = "flexiportal-config")]
    FlexiportalConfig,
}

impl Default for MetadataSource {
    fn default() -> Self {
        MetadataSource::Source
    }
}

/// Selected metadata objects for a download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataSelection {
    pub dashboards: Vec<String>,
    pub visualizations: Vec<String>,
    pub maps: Vec<String>,
}

impl MetadataSelection {
    /// Total number of selected objects across all types.
    pub fn total_items(&self) -> usize {
        self.dashboards.len() + self.visualizations.len() + self.maps.len()
    }
}

/// Payload carried either inline or through a scratch file.
///
/// Upload handlers treat both variants identically: the file variant is
/// read and then handled as inline, with file cleanup as a shared finalize
/// step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PayloadSource {
    Inline { value: serde_json::Value },
    File { path: PathBuf },
}

/// Per-request overrides threaded from the plan request into download jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanOverrides {
    /// Overrides the data item's configured org-unit level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_unit_level_id: Option<String>,
    /// Overrides the data item's configured parent org unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_org_unit_id: Option<String>,
    /// Upstream request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Kind-specific job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobKind {
    #[serde(rename_all = "camelCase")]
    MetadataDownload {
        #[serde(flatten)]
        selection: MetadataSelection,
        metadata_source: MetadataSource,
    },
    MetadataUpload {
        source: PayloadSource,
    },
    #[serde(rename_all = "camelCase")]
    DataDownload {
        data_item_config_id: String,
        period_id: String,
        #[serde(default)]
        overrides: PlanOverrides,
        #[serde(default)]
        is_delete: bool,
    },
    #[serde(rename_all = "camelCase")]
    DataUpload {
        source: PayloadSource,
        #[serde(default)]
        is_delete: bool,
    },
}

impl JobKind {
    /// Which work queue this job belongs on.
    pub fn queue_kind(&self) -> QueueKind {
        match self {
            JobKind::MetadataDownload { .. } => QueueKind::MetadataDownload,
            JobKind::MetadataUpload { .. } => QueueKind::MetadataUpload,
            JobKind::DataDownload { .. } => QueueKind::DataDownload,
            JobKind::DataUpload { is_delete: false, .. } => QueueKind::DataUpload,
            JobKind::DataUpload { is_delete: true, .. } => QueueKind::DataDeletion,
        }
    }
}

/// A unit of work placed on a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub config_id: ConfigId,
    pub job_id: JobId,
    /// Attempts so far; mirrored in the `x-retry-count` message header.
    #[serde(default)]
    pub retry_count: u32,
    /// Epoch milliseconds when the job was published.
    pub queued_at: u64,
    #[serde(flatten)]
    pub kind: JobKind,
}

impl JobEnvelope {
    pub fn new(config_id: ConfigId, job_id: JobId, queued_at: u64, kind: JobKind) -> Self {
        Self {
            config_id,
            job_id,
            retry_count: 0,
            queued_at,
            kind,
        }
    }

    /// Queue name this envelope is published to.
    pub fn queue_name(&self) -> String {
        self.kind.queue_kind().queue_name(&self.config_id)
    }

    /// Serialize to the broker body bytes (UTF-8 JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse broker body bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
