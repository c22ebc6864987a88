// SPDX-License-Identifier: MIT

//! Operator-facing status aggregation.

use crate::engine::Engine;
use crate::error::EngineError;
use porter_adapters::headers;
use porter_core::{Clock, ConfigId, QueueKind};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// How many DLQ messages are scanned when attributing them to their
/// originating queues.
pub(crate) const DLQ_SCAN_LIMIT: usize = 500;

/// Per-queue (and aggregate) run state, ordered by display priority:
/// RUNNING > QUEUED > FAILED > COMPLETED > IDLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Idle,
    Completed,
    Failed,
    Queued,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Completed => write!(f, "COMPLETED"),
            RunState::Failed => write!(f, "FAILED"),
            RunState::Queued => write!(f, "QUEUED"),
            RunState::Running => write!(f, "RUNNING"),
        }
    }
}

/// Status of one work queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusEntry {
    pub queue: String,
    pub kind: QueueKind,
    pub ready: u64,
    pub unacked: u64,
    pub consumers: u64,
    pub dlq_messages: u64,
    pub status: RunState,
}

/// Family-wide health summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyHealth {
    pub healthy: bool,
    pub total_queues: usize,
    pub active_queues: usize,
    pub failed_queues: usize,
    pub issues: Vec<String>,
}

/// Aggregated status of a configuration's queue family.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    pub config_id: ConfigId,
    pub queues: Vec<QueueStatusEntry>,
    pub status: RunState,
    pub health: FamilyHealth,
    pub dlq_total: u64,
}

/// Status of one queue from its counters. Having ever processed a message
/// separates COMPLETED from IDLE.
pub(crate) fn queue_status(ready: u64, unacked: u64, dlq: u64, processed: u64) -> RunState {
    if unacked > 0 {
        RunState::Running
    } else if ready > 0 {
        RunState::Queued
    } else if dlq > 0 {
        RunState::Failed
    } else if processed > 0 {
        RunState::Completed
    } else {
        RunState::Idle
    }
}

impl<C: Clock> Engine<C> {
    /// Full status report for one configuration.
    pub async fn config_status(&self, config_id: &ConfigId) -> Result<ConfigStatus, EngineError> {
        self.configs.get(config_id).await?;
        let stats = self.family_stats(config_id).await?;

        // Attribute DLQ messages to their originating queues via the
        // x-queue-type header stored at failure time.
        let mut dlq_by_kind: HashMap<QueueKind, u64> = HashMap::new();
        let mut dlq_total = 0;
        if let Ok(dead) = self.broker.peek(&stats.dlq_name, DLQ_SCAN_LIMIT, 0).await {
            dlq_total = dead.len() as u64;
            for message in dead {
                if let Some(kind) = message
                    .headers
                    .get(headers::QUEUE_TYPE)
                    .and_then(|v| QueueKind::from_api_key(v))
                {
                    *dlq_by_kind.entry(kind).or_insert(0) += 1;
                }
            }
        }

        let mut queues = Vec::with_capacity(stats.queues.len());
        let mut issues = Vec::new();
        let mut failed_queues = 0;
        let mut active_queues = 0;
        for queue in &stats.queues {
            let dlq_messages = dlq_by_kind.get(&queue.kind).copied().unwrap_or(0);
            let processed = self.metrics.counters(config_id, queue.kind).processed;
            let status = queue_status(queue.ready, queue.unacked, dlq_messages, processed);
            if dlq_messages > 0 {
                failed_queues += 1;
                issues.push(format!(
                    "{} dead-lettered message(s) from {}",
                    dlq_messages, queue.name
                ));
            }
            if queue.consumers > 0 {
                active_queues += 1;
            }
            queues.push(QueueStatusEntry {
                queue: queue.name.clone(),
                kind: queue.kind,
                ready: queue.ready,
                unacked: queue.unacked,
                consumers: queue.consumers,
                dlq_messages,
                status,
            });
        }

        let status = queues
            .iter()
            .map(|q| q.status)
            .max()
            .unwrap_or(RunState::Idle);

        Ok(ConfigStatus {
            config_id: config_id.clone(),
            status,
            health: FamilyHealth {
                healthy: failed_queues == 0,
                total_queues: stats.queues.len(),
                active_queues,
                failed_queues,
                issues,
            },
            queues,
            dlq_total,
        })
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
