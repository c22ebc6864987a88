// SPDX-License-Identifier: MIT

//! Queue manager: declares and deletes per-configuration queue families.

use crate::engine::Engine;
use crate::error::EngineError;
use porter_core::{Clock, ConfigId, QueueFamily, QueueKind};
use porter_adapters::{QueueOptions, QueueStats};
use serde::Serialize;

/// Broker counters for one work queue of a family.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyQueueStats {
    pub name: String,
    pub kind: QueueKind,
    pub ready: u64,
    pub unacked: u64,
    pub consumers: u64,
}

/// Counters for a whole queue family.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyStats {
    pub config_id: ConfigId,
    pub queues: Vec<FamilyQueueStats>,
    pub dlq_name: String,
    pub dlq_ready: u64,
}

/// Result of deleting a queue family.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueFamilyDeleted {
    pub deleted_queues: usize,
    pub messages_purged: u64,
}

impl<C: Clock> Engine<C> {
    /// Declare the five work queues (bound to the family DLQ) plus the DLQ
    /// itself. Idempotent; fails when the configuration does not exist.
    pub async fn create_queue_family(
        &self,
        config_id: &ConfigId,
    ) -> Result<Vec<String>, EngineError> {
        self.configs.get(config_id).await?;

        let family = QueueFamily::new(config_id.clone());
        let dlq = family.dead_letter_queue();
        self.broker
            .declare_queue(&dlq, QueueOptions::default())
            .await?;

        let work_queues = family.work_queues();
        for queue in &work_queues {
            self.broker
                .declare_queue(
                    queue,
                    QueueOptions {
                        durable: true,
                        dead_letter_to: Some(dlq.clone()),
                    },
                )
                .await?;
        }

        tracing::info!(config = %config_id, "queue family declared");
        Ok(work_queues)
    }

    /// Delete the whole family, DLQ included. Deleting an absent family is
    /// a no-op that still reports six deleted queues.
    pub async fn delete_queue_family(
        &self,
        config_id: &ConfigId,
    ) -> Result<QueueFamilyDeleted, EngineError> {
        let family = QueueFamily::new(config_id.clone());
        let mut messages_purged = 0;
        let queues = family.all_queues();
        for queue in &queues {
            messages_purged += self.broker.delete_queue(queue).await?;
        }
        tracing::info!(
            config = %config_id,
            purged = messages_purged,
            "queue family deleted"
        );
        Ok(QueueFamilyDeleted {
            deleted_queues: queues.len(),
            messages_purged,
        })
    }

    /// Broker counters for every queue of the family. Undeclared queues
    /// report zero.
    pub async fn family_stats(&self, config_id: &ConfigId) -> Result<FamilyStats, EngineError> {
        let family = QueueFamily::new(config_id.clone());

        let mut queues = Vec::with_capacity(QueueKind::ALL.len());
        for kind in QueueKind::ALL {
            let name = kind.queue_name(config_id);
            let stats = self.stats_or_zero(&name).await?;
            queues.push(FamilyQueueStats {
                name,
                kind,
                ready: stats.ready,
                unacked: stats.unacked,
                consumers: stats.consumers,
            });
        }

        let dlq_name = family.dead_letter_queue();
        let dlq = self.stats_or_zero(&dlq_name).await?;
        Ok(FamilyStats {
            config_id: config_id.clone(),
            queues,
            dlq_name,
            dlq_ready: dlq.ready,
        })
    }

    async fn stats_or_zero(&self, queue: &str) -> Result<QueueStats, EngineError> {
        use porter_adapters::BrokerError;
        match self.broker.queue_stats(queue).await {
            Ok(stats) => Ok(stats),
            Err(BrokerError::QueueMissing(_)) => Ok(QueueStats::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "queues_tests.rs"]
mod tests;
