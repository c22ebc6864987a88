// SPDX-License-Identifier: MIT

//! Dead-letter queue inspection and operator-initiated replay.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::status::DLQ_SCAN_LIMIT;
use porter_adapters::{headers, BrokerError, ChannelRole, MessageHeaders, PeekedMessage};
use porter_core::queue::failed_queue_name;
use porter_core::{Clock, ConfigId, JobEnvelope, QueueKind};
use serde::Serialize;

/// Default cap on operator-initiated DLQ replays. Distinct from the worker's
/// immediate-requeue limit; the operator may request more per call.
pub const DEFAULT_REPLAY_LIMIT: usize = 10;

/// One dead-lettered message as shown to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMessage {
    pub message_id: String,
    /// Originating queue kind, from the `x-queue-type` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_type: Option<QueueKind>,
    pub headers: MessageHeaders,
    /// Parsed job body; present when requested and parseable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A page of the dead-letter queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedQueueListing {
    pub config_id: ConfigId,
    pub total: usize,
    pub messages: Vec<FailedMessage>,
}

fn queue_type_of(message: &PeekedMessage) -> Option<QueueKind> {
    message
        .headers
        .get(headers::QUEUE_TYPE)
        .and_then(|v| QueueKind::from_api_key(v))
}

impl<C: Clock> Engine<C> {
    /// Page through the family DLQ, optionally filtered by originating
    /// queue kind.
    pub async fn list_failed(
        &self,
        config_id: &ConfigId,
        limit: usize,
        offset: usize,
        include_messages: bool,
        queue_filter: Option<QueueKind>,
    ) -> Result<FailedQueueListing, EngineError> {
        self.configs.get(config_id).await?;
        let dlq = failed_queue_name(config_id);

        let dead = match self.broker.peek(&dlq, DLQ_SCAN_LIMIT, 0).await {
            Ok(dead) => dead,
            Err(BrokerError::QueueMissing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let matching: Vec<&PeekedMessage> = dead
            .iter()
            .filter(|m| queue_filter.map_or(true, |k| queue_type_of(m) == Some(k)))
            .collect();
        let total = matching.len();

        let messages = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|m| FailedMessage {
                message_id: m.message_id.clone(),
                queue_type: queue_type_of(m),
                headers: m.headers.clone(),
                body: include_messages
                    .then(|| serde_json::from_slice(&m.body).ok())
                    .flatten(),
            })
            .collect();

        Ok(FailedQueueListing {
            config_id: config_id.clone(),
            total,
            messages,
        })
    }

    /// Drop every message from the family DLQ.
    pub async fn purge_failed(&self, config_id: &ConfigId) -> Result<u64, EngineError> {
        self.configs.get(config_id).await?;
        let dlq = failed_queue_name(config_id);
        match self.broker.purge_queue(&dlq).await {
            Ok(purged) => Ok(purged),
            Err(BrokerError::QueueMissing(_)) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-publish up to `max_retries` DLQ messages of one process type back
    /// to their original queue, with the retry counter reset.
    pub async fn replay_by_process_type(
        &self,
        config_id: &ConfigId,
        process_type: QueueKind,
        max_retries: Option<usize>,
    ) -> Result<usize, EngineError> {
        self.configs.get(config_id).await?;
        let dlq = failed_queue_name(config_id);
        let limit = max_retries.unwrap_or(DEFAULT_REPLAY_LIMIT);

        let dead = match self.broker.peek(&dlq, DLQ_SCAN_LIMIT, 0).await {
            Ok(dead) => dead,
            Err(BrokerError::QueueMissing(_)) => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut replayed = 0;
        for message in dead {
            if replayed >= limit {
                break;
            }
            if queue_type_of(&message) != Some(process_type) {
                continue;
            }
            let Some(taken) = self.broker.take_message(&dlq, &message.message_id).await? else {
                continue;
            };
            self.republish_failed(config_id, process_type, taken).await?;
            replayed += 1;
        }

        tracing::info!(
            config = %config_id,
            process_type = %process_type,
            replayed,
            "replayed dead-lettered messages"
        );
        Ok(replayed)
    }

    /// Re-publish a single DLQ message. Returns false when no such message
    /// exists.
    pub async fn replay_message(
        &self,
        config_id: &ConfigId,
        message_id: &str,
    ) -> Result<bool, EngineError> {
        self.configs.get(config_id).await?;
        let dlq = failed_queue_name(config_id);

        let taken = match self.broker.take_message(&dlq, message_id).await {
            Ok(taken) => taken,
            Err(BrokerError::QueueMissing(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let Some(message) = taken else {
            return Ok(false);
        };
        let Some(kind) = queue_type_of(&message) else {
            // Without an origin queue the message cannot be routed; put it
            // back where it was.
            self.broker
                .publish(
                    ChannelRole::WorkerPublish,
                    &dlq,
                    message.body,
                    message.headers,
                )
                .await?;
            return Err(EngineError::Validation(format!(
                "message {message_id} carries no originating queue"
            )));
        };

        self.republish_failed(config_id, kind, message).await?;
        Ok(true)
    }

    /// Publish a taken DLQ message back to its origin queue with the retry
    /// counter reset and the failure headers cleared.
    async fn republish_failed(
        &self,
        config_id: &ConfigId,
        kind: QueueKind,
        message: PeekedMessage,
    ) -> Result<(), EngineError> {
        let mut message_headers = MessageHeaders::new();
        message_headers.insert(headers::RETRY_COUNT.to_string(), "0".to_string());
        message_headers.insert(headers::QUEUE_TYPE.to_string(), kind.api_key().to_string());

        // Reset the envelope-side counter too, when the body parses.
        let body = match JobEnvelope::from_bytes(&message.body) {
            Ok(mut envelope) => {
                envelope.retry_count = 0;
                self.retry_counts.lock().remove(envelope.job_id.as_str());
                envelope
                    .to_bytes()
                    .map_err(|e| EngineError::Internal(e.to_string()))?
            }
            Err(_) => message.body,
        };

        self.broker
            .publish(
                ChannelRole::WorkerPublish,
                &kind.queue_name(config_id),
                body,
                message_headers,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "failed_tests.rs"]
mod tests;
