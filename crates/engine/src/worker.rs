// SPDX-License-Identifier: MIT

//! Worker runtime: one consumer per (configuration, queue kind), retry
//! accounting, and dead-letter routing.

use crate::engine::Engine;
use crate::error::{EngineError, HandlerError};
use parking_lot::Mutex;
use porter_adapters::{headers, BrokerError, ChannelRole, Delivery, MessageHeaders};
use porter_core::{Clock, ConfigId, JobEnvelope, QueueKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Transient failures are requeued this many times before dead-lettering.
/// Operator-initiated DLQ replay has its own, separate budget.
pub const IMMEDIATE_REQUEUE_LIMIT: u32 = 2;

/// Delay before a consumer rebinds after its stream ends.
pub const WORKER_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Per-queue processing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Process-local counters per (configuration, queue kind). The broker has no
/// durable notion of "ever ran", so COMPLETED-vs-IDLE status derives from
/// these.
#[derive(Clone, Default)]
pub struct WorkerMetrics {
    inner: Arc<Mutex<HashMap<(ConfigId, QueueKind), QueueCounters>>>,
}

impl WorkerMetrics {
    pub(crate) fn record(&self, config_id: &ConfigId, kind: QueueKind, success: bool) {
        let mut inner = self.inner.lock();
        let counters = inner.entry((config_id.clone(), kind)).or_default();
        counters.processed += 1;
        if success {
            counters.succeeded += 1;
        } else {
            counters.failed += 1;
        }
    }

    pub fn counters(&self, config_id: &ConfigId, kind: QueueKind) -> QueueCounters {
        self.inner
            .lock()
            .get(&(config_id.clone(), kind))
            .copied()
            .unwrap_or_default()
    }
}

/// Channel role for a queue kind: downloads and uploads are isolated so a
/// slow upload never stalls downloads.
pub(crate) fn channel_for(kind: QueueKind) -> ChannelRole {
    match kind {
        QueueKind::MetadataDownload | QueueKind::DataDownload => ChannelRole::Download,
        QueueKind::MetadataUpload | QueueKind::DataUpload | QueueKind::DataDeletion => {
            ChannelRole::Upload
        }
    }
}

impl<C: Clock> Engine<C> {
    /// Declare queue families and bind consumers for every configuration in
    /// the store.
    pub async fn start_workers(self: &Arc<Self>) -> Result<(), EngineError> {
        let config_ids = self.configs.list_ids().await?;
        for config_id in config_ids {
            self.start_config_workers(&config_id).await?;
        }
        Ok(())
    }

    /// Declare one configuration's queue family (idempotent) and spawn a
    /// consumer task per work queue.
    pub async fn start_config_workers(
        self: &Arc<Self>,
        config_id: &ConfigId,
    ) -> Result<(), EngineError> {
        self.create_queue_family(config_id).await?;
        for kind in QueueKind::ALL {
            let engine = Arc::clone(self);
            let config_id = config_id.clone();
            tokio::spawn(async move {
                engine.consume_loop(config_id, kind).await;
            });
        }
        Ok(())
    }

    /// Consume one queue until it is deleted. A consumer stream ending for
    /// any other reason (connection loss) rebinds after a fixed delay; the
    /// declarations are idempotent and the broker redelivers unacked
    /// messages.
    async fn consume_loop(self: Arc<Self>, config_id: ConfigId, kind: QueueKind) {
        let queue = kind.queue_name(&config_id);
        let channel = channel_for(kind);
        loop {
            let mut rx = match self
                .broker
                .consume(channel, &queue, self.defaults.prefetch)
                .await
            {
                Ok(rx) => rx,
                Err(BrokerError::QueueMissing(_)) => {
                    tracing::info!(queue = %queue, "queue gone, stopping consumer");
                    return;
                }
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "consume failed, retrying");
                    tokio::time::sleep(WORKER_RECONNECT_DELAY).await;
                    continue;
                }
            };
            tracing::info!(queue = %queue, "consumer bound");

            while let Some(delivery) = rx.recv().await {
                self.handle_delivery(delivery).await;
            }

            match self.broker.queue_stats(&queue).await {
                Err(BrokerError::QueueMissing(_)) => {
                    tracing::info!(queue = %queue, "queue deleted, stopping consumer");
                    return;
                }
                _ => {
                    tracing::warn!(queue = %queue, "consumer stream ended, rebinding");
                    tokio::time::sleep(WORKER_RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Process one delivery end to end: parse, dispatch, settle.
    pub(crate) async fn handle_delivery(&self, delivery: Delivery) {
        let Some((kind, config_id)) = QueueKind::parse_queue_name(&delivery.queue) else {
            tracing::warn!(queue = %delivery.queue, "message on unrecognized queue, discarding");
            self.settle_ack(&delivery).await;
            return;
        };

        let envelope = match JobEnvelope::from_bytes(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.record(&config_id, kind, false);
                self.dead_letter(
                    &delivery,
                    kind,
                    &HandlerError::PayloadInvalid(format!("unparseable job body: {e}")),
                    headers::retry_count(&delivery.headers),
                )
                .await;
                return;
            }
        };

        // A job on the wrong queue has no handler here. Ack and discard so a
        // poison message cannot wedge the queue.
        if envelope.kind.queue_kind() != kind {
            tracing::warn!(
                queue = %delivery.queue,
                job = %envelope.job_id,
                "job kind does not match queue, discarding"
            );
            self.settle_ack(&delivery).await;
            return;
        }

        let result = self.dispatch(&envelope).await;
        match result {
            Ok(()) => {
                self.metrics.record(&config_id, kind, true);
                self.retry_counts.lock().remove(envelope.job_id.as_str());
                self.settle_ack(&delivery).await;
                tracing::debug!(queue = %delivery.queue, job = %envelope.job_id, "job completed");
            }
            Err(error) => {
                self.metrics.record(&config_id, kind, false);
                self.fail_delivery(&delivery, kind, &envelope, error).await;
            }
        }
    }

    /// Apply the retry policy to a failed delivery.
    async fn fail_delivery(
        &self,
        delivery: &Delivery,
        kind: QueueKind,
        envelope: &JobEnvelope,
        error: HandlerError,
    ) {
        let job_id = envelope.job_id.as_str();

        if error.is_retryable() {
            // The broker's redelivery header is the durable floor; the
            // process-local table survives fast redeliveries that bypass it.
            let durable = headers::retry_count(&delivery.headers);
            let attempts = {
                let counts = self.retry_counts.lock();
                counts.get(job_id).copied().unwrap_or(0).max(durable)
            };

            if attempts < IMMEDIATE_REQUEUE_LIMIT {
                let next = attempts + 1;
                self.retry_counts.lock().insert(job_id.to_string(), next);
                let mut retry_headers = MessageHeaders::new();
                retry_headers.insert(headers::RETRY_COUNT.to_string(), next.to_string());
                tracing::warn!(
                    queue = %delivery.queue,
                    job = %job_id,
                    attempt = next,
                    error = %error,
                    "transient failure, requeueing"
                );
                if let Err(e) = self.broker.reject(delivery, retry_headers, true).await {
                    tracing::error!(job = %job_id, error = %e, "requeue failed");
                }
                return;
            }

            self.retry_counts.lock().remove(job_id);
            self.dead_letter(delivery, kind, &error, attempts).await;
            return;
        }

        // Fatal faults skip the retry budget entirely.
        self.retry_counts.lock().remove(job_id);
        self.dead_letter(delivery, kind, &error, headers::retry_count(&delivery.headers))
            .await;
    }

    /// Store the failure header set, then route to the family DLQ.
    async fn dead_letter(
        &self,
        delivery: &Delivery,
        kind: QueueKind,
        error: &HandlerError,
        retry_count: u32,
    ) {
        tracing::error!(
            queue = %delivery.queue,
            error = %error,
            retry_count,
            "dead-lettering message"
        );
        let failure = failure_headers(kind, error, retry_count, self.clock.epoch_ms());
        if let Err(e) = self.broker.reject(delivery, failure, false).await {
            tracing::error!(queue = %delivery.queue, error = %e, "dead-letter routing failed");
        }
    }

    async fn settle_ack(&self, delivery: &Delivery) {
        if let Err(e) = self.broker.ack(delivery).await {
            tracing::error!(queue = %delivery.queue, error = %e, "ack failed");
        }
    }
}

/// The full failure header set recorded before a message is dead-lettered.
pub(crate) fn failure_headers(
    kind: QueueKind,
    error: &HandlerError,
    retry_count: u32,
    epoch_ms: u64,
) -> MessageHeaders {
    let mut out = MessageHeaders::new();
    let reason = serde_json::json!({
        "name": error.taxonomy_name(),
        "message": error.to_string(),
        "status": error.upstream().and_then(|u| u.http_status()),
        "url": error.upstream().and_then(|u| u.url()),
    });
    out.insert(headers::FAILURE_REASON.to_string(), reason.to_string());
    out.insert(headers::ERROR_MESSAGE.to_string(), error.to_string());
    out.insert(
        headers::ERROR_NAME.to_string(),
        error.taxonomy_name().to_string(),
    );
    out.insert(headers::ERROR_TIMESTAMP.to_string(), epoch_ms.to_string());
    out.insert(headers::QUEUE_TYPE.to_string(), kind.api_key().to_string());
    out.insert(headers::RETRY_COUNT.to_string(), retry_count.to_string());

    if let Some(upstream) = error.upstream() {
        if let Some(status) = upstream.http_status() {
            out.insert(headers::HTTP_STATUS.to_string(), status.to_string());
        }
        if let Some(url) = upstream.url() {
            out.insert(headers::HTTP_URL.to_string(), url.to_string());
        }
        let code = match upstream {
            porter_adapters::UpstreamError::Timeout { .. } => "timeout",
            porter_adapters::UpstreamError::Connection { .. } => "connection-fault",
            porter_adapters::UpstreamError::Status { .. } => "http-status",
            porter_adapters::UpstreamError::Conflict { .. } => "conflict",
            porter_adapters::UpstreamError::InvalidBody { .. } => "invalid-body",
        };
        out.insert(headers::HTTP_CODE.to_string(), code.to_string());
    }
    out
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
