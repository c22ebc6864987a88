// SPDX-License-Identifier: MIT

//! Job planner: expands migration requests into per-period, per-data-item
//! jobs and publishes them.

use crate::engine::Engine;
use crate::error::EngineError;
use porter_adapters::{headers, ChannelRole, MessageHeaders};
use porter_config::RuntimeConfig;
use porter_core::period::spanned_interval;
use porter_core::{
    Clock, ConfigId, IdGen, JobEnvelope, JobId, JobKind, MetadataSelection, MetadataSource,
    PlanOverrides, UuidIdGen,
};
use serde::{Deserialize, Serialize};

/// Result of a plan: how many jobs were published.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub config_id: ConfigId,
    pub total_items: usize,
    pub jobs_published: usize,
}

/// A data download/deletion request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataPlanRequest {
    pub data_items_config_ids: Vec<String>,
    pub runtime_config: RuntimeConfig,
    pub is_delete: bool,
}

impl<C: Clock> Engine<C> {
    /// Plan a metadata download: a single job carrying the selection.
    /// An empty selection still enqueues a job; it completes immediately.
    pub async fn plan_metadata_download(
        &self,
        config_id: &ConfigId,
        selection: MetadataSelection,
        metadata_source: MetadataSource,
    ) -> Result<PlanSummary, EngineError> {
        self.configs.get(config_id).await?;

        let total_items = selection.total_items();
        let envelope = JobEnvelope::new(
            config_id.clone(),
            JobId::new(UuidIdGen.next()),
            self.clock.epoch_ms(),
            JobKind::MetadataDownload {
                selection,
                metadata_source,
            },
        );
        self.publish_job(&envelope).await?;

        tracing::info!(
            config = %config_id,
            total_items,
            "planned metadata download"
        );
        Ok(PlanSummary {
            config_id: config_id.clone(),
            total_items,
            jobs_published: 1,
        })
    }

    /// Plan a data download (or deletion): one job per
    /// `(dataItemConfig, period)` pair. Pairs are emitted in request order
    /// with periods chronological, so identical inputs produce identical
    /// plans.
    pub async fn plan_data(
        &self,
        config_id: &ConfigId,
        request: &DataPlanRequest,
    ) -> Result<PlanSummary, EngineError> {
        let config = self.configs.get(config_id).await?;

        if request.data_items_config_ids.is_empty() {
            return Err(EngineError::Validation(
                "dataItemsConfigIds must not be empty".to_string(),
            ));
        }
        let (start, end) = spanned_interval(&request.runtime_config.periods)?;

        let mut jobs_published = 0;
        for item_id in &request.data_items_config_ids {
            let item = config.data_item(item_id).ok_or_else(|| {
                EngineError::Validation(format!("unknown data item config: {item_id}"))
            })?;

            let periods = item.period_type.generate_within(start, end);
            for period in periods {
                let envelope = JobEnvelope::new(
                    config_id.clone(),
                    JobId::new(UuidIdGen.next()),
                    self.clock.epoch_ms(),
                    JobKind::DataDownload {
                        data_item_config_id: item_id.clone(),
                        period_id: period.id.clone(),
                        overrides: PlanOverrides {
                            org_unit_level_id: request.runtime_config.org_unit_level_id.clone(),
                            parent_org_unit_id: request
                                .runtime_config
                                .parent_org_unit_id
                                .clone(),
                            timeout_ms: request.runtime_config.timeout,
                        },
                        is_delete: request.is_delete,
                    },
                );
                self.publish_job(&envelope).await?;
                jobs_published += 1;
            }
        }

        tracing::info!(
            config = %config_id,
            jobs = jobs_published,
            is_delete = request.is_delete,
            "planned data migration"
        );
        Ok(PlanSummary {
            config_id: config_id.clone(),
            total_items: jobs_published,
            jobs_published,
        })
    }

    /// Publish a job envelope to its queue on the worker-publish channel,
    /// mirroring the retry count and queue type into the message headers.
    pub(crate) async fn publish_job(&self, envelope: &JobEnvelope) -> Result<(), EngineError> {
        let queue = envelope.queue_name();
        let body = envelope
            .to_bytes()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let mut message_headers = MessageHeaders::new();
        message_headers.insert(
            headers::RETRY_COUNT.to_string(),
            envelope.retry_count.to_string(),
        );
        message_headers.insert(
            headers::QUEUE_TYPE.to_string(),
            envelope.kind.queue_kind().api_key().to_string(),
        );

        self.broker
            .publish(ChannelRole::WorkerPublish, &queue, body, message_headers)
            .await?;
        tracing::debug!(queue = %queue, job = %envelope.job_id, "published job");
        Ok(())
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
