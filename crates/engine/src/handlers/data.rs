// SPDX-License-Identifier: MIT

//! Data download and upload/deletion handlers.

use crate::engine::Engine;
use crate::error::HandlerError;
use crate::mapping::{apply_attribute_fanout, rewrite_values};
use porter_adapters::{AnalyticsQuery, Endpoint, ImportStrategy, UpstreamError};
use porter_core::{
    Clock, DataValueSet, IdGen, JobEnvelope, JobId, JobKind, PayloadSource, PlanOverrides,
    UuidIdGen,
};
use std::time::Duration;

/// Delay before the single in-handler retry of a transient upload fault.
const INLINE_RETRY_DELAY: Duration = Duration::from_secs(2);

impl<C: Clock> Engine<C> {
    /// Fetch one `(dataItemConfig, period)` slice from the source, translate
    /// it to destination identifiers, persist it to a scratch file, and
    /// publish the upload (or deletion) job.
    pub(crate) async fn handle_data_download(
        &self,
        envelope: &JobEnvelope,
        data_item_config_id: &str,
        period_id: &str,
        overrides: &PlanOverrides,
        is_delete: bool,
    ) -> Result<(), HandlerError> {
        let config = self.configs.get(&envelope.config_id).await?;
        let item = config.data_item(data_item_config_id).ok_or_else(|| {
            HandlerError::PayloadInvalid(format!(
                "unknown data item config: {data_item_config_id}"
            ))
        })?;

        let source_endpoint = self.source_endpoint(&config);
        let dest_endpoint = self.dest_endpoint(&config);

        let mappings = self
            .expand_mappings(&source_endpoint, &dest_endpoint, &item.mappings)
            .await?;
        if mappings.is_empty() {
            tracing::warn!(
                config = %envelope.config_id,
                item = data_item_config_id,
                "no mapping pairs resolved, nothing to download"
            );
            return Ok(());
        }

        let mut dx: Vec<String> = Vec::new();
        for mapping in &mappings {
            if !dx.contains(&mapping.source.data_element) {
                dx.push(mapping.source.data_element.clone());
            }
        }

        // Request-level overrides win over the item configuration.
        let level = overrides
            .org_unit_level_id
            .as_deref()
            .or(item.org_unit_level.as_deref());
        let parent = overrides
            .parent_org_unit_id
            .as_deref()
            .unwrap_or(&item.parent_org_unit);
        let mut ou = Vec::new();
        if let Some(level) = level {
            ou.push(format!("LEVEL-{level}"));
        }
        ou.push(parent.to_string());

        let timeout = overrides
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.defaults.data_timeout);

        let set = self
            .dhis
            .data_value_set(
                &source_endpoint,
                &AnalyticsQuery {
                    dx,
                    pe: vec![period_id.to_string()],
                    ou,
                    timeout,
                },
            )
            .await
            .map_err(HandlerError::from_upstream)?;

        let fetched = set.len();
        let numeric = DataValueSet::new(
            set.data_values
                .into_iter()
                .filter(|v| v.is_numeric())
                .collect(),
        );
        let mut translated = rewrite_values(numeric, &mappings);

        if let Some(selector) = &item.attribute_combo {
            let combos = self
                .fanout_combos(&dest_endpoint, &selector.attribute_id, &selector.category_option_id)
                .await?;
            translated = apply_attribute_fanout(translated, &combos);
        }

        tracing::info!(
            config = %envelope.config_id,
            item = data_item_config_id,
            period = period_id,
            fetched,
            translated = translated.len(),
            "data slice downloaded"
        );
        if translated.is_empty() {
            return Ok(());
        }

        let path = self
            .scratch
            .write(&envelope.config_id, &translated)
            .map_err(|e| HandlerError::Internal(e.to_string()))?;

        let upload = JobEnvelope::new(
            envelope.config_id.clone(),
            JobId::new(UuidIdGen.next()),
            self.clock.epoch_ms(),
            JobKind::DataUpload {
                source: PayloadSource::File { path },
                is_delete,
            },
        );
        self.publish_job(&upload).await?;
        Ok(())
    }

    async fn fanout_combos(
        &self,
        endpoint: &Endpoint,
        attribute_id: &str,
        category_option_id: &str,
    ) -> Result<Vec<porter_adapters::CategoryOptionCombo>, HandlerError> {
        self.dhis
            .option_combos_for_attribute(endpoint, attribute_id, category_option_id)
            .await
            .map_err(HandlerError::from_upstream)
    }

    /// Upload (or delete) a data-value set at the destination. File-backed
    /// and inline payloads converge on the same logic; the scratch file is
    /// removed on success and on definitive rejection, and kept for
    /// transient faults so the broker retry can re-read it.
    pub(crate) async fn handle_data_upload(
        &self,
        envelope: &JobEnvelope,
        source: &PayloadSource,
        is_delete: bool,
    ) -> Result<(), HandlerError> {
        let config = self.configs.get(&envelope.config_id).await?;

        let set = match source {
            PayloadSource::Inline { value } => serde_json::from_value::<DataValueSet>(value.clone())
                .map_err(|e| HandlerError::PayloadInvalid(format!("invalid payload: {e}")))?,
            PayloadSource::File { path } => self.scratch.read(path)?,
        };
        if set.is_empty() {
            self.finalize_payload(source);
            return Err(HandlerError::PayloadInvalid(
                "dataValues must be a non-empty array".to_string(),
            ));
        }

        let strategy = if is_delete {
            ImportStrategy::Delete
        } else {
            ImportStrategy::CreateAndUpdate
        };
        let endpoint = self.dest_endpoint(&config);

        let mut result = self
            .dhis
            .post_data_values(&endpoint, &set, strategy, self.defaults.dest_timeout)
            .await;
        if matches!(&result, Err(e) if e.is_transient()) {
            tracing::warn!(
                config = %envelope.config_id,
                "transient upload fault, one inline retry"
            );
            tokio::time::sleep(INLINE_RETRY_DELAY).await;
            result = self
                .dhis
                .post_data_values(&endpoint, &set, strategy, self.defaults.dest_timeout)
                .await;
        }

        match result {
            Ok(summary) => {
                tracing::info!(
                    config = %envelope.config_id,
                    imported = summary.import_count.imported,
                    updated = summary.import_count.updated,
                    ignored = summary.import_count.ignored,
                    deleted = summary.import_count.deleted,
                    is_delete,
                    "data values imported"
                );
                self.finalize_payload(source);
                Ok(())
            }
            Err(UpstreamError::Conflict {
                summary: Some(summary),
                ..
            }) => {
                tracing::warn!(
                    config = %envelope.config_id,
                    imported = summary.import_count.imported,
                    ignored = summary.import_count.ignored,
                    "upload conflict, treated as partial success"
                );
                self.finalize_payload(source);
                Ok(())
            }
            // A 409 without an import summary is not a partial success.
            Err(e @ UpstreamError::Conflict { summary: None, .. }) => {
                self.finalize_payload(source);
                Err(HandlerError::Fatal(e))
            }
            Err(e) => {
                let error = HandlerError::from_upstream(e);
                if !error.is_retryable() {
                    // Definitive rejection: the payload will never import.
                    self.finalize_payload(source);
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "data_tests.rs"]
mod tests;
