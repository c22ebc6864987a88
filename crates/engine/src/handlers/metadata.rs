// SPDX-License-Identifier: MIT

//! Metadata download and upload handlers.

use crate::engine::Engine;
use crate::error::HandlerError;
use porter_core::{
    Clock, IdGen, JobEnvelope, JobId, JobKind, MetadataSelection, MetadataSource, PayloadSource,
    UuidIdGen,
};
use serde_json::Value;

impl<C: Clock> Engine<C> {
    /// Fetch the selected dashboards/visualizations/maps with their
    /// dependency closure and publish a single upload job with the bundle.
    pub(crate) async fn handle_metadata_download(
        &self,
        envelope: &JobEnvelope,
        selection: &MetadataSelection,
        metadata_source: MetadataSource,
    ) -> Result<(), HandlerError> {
        let config = self.configs.get(&envelope.config_id).await?;

        let bundle = match metadata_source {
            MetadataSource::Source => {
                let endpoint = self.proxied_source_endpoint(&config);
                self.dhis
                    .metadata_objects(&endpoint, selection, self.defaults.source_timeout)
                    .await
                    .map_err(HandlerError::from_upstream)?
            }
            MetadataSource::FlexiportalConfig => self
                .configs
                .portal_metadata(&envelope.config_id)
                .await?
                .ok_or_else(|| {
                    HandlerError::PayloadInvalid(format!(
                        "no portal metadata stored for {}",
                        envelope.config_id
                    ))
                })?,
        };

        let object_count = bundle
            .as_object()
            .map(|o| o.values().filter_map(Value::as_array).map(Vec::len).sum::<usize>())
            .unwrap_or(0);
        tracing::info!(
            config = %envelope.config_id,
            objects = object_count,
            "metadata downloaded"
        );
        // An empty selection produces an empty bundle; nothing to upload.
        if object_count == 0 {
            return Ok(());
        }

        let upload = JobEnvelope::new(
            envelope.config_id.clone(),
            JobId::new(UuidIdGen.next()),
            self.clock.epoch_ms(),
            JobKind::MetadataUpload {
                source: PayloadSource::Inline { value: bundle },
            },
        );
        self.publish_job(&upload).await?;
        Ok(())
    }

    /// POST the metadata bundle to the destination. A 409 carrying an import
    /// summary is partial success: counts are logged and the job completes.
    pub(crate) async fn handle_metadata_upload(
        &self,
        envelope: &JobEnvelope,
        source: &PayloadSource,
    ) -> Result<(), HandlerError> {
        let config = self.configs.get(&envelope.config_id).await?;

        let bundle = match source {
            PayloadSource::Inline { value } => value.clone(),
            PayloadSource::File { path } => self.scratch.read_raw(path)?,
        };
        if !bundle.as_object().is_some_and(|o| !o.is_empty()) {
            self.finalize_payload(source);
            return Err(HandlerError::PayloadInvalid(
                "metadata bundle is empty".to_string(),
            ));
        }

        let endpoint = self.dest_endpoint(&config);
        let result = self
            .dhis
            .post_metadata(&endpoint, &bundle, self.defaults.dest_timeout)
            .await;

        match result {
            Ok(summary) => {
                tracing::info!(
                    config = %envelope.config_id,
                    imported = summary.import_count.imported,
                    updated = summary.import_count.updated,
                    ignored = summary.import_count.ignored,
                    "metadata imported"
                );
                self.finalize_payload(source);
                Ok(())
            }
            Err(porter_adapters::UpstreamError::Conflict {
                summary: Some(summary),
                ..
            }) => {
                tracing::warn!(
                    config = %envelope.config_id,
                    imported = summary.import_count.imported,
                    ignored = summary.import_count.ignored,
                    "metadata import conflict, treated as partial success"
                );
                self.finalize_payload(source);
                Ok(())
            }
            Err(e) => {
                let error = HandlerError::from_upstream(e);
                if !error.is_retryable() {
                    self.finalize_payload(source);
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
