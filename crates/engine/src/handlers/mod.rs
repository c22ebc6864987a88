// SPDX-License-Identifier: MIT

//! Job handlers, one per process kind.

mod data;
mod metadata;

use crate::engine::Engine;
use crate::error::HandlerError;
use porter_core::{Clock, JobEnvelope, JobKind, PayloadSource};

impl<C: Clock> Engine<C> {
    /// Route a job to its handler.
    pub(crate) async fn dispatch(&self, envelope: &JobEnvelope) -> Result<(), HandlerError> {
        match &envelope.kind {
            JobKind::MetadataDownload {
                selection,
                metadata_source,
            } => {
                self.handle_metadata_download(envelope, selection, *metadata_source)
                    .await
            }
            JobKind::MetadataUpload { source } => {
                self.handle_metadata_upload(envelope, source).await
            }
            JobKind::DataDownload {
                data_item_config_id,
                period_id,
                overrides,
                is_delete,
            } => {
                self.handle_data_download(envelope, data_item_config_id, period_id, overrides, *is_delete)
                    .await
            }
            JobKind::DataUpload { source, is_delete } => {
                self.handle_data_upload(envelope, source, *is_delete).await
            }
        }
    }

    /// Shared finalize step of the upload handlers: a file-backed payload is
    /// removed once the message reached a terminal outcome (success or
    /// definitive rejection). Inline payloads need no cleanup.
    pub(crate) fn finalize_payload(&self, source: &PayloadSource) {
        if let PayloadSource::File { path } = source {
            if let Err(e) = self.scratch.remove(path) {
                tracing::warn!(path = %path.display(), error = %e, "scratch cleanup failed");
            }
        }
    }
}
