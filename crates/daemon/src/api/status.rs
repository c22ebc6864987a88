// SPDX-License-Identifier: MIT

//! Aggregated per-configuration status.

use super::response::ApiError;
use super::AppState;
use axum::extract::{Path, State};
use axum::Json;
use porter_core::{Clock, ConfigId};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub(super) async fn config_status(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    let status = state.engine.config_status(&config_id).await?;

    // Queues keyed by process type, the shape operators consume.
    let mut queues = Map::new();
    for entry in &status.queues {
        queues.insert(
            entry.kind.api_key().to_string(),
            serde_json::to_value(entry).map_err(|e| ApiError::Internal(e.to_string()))?,
        );
    }

    let mut body = json!({
        "success": true,
        "configId": config_id,
        "status": status.status,
        "queues": queues,
        "health": status.health,
        "dlqTotal": status.dlq_total,
        "timestamp": state.engine.clock().epoch_ms(),
    });

    // Live validation progress, when a session exists for this config.
    if let Some(session) = state.engine.sessions().latest_for(&config_id) {
        body["validation"] = json!({
            "sessionId": session.id,
            "status": session.status,
            "progress": session.progress,
            "destinationErrors": session.destination_errors,
        });
    }

    Ok(Json(body))
}
