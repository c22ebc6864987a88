// SPDX-License-Identifier: MIT

//! Queue family endpoints.

use super::response::ApiError;
use super::AppState;
use axum::extract::{Path, State};
use axum::Json;
use porter_core::ConfigId;
use serde_json::{json, Value};
use std::sync::Arc;

pub(super) async fn create(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    let queues = state.engine.create_queue_family(&config_id).await?;
    Ok(Json(json!({
        "success": true,
        "configId": config_id,
        "queues": queues,
        "deadLetterQueue": porter_core::queue::failed_queue_name(&config_id),
    })))
}

pub(super) async fn delete(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    let deleted = state.engine.delete_queue_family(&config_id).await?;
    Ok(Json(json!({
        "success": true,
        "configId": config_id,
        "deletedQueues": deleted.deleted_queues,
        "messagesPurged": deleted.messages_purged,
    })))
}

pub(super) async fn stats(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    let stats = state.engine.family_stats(&config_id).await?;
    Ok(Json(json!({
        "success": true,
        "configId": config_id,
        "queues": stats.queues,
        "dlq": {
            "name": stats.dlq_name,
            "ready": stats.dlq_ready,
        },
    })))
}
