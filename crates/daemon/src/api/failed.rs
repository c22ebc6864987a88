// SPDX-License-Identifier: MIT

//! Failed-queue inspection and operator retry endpoints.

use super::response::ApiError;
use super::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use porter_core::{ConfigId, QueueKind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct FailedQueueQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    include_messages: Option<bool>,
    /// Filter by originating queue (process-type key).
    queue: Option<String>,
    /// Return only the originating queues present in the DLQ.
    only_queues: Option<bool>,
}

pub(super) async fn list(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Query(query): Query<FailedQueueQuery>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    let queue_filter = query
        .queue
        .as_deref()
        .map(|raw| {
            QueueKind::from_api_key(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown queue filter: {raw}")))
        })
        .transpose()?;

    let listing = state
        .engine
        .list_failed(
            &config_id,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
            query.include_messages.unwrap_or(false),
            queue_filter,
        )
        .await?;

    if query.only_queues.unwrap_or(false) {
        let mut kinds: Vec<&str> = Vec::new();
        for message in &listing.messages {
            if let Some(kind) = message.queue_type {
                if !kinds.contains(&kind.api_key()) {
                    kinds.push(kind.api_key());
                }
            }
        }
        return Ok(Json(json!({
            "success": true,
            "configId": config_id,
            "queues": kinds,
        })));
    }

    Ok(Json(json!({
        "success": true,
        "configId": config_id,
        "total": listing.total,
        "messages": listing.messages,
    })))
}

pub(super) async fn purge(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    let purged = state.engine.purge_failed(&config_id).await?;
    Ok(Json(json!({
        "success": true,
        "configId": config_id,
        "purged": purged,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct RetryQuery {
    retry_type: Option<String>,
    process_type: Option<String>,
    max_retries: Option<usize>,
}

pub(super) async fn retry_by_type(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Query(query): Query<RetryQuery>,
) -> Result<Json<Value>, ApiError> {
    let config_id = ConfigId::new(config_id);
    if query.retry_type.as_deref() != Some("process-type") {
        return Err(ApiError::BadRequest(
            "retryType must be 'process-type'".to_string(),
        ));
    }
    let process_type = query
        .process_type
        .as_deref()
        .and_then(QueueKind::from_api_key)
        .ok_or_else(|| ApiError::BadRequest("unknown or missing processType".to_string()))?;

    let retried = state
        .engine
        .replay_by_process_type(&config_id, process_type, query.max_retries)
        .await?;
    Ok(Json(json!({
        "success": true,
        "configId": config_id,
        "processType": process_type.api_key(),
        "retried": retried,
    })))
}

pub(super) async fn retry_message(
    State(state): State<Arc<AppState>>,
    Path((config_id, message_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let config_id = ConfigId::new(config_id);
    let replayed = state.engine.replay_message(&config_id, &message_id).await?;
    if !replayed {
        return Err(ApiError::NotFound(format!(
            "message not found in failed queue: {message_id}"
        )));
    }
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "configId": config_id,
            "messageId": message_id,
        })),
    ))
}
