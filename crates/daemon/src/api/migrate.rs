// SPDX-License-Identifier: MIT

//! Plan trigger endpoints: metadata/data download, deletion, validation.

use super::response::ApiError;
use super::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use porter_config::ValidationParams;
use porter_core::{ConfigId, MetadataSelection, MetadataSource};
use porter_engine::DataPlanRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct MetadataDownloadBody {
    metadata_source: Option<MetadataSource>,
    selected_dashboards: Vec<String>,
    selected_visualizations: Vec<String>,
    selected_maps: Vec<String>,
}

pub(super) async fn metadata_download(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    body: Option<Json<MetadataDownloadBody>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    plan_metadata(&state, ConfigId::new(config_id), body).await
}

/// GET variant for the UI: array params arrive JSON-encoded
/// (`selectedDashboards=["a","b"]`).
pub(super) async fn metadata_download_query(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = MetadataDownloadBody {
        metadata_source: params
            .get("metadataSource")
            .map(|s| parse_metadata_source(s))
            .transpose()?,
        selected_dashboards: json_array_param(&params, "selectedDashboards")?,
        selected_visualizations: json_array_param(&params, "selectedVisualizations")?,
        selected_maps: json_array_param(&params, "selectedMaps")?,
    };
    plan_metadata(&state, ConfigId::new(config_id), body).await
}

async fn plan_metadata(
    state: &AppState,
    config_id: ConfigId,
    body: MetadataDownloadBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let selection = MetadataSelection {
        dashboards: body.selected_dashboards,
        visualizations: body.selected_visualizations,
        maps: body.selected_maps,
    };
    let summary = state
        .engine
        .plan_metadata_download(
            &config_id,
            selection,
            body.metadata_source.unwrap_or_default(),
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "metadata download queued",
            "configId": summary.config_id,
            "totalItems": summary.total_items,
            "status": "processing",
        })),
    ))
}

pub(super) async fn data_download(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Json(request): Json<DataPlanRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    plan_data(&state, ConfigId::new(config_id), request).await
}

pub(super) async fn data_download_query(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = data_request_from_query(&params)?;
    plan_data(&state, ConfigId::new(config_id), request).await
}

pub(super) async fn data_delete(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Json(mut request): Json<DataPlanRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    request.is_delete = true;
    plan_data(&state, ConfigId::new(config_id), request).await
}

pub(super) async fn data_delete_query(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut request = data_request_from_query(&params)?;
    request.is_delete = true;
    plan_data(&state, ConfigId::new(config_id), request).await
}

async fn plan_data(
    state: &AppState,
    config_id: ConfigId,
    request: DataPlanRequest,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let summary = state.engine.plan_data(&config_id, &request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": if request.is_delete { "data deletion queued" } else { "data download queued" },
            "configId": summary.config_id,
            "totalItems": summary.total_items,
            "status": "processing",
        })),
    ))
}

pub(super) async fn data_validation(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Json(params): Json<ValidationParams>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let config_id = ConfigId::new(config_id);
    let session_id = state.engine.start_validation(&config_id, params).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "configId": config_id,
            "sessionId": session_id,
            "status": "processing",
        })),
    ))
}

fn data_request_from_query(params: &HashMap<String, String>) -> Result<DataPlanRequest, ApiError> {
    let mut request = DataPlanRequest {
        data_items_config_ids: json_array_param(params, "dataItemsConfigIds")?,
        ..Default::default()
    };
    request.runtime_config.periods = json_array_param(params, "periods")?;
    request.runtime_config.page_size = parse_param(params, "pageSize")?;
    request.runtime_config.timeout = parse_param(params, "timeout")?;
    request.runtime_config.paginate_by_data =
        parse_param(params, "paginateByData")?.unwrap_or(false);
    request.is_delete = parse_param(params, "isDelete")?.unwrap_or(false);
    Ok(request)
}

fn parse_metadata_source(raw: &str) -> Result<MetadataSource, ApiError> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| ApiError::BadRequest(format!("invalid metadataSource: {raw}")))
}

fn json_array_param(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Vec<String>, ApiError> {
    match params.get(key) {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("{key} must be a JSON array of strings"))),
    }
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ApiError> {
    params
        .get(key)
        .map(|raw| {
            raw.parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid {key}: {raw}")))
        })
        .transpose()
}
