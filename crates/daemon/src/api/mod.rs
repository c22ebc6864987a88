// SPDX-License-Identifier: MIT

//! HTTP API: plan triggers, queue management, status, and DLQ operations.

mod failed;
mod migrate;
mod queues;
mod response;
mod status;

pub use response::ApiError;

use axum::routing::{get, post};
use axum::Router;
use porter_engine::Engine;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state of every request handler.
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Build the service router.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let state = Arc::new(AppState { engine });
    Router::new()
        .route(
            "/metadata-download/:config_id",
            post(migrate::metadata_download).get(migrate::metadata_download_query),
        )
        .route(
            "/data-download/:config_id",
            post(migrate::data_download).get(migrate::data_download_query),
        )
        .route(
            "/data-delete/:config_id",
            post(migrate::data_delete).get(migrate::data_delete_query),
        )
        .route("/data-validation/:config_id", post(migrate::data_validation))
        .route(
            "/queues/:config_id",
            post(queues::create).delete(queues::delete).get(queues::stats),
        )
        .route("/status/:config_id", get(status::config_status))
        .route(
            "/failed-queue/:config_id",
            get(failed::list).delete(failed::purge),
        )
        .route("/retry/:config_id", get(failed::retry_by_type))
        .route(
            "/retry/:config_id/message/:message_id",
            post(failed::retry_message),
        )
        .route("/info", get(info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
