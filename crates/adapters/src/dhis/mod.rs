// SPDX-License-Identifier: MIT

//! Upstream DHIS2-compatible API adapters

mod http;

pub use http::HttpDhisApi;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{DhisCall, FakeDhisApi};

use async_trait::async_trait;
use porter_core::{DataValueSet, ImportSummary, MetadataSelection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from upstream HTTP calls.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("timeout calling {url}")]
    Timeout { url: String },
    #[error("connection fault calling {url}: {message}")]
    Connection { url: String, message: String },
    #[error("http {status} from {url}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    /// 409 with a partial-success import summary when the body carried one.
    #[error("conflict from {url}")]
    Conflict {
        url: String,
        summary: Option<ImportSummary>,
    },
    #[error("invalid upstream response from {url}: {message}")]
    InvalidBody { url: String, message: String },
}

impl UpstreamError {
    /// Whether a retry may help: connection faults, timeouts, and the
    /// transient HTTP statuses (408 and 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout { .. } | UpstreamError::Connection { .. } => true,
            UpstreamError::Status { status, .. } => {
                *status == 408 || (500..=599).contains(status)
            }
            UpstreamError::Conflict { .. } | UpstreamError::InvalidBody { .. } => false,
        }
    }

    /// HTTP status code, when the fault is an HTTP error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Conflict { .. } => Some(409),
            UpstreamError::Timeout { .. }
            | UpstreamError::Connection { .. }
            | UpstreamError::InvalidBody { .. } => None,
        }
    }

    /// URL of the failed request, when known.
    pub fn url(&self) -> Option<&str> {
        match self {
            UpstreamError::Timeout { url }
            | UpstreamError::Connection { url, .. }
            | UpstreamError::Status { url, .. }
            | UpstreamError::Conflict { url, .. }
            | UpstreamError::InvalidBody { url, .. } => Some(url),
        }
    }
}

/// One upstream instance to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// When set, requests go through the destination's route proxy:
    /// `{base}/api/routes/{route}/run/{path}`.
    pub route: Option<String>,
}

impl Endpoint {
    /// Absolute URL for an API path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.route {
            Some(route) => format!("{base}/api/routes/{route}/run/{path}"),
            None => format!("{base}/api/{path}"),
        }
    }
}

/// Import strategy for `dataValueSets` posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    CreateAndUpdate,
    Delete,
}

impl ImportStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStrategy::CreateAndUpdate => "CREATE_AND_UPDATE",
            ImportStrategy::Delete => "DELETE",
        }
    }
}

/// An `analytics/dataValueSet.json` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsQuery {
    /// Data dimension (data element IDs).
    pub dx: Vec<String>,
    /// Period dimension (period IDs).
    pub pe: Vec<String>,
    /// Org-unit dimension (IDs and `LEVEL-n` selectors).
    pub ou: Vec<String>,
    pub timeout: Duration,
}

/// A category-option-combo reference (id + name), the join key of the
/// mapping engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOptionCombo {
    pub id: String,
    pub name: String,
}

/// Calls against a DHIS2-compatible HTTP API.
#[async_trait]
pub trait DhisApi: Send + Sync {
    /// Fetch aggregate values via the analytics data-value-set endpoint.
    async fn data_value_set(
        &self,
        endpoint: &Endpoint,
        query: &AnalyticsQuery,
    ) -> Result<DataValueSet, UpstreamError>;

    /// POST a data-value set with the given import strategy (`async=false`).
    async fn post_data_values(
        &self,
        endpoint: &Endpoint,
        set: &DataValueSet,
        strategy: ImportStrategy,
        timeout: Duration,
    ) -> Result<ImportSummary, UpstreamError>;

    /// Category-option-combos of a data element's category combo.
    async fn element_combos(
        &self,
        endpoint: &Endpoint,
        data_element: &str,
    ) -> Result<Vec<CategoryOptionCombo>, UpstreamError>;

    /// Category-option-combos of one category option, verifying the option
    /// belongs to the given attribute category.
    async fn option_combos_for_attribute(
        &self,
        endpoint: &Endpoint,
        attribute_id: &str,
        category_option_id: &str,
    ) -> Result<Vec<CategoryOptionCombo>, UpstreamError>;

    /// Selected dashboards/visualizations/maps with their full dependency
    /// closure, merged into one metadata bundle.
    async fn metadata_objects(
        &self,
        endpoint: &Endpoint,
        selection: &MetadataSelection,
        timeout: Duration,
    ) -> Result<serde_json::Value, UpstreamError>;

    /// POST a metadata bundle to the metadata-import endpoint.
    async fn post_metadata(
        &self,
        endpoint: &Endpoint,
        bundle: &serde_json::Value,
        timeout: Duration,
    ) -> Result<ImportSummary, UpstreamError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
