// SPDX-License-Identifier: MIT

//! Fake DHIS2 API adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    AnalyticsQuery, CategoryOptionCombo, DhisApi, Endpoint, ImportStrategy, UpstreamError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use porter_core::{DataValueSet, ImportCount, ImportSummary, MetadataSelection};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Recorded API call
#[derive(Debug, Clone)]
pub enum DhisCall {
    DataValueSet {
        base_url: String,
        dx: Vec<String>,
        pe: Vec<String>,
        ou: Vec<String>,
    },
    PostDataValues {
        base_url: String,
        values: usize,
        strategy: ImportStrategy,
    },
    ElementCombos {
        base_url: String,
        data_element: String,
    },
    OptionCombos {
        base_url: String,
        attribute_id: String,
        category_option_id: String,
    },
    MetadataObjects {
        base_url: String,
        selection: MetadataSelection,
    },
    PostMetadata {
        base_url: String,
    },
}

#[derive(Default)]
struct FakeDhisState {
    calls: Vec<DhisCall>,
    combos: HashMap<(String, String), Vec<CategoryOptionCombo>>,
    option_combos: HashMap<(String, String), Result<Vec<CategoryOptionCombo>, UpstreamError>>,
    analytics: HashMap<String, VecDeque<Result<DataValueSet, UpstreamError>>>,
    import_results: HashMap<String, VecDeque<Result<ImportSummary, UpstreamError>>>,
    metadata_bundles: HashMap<String, serde_json::Value>,
    metadata_import_results: VecDeque<Result<ImportSummary, UpstreamError>>,
}

/// Fake DHIS2 API adapter for testing.
///
/// Responses are keyed by the endpoint's base URL so source and destination
/// instances can be scripted independently.
#[derive(Clone, Default)]
pub struct FakeDhisApi {
    inner: Arc<Mutex<FakeDhisState>>,
}

impl FakeDhisApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<DhisCall> {
        self.inner.lock().calls.clone()
    }

    /// Set the category-option-combos of a data element on one instance.
    pub fn set_combos(&self, base_url: &str, data_element: &str, combos: Vec<CategoryOptionCombo>) {
        self.inner
            .lock()
            .combos
            .insert((base_url.to_string(), data_element.to_string()), combos);
    }

    /// Set the option-combo result for an attribute's category option.
    pub fn set_option_combos(
        &self,
        base_url: &str,
        category_option_id: &str,
        result: Result<Vec<CategoryOptionCombo>, UpstreamError>,
    ) {
        self.inner.lock().option_combos.insert(
            (base_url.to_string(), category_option_id.to_string()),
            result,
        );
    }

    /// Queue an analytics response for one instance (FIFO per instance).
    pub fn push_analytics(&self, base_url: &str, result: Result<DataValueSet, UpstreamError>) {
        self.inner
            .lock()
            .analytics
            .entry(base_url.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queue a data-value import result for one instance (FIFO per instance).
    pub fn push_import_result(&self, base_url: &str, result: Result<ImportSummary, UpstreamError>) {
        self.inner
            .lock()
            .import_results
            .entry(base_url.to_string())
            .or_default()
            .push_back(result);
    }

    /// Set the metadata bundle returned for one instance.
    pub fn set_metadata_bundle(&self, base_url: &str, bundle: serde_json::Value) {
        self.inner
            .lock()
            .metadata_bundles
            .insert(base_url.to_string(), bundle);
    }

    /// Queue a metadata import result.
    pub fn push_metadata_import_result(&self, result: Result<ImportSummary, UpstreamError>) {
        self.inner.lock().metadata_import_results.push_back(result);
    }

    fn success_summary(imported: u64) -> ImportSummary {
        ImportSummary {
            status: Some("SUCCESS".to_string()),
            import_count: ImportCount {
                imported,
                ..ImportCount::default()
            },
            description: None,
        }
    }
}

#[async_trait]
impl DhisApi for FakeDhisApi {
    async fn data_value_set(
        &self,
        endpoint: &Endpoint,
        query: &AnalyticsQuery,
    ) -> Result<DataValueSet, UpstreamError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DhisCall::DataValueSet {
            base_url: endpoint.base_url.clone(),
            dx: query.dx.clone(),
            pe: query.pe.clone(),
            ou: query.ou.clone(),
        });
        inner
            .analytics
            .get_mut(&endpoint.base_url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(DataValueSet::default()))
    }

    async fn post_data_values(
        &self,
        endpoint: &Endpoint,
        set: &DataValueSet,
        strategy: ImportStrategy,
        _timeout: Duration,
    ) -> Result<ImportSummary, UpstreamError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DhisCall::PostDataValues {
            base_url: endpoint.base_url.clone(),
            values: set.len(),
            strategy,
        });
        inner
            .import_results
            .get_mut(&endpoint.base_url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Self::success_summary(set.len() as u64)))
    }

    async fn element_combos(
        &self,
        endpoint: &Endpoint,
        data_element: &str,
    ) -> Result<Vec<CategoryOptionCombo>, UpstreamError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DhisCall::ElementCombos {
            base_url: endpoint.base_url.clone(),
            data_element: data_element.to_string(),
        });
        Ok(inner
            .combos
            .get(&(endpoint.base_url.clone(), data_element.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn option_combos_for_attribute(
        &self,
        endpoint: &Endpoint,
        attribute_id: &str,
        category_option_id: &str,
    ) -> Result<Vec<CategoryOptionCombo>, UpstreamError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DhisCall::OptionCombos {
            base_url: endpoint.base_url.clone(),
            attribute_id: attribute_id.to_string(),
            category_option_id: category_option_id.to_string(),
        });
        inner
            .option_combos
            .get(&(endpoint.base_url.clone(), category_option_id.to_string()))
            .cloned()
            .unwrap_or_else(|| {
                Err(UpstreamError::InvalidBody {
                    url: endpoint.base_url.clone(),
                    message: format!(
                        "category option {category_option_id} does not belong to {attribute_id}"
                    ),
                })
            })
    }

    async fn metadata_objects(
        &self,
        endpoint: &Endpoint,
        selection: &MetadataSelection,
        _timeout: Duration,
    ) -> Result<serde_json::Value, UpstreamError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DhisCall::MetadataObjects {
            base_url: endpoint.base_url.clone(),
            selection: selection.clone(),
        });
        Ok(inner
            .metadata_bundles
            .get(&endpoint.base_url)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})))
    }

    async fn post_metadata(
        &self,
        endpoint: &Endpoint,
        bundle: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<ImportSummary, UpstreamError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DhisCall::PostMetadata {
            base_url: endpoint.base_url.clone(),
        });
        let object_count = bundle
            .as_object()
            .map(|o| o.values().filter_map(|v| v.as_array()).map(Vec::len).sum::<usize>())
            .unwrap_or(0);
        inner
            .metadata_import_results
            .pop_front()
            .unwrap_or_else(|| Ok(Self::success_summary(object_count as u64)))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
