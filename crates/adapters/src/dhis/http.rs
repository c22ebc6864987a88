// SPDX-License-Identifier: MIT

//! reqwest-backed DHIS2 API adapter.

use super::{
    AnalyticsQuery, CategoryOptionCombo, DhisApi, Endpoint, ImportStrategy, UpstreamError,
};
use async_trait::async_trait;
use porter_core::{DataValueSet, ImportCount, ImportSummary, MetadataSelection};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// HTTP adapter for DHIS2-compatible instances.
#[derive(Clone)]
pub struct HttpDhisApi {
    client: reqwest::Client,
}

impl HttpDhisApi {
    pub fn new() -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| UpstreamError::Connection {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        url: String,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let response = check_status(&url, response).await?;
        response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidBody {
                url,
                message: e.to_string(),
            })
    }

    async fn post_json(
        &self,
        endpoint: &Endpoint,
        url: String,
        query: &[(String, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .post(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .query(query)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let response = check_status(&url, response).await?;
        response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidBody {
                url,
                message: e.to_string(),
            })
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout {
            url: url.to_string(),
        }
    } else {
        UpstreamError::Connection {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 409 {
        return Err(UpstreamError::Conflict {
            url: url.to_string(),
            summary: parse_import_summary(&body),
        });
    }
    Err(UpstreamError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

/// Pull an import summary out of a response body. Handles both the
/// data-value shape (`{response: {importCount: …}}`, sometimes unnested)
/// and the metadata shape (`{stats: {created, updated, ignored, deleted}}`).
fn parse_import_summary(body: &str) -> Option<ImportSummary> {
    let value: Value = serde_json::from_str(body).ok()?;
    let nested = value.get("response").unwrap_or(&value);

    if nested.get("importCount").is_some() {
        return serde_json::from_value(nested.clone()).ok();
    }
    if let Some(stats) = nested.get("stats") {
        let count = |key: &str| stats.get(key).and_then(Value::as_u64).unwrap_or(0);
        return Some(ImportSummary {
            status: nested
                .get("status")
                .and_then(Value::as_str)
                .map(String::from),
            import_count: ImportCount {
                imported: count("created"),
                updated: count("updated"),
                ignored: count("ignored"),
                deleted: count("deleted"),
            },
            description: None,
        });
    }
    None
}

fn dimension_params(query: &AnalyticsQuery) -> Vec<(String, String)> {
    vec![
        ("dimension".to_string(), format!("dx:{}", query.dx.join(";"))),
        ("dimension".to_string(), format!("pe:{}", query.pe.join(";"))),
        ("dimension".to_string(), format!("ou:{}", query.ou.join(";"))),
    ]
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElementCombosBody {
    #[serde(default)]
    category_combo: Option<CategoryComboBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryComboBody {
    #[serde(default)]
    category_option_combos: Vec<CategoryOptionCombo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryBody {
    #[serde(default)]
    category_options: Vec<IdRef>,
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryOptionBody {
    #[serde(default)]
    category_option_combos: Vec<CategoryOptionCombo>,
}

/// Default timeout for small metadata lookups.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
impl DhisApi for HttpDhisApi {
    async fn data_value_set(
        &self,
        endpoint: &Endpoint,
        query: &AnalyticsQuery,
    ) -> Result<DataValueSet, UpstreamError> {
        let url = endpoint.url_for("analytics/dataValueSet.json");
        self.get_json(endpoint, url, &dimension_params(query), query.timeout)
            .await
    }

    async fn post_data_values(
        &self,
        endpoint: &Endpoint,
        set: &DataValueSet,
        strategy: ImportStrategy,
        timeout: Duration,
    ) -> Result<ImportSummary, UpstreamError> {
        let url = endpoint.url_for("dataValueSets");
        let query = vec![
            ("importStrategy".to_string(), strategy.as_str().to_string()),
            ("async".to_string(), "false".to_string()),
        ];
        let body = serde_json::to_value(set).map_err(|e| UpstreamError::InvalidBody {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let response = self.post_json(endpoint, url.clone(), &query, &body, timeout).await?;
        parse_import_summary(&response.to_string()).ok_or(UpstreamError::InvalidBody {
            url,
            message: "response carried no import summary".to_string(),
        })
    }

    async fn element_combos(
        &self,
        endpoint: &Endpoint,
        data_element: &str,
    ) -> Result<Vec<CategoryOptionCombo>, UpstreamError> {
        let url = endpoint.url_for(&format!("dataElements/{data_element}.json"));
        let query = vec![(
            "fields".to_string(),
            "categoryCombo[categoryOptionCombos[id,name]]".to_string(),
        )];
        let body: ElementCombosBody =
            self.get_json(endpoint, url, &query, LOOKUP_TIMEOUT).await?;
        Ok(body
            .category_combo
            .map(|combo| combo.category_option_combos)
            .unwrap_or_default())
    }

    async fn option_combos_for_attribute(
        &self,
        endpoint: &Endpoint,
        attribute_id: &str,
        category_option_id: &str,
    ) -> Result<Vec<CategoryOptionCombo>, UpstreamError> {
        let url = endpoint.url_for(&format!("categories/{attribute_id}.json"));
        let query = vec![("fields".to_string(), "categoryOptions[id]".to_string())];
        let category: CategoryBody = self
            .get_json(endpoint, url.clone(), &query, LOOKUP_TIMEOUT)
            .await?;
        if !category
            .category_options
            .iter()
            .any(|o| o.id == category_option_id)
        {
            return Err(UpstreamError::InvalidBody {
                url,
                message: format!(
                    "category option {category_option_id} does not belong to {attribute_id}"
                ),
            });
        }

        let url = endpoint.url_for(&format!("categoryOptions/{category_option_id}.json"));
        let query = vec![(
            "fields".to_string(),
            "categoryOptionCombos[id,name]".to_string(),
        )];
        let body: CategoryOptionBody =
            self.get_json(endpoint, url, &query, LOOKUP_TIMEOUT).await?;
        Ok(body.category_option_combos)
    }

    async fn metadata_objects(
        &self,
        endpoint: &Endpoint,
        selection: &MetadataSelection,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let groups: [(&str, &Vec<String>); 3] = [
            ("dashboards", &selection.dashboards),
            ("visualizations", &selection.visualizations),
            ("maps", &selection.maps),
        ];

        let mut bundle = serde_json::Map::new();
        for (object_type, ids) in groups {
            for id in ids {
                // The per-object metadata endpoint returns the full
                // transitive dependency closure of the object.
                let url = endpoint.url_for(&format!("{object_type}/{id}/metadata.json"));
                let closure: Value = self.get_json(endpoint, url, &[], timeout).await?;
                merge_bundle(&mut bundle, closure);
            }
        }
        Ok(Value::Object(bundle))
    }

    async fn post_metadata(
        &self,
        endpoint: &Endpoint,
        bundle: &Value,
        timeout: Duration,
    ) -> Result<ImportSummary, UpstreamError> {
        let url = endpoint.url_for("metadata");
        let query = vec![
            ("importStrategy".to_string(), "CREATE_AND_UPDATE".to_string()),
            ("atomicMode".to_string(), "NONE".to_string()),
        ];
        let response = self
            .post_json(endpoint, url.clone(), &query, bundle, timeout)
            .await?;
        parse_import_summary(&response.to_string()).ok_or(UpstreamError::InvalidBody {
            url,
            message: "response carried no import summary".to_string(),
        })
    }
}

/// Merge a metadata closure into the bundle, deduplicating each object list
/// by `id`. The `system` block is not metadata and is skipped.
fn merge_bundle(bundle: &mut serde_json::Map<String, Value>, closure: Value) {
    let Value::Object(closure) = closure else {
        return;
    };
    for (key, value) in closure {
        if key == "system" {
            continue;
        }
        let Value::Array(items) = value else {
            continue;
        };
        let entry = bundle
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(existing) = entry else {
            continue;
        };
        for item in items {
            let id = item.get("id").and_then(Value::as_str);
            let duplicate = id.is_some_and(|id| {
                existing
                    .iter()
                    .any(|e| e.get("id").and_then(Value::as_str) == Some(id))
            });
            if !duplicate {
                existing.push(item);
            }
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
