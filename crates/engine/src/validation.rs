// SPDX-License-Identifier: MIT

//! Validation engine: parallel source↔destination fetch and key-joined diff.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::mapping::rewrite_values;
use crate::sessions::{ValidationSession, ValidationStatus};
use porter_adapters::{AnalyticsQuery, Endpoint, UpstreamError};
use porter_config::{Configuration, ValidationParams};
use porter_core::{
    Clock, ConfigId, DataValueSet, Discrepancy, DiscrepancyKind, IdGen, Severity, UuidIdGen,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Join key of the diff: one cell of the data cube. A value without an
/// explicit combo joins under `"default"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueKey {
    pub data_element: String,
    pub period: String,
    pub org_unit: String,
    pub category_option_combo: String,
}

pub(crate) fn value_map(set: &DataValueSet) -> HashMap<ValueKey, String> {
    set.data_values
        .iter()
        .map(|v| {
            (
                ValueKey {
                    data_element: v.data_element.clone(),
                    period: v.period.clone(),
                    org_unit: v.org_unit.clone(),
                    category_option_combo: v
                        .category_option_combo
                        .clone()
                        .unwrap_or_else(|| "default".to_string()),
                },
                v.value.clone(),
            )
        })
        .collect()
}

/// Key-joined diff between source and destination value maps.
///
/// Severity of a value mismatch: destination greater than source is
/// critical; otherwise an absolute difference above 100 is major, and
/// anything else minor.
pub fn diff_values(
    source: &HashMap<ValueKey, String>,
    destination: &HashMap<ValueKey, String>,
) -> Vec<Discrepancy> {
    let mut discrepancies = Vec::new();

    for (key, source_value) in source {
        match destination.get(key) {
            None => discrepancies.push(discrepancy(
                key,
                Some(source_value.clone()),
                None,
                DiscrepancyKind::MissingInDestination,
                Severity::Major,
            )),
            Some(dest_value) if dest_value != source_value => {
                let severity = mismatch_severity(source_value, dest_value);
                discrepancies.push(discrepancy(
                    key,
                    Some(source_value.clone()),
                    Some(dest_value.clone()),
                    DiscrepancyKind::ValueMismatch,
                    severity,
                ));
            }
            Some(_) => {}
        }
    }

    for (key, dest_value) in destination {
        if !source.contains_key(key) {
            discrepancies.push(discrepancy(
                key,
                None,
                Some(dest_value.clone()),
                DiscrepancyKind::MissingInSource,
                Severity::Minor,
            ));
        }
    }

    discrepancies.sort_by(|a, b| {
        (&a.data_element, &a.period, &a.org_unit, &a.category_option_combo).cmp(&(
            &b.data_element,
            &b.period,
            &b.org_unit,
            &b.category_option_combo,
        ))
    });
    discrepancies
}

fn mismatch_severity(source: &str, destination: &str) -> Severity {
    match (source.trim().parse::<f64>(), destination.trim().parse::<f64>()) {
        (Ok(s), Ok(d)) if d > s => Severity::Critical,
        (Ok(s), Ok(d)) if (d - s).abs() > 100.0 => Severity::Major,
        (Ok(_), Ok(_)) => Severity::Minor,
        // Values that do not parse as numbers still differ as strings.
        _ => Severity::Major,
    }
}

fn discrepancy(
    key: &ValueKey,
    source_value: Option<String>,
    destination_value: Option<String>,
    kind: DiscrepancyKind,
    severity: Severity,
) -> Discrepancy {
    Discrepancy {
        data_element: key.data_element.clone(),
        org_unit: key.org_unit.clone(),
        period: key.period.clone(),
        category_option_combo: key.category_option_combo.clone(),
        source_value,
        destination_value,
        kind,
        severity,
    }
}

impl<C: Clock> Engine<C> {
    /// Start a validation run. Returns the session ID; progress and results
    /// are observable through the session store. The request parameters are
    /// persisted so operators can re-run without re-entering them.
    pub async fn start_validation(
        self: &Arc<Self>,
        config_id: &ConfigId,
        params: ValidationParams,
    ) -> Result<String, EngineError> {
        let config = self.configs.get(config_id).await?;
        self.configs.save_validation_params(config_id, &params).await?;

        let session_id = UuidIdGen.next();
        self.sessions.create(ValidationSession::new(
            session_id.clone(),
            config_id.clone(),
            self.clock.epoch_ms(),
        ));

        let engine = Arc::clone(self);
        let task_session = session_id.clone();
        tokio::spawn(async move {
            engine.run_validation(config, params, task_session).await;
        });
        Ok(session_id)
    }

    async fn run_validation(
        self: Arc<Self>,
        config: Configuration,
        params: ValidationParams,
        session_id: String,
    ) {
        let result = self.validate(&config, &params, &session_id).await;
        let finished_at = self.clock.epoch_ms();
        match result {
            Ok(()) => self.sessions.update(&session_id, |s| {
                s.status = ValidationStatus::Completed;
                s.finished_at_ms = Some(finished_at);
            }),
            Err(e) => {
                tracing::error!(config = %config.id, error = %e, "validation run failed");
                self.sessions.update(&session_id, |s| {
                    s.status = ValidationStatus::Failed;
                    s.finished_at_ms = Some(finished_at);
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    async fn validate(
        &self,
        config: &Configuration,
        params: &ValidationParams,
        session_id: &str,
    ) -> Result<(), EngineError> {
        let mut items = Vec::new();
        for item_id in &params.data_items_config_ids {
            items.push(config.data_item(item_id).ok_or_else(|| {
                EngineError::Validation(format!("unknown data item config: {item_id}"))
            })?);
        }

        let mappings: Vec<porter_config::Mapping> = items
            .iter()
            .flat_map(|item| item.mappings.iter().cloned())
            .collect();
        let periods = params.runtime_config.periods.clone();

        // Nothing selected: an empty, completed report.
        if items.is_empty() || periods.is_empty() || mappings.is_empty() {
            tracing::info!(config = %config.id, "validation with empty selection");
            return Ok(());
        }

        let source_endpoint = self.source_endpoint(config);
        let dest_endpoint = self.dest_endpoint(config);
        let resolved = self
            .expand_mappings(&source_endpoint, &dest_endpoint, &mappings)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let mut source_dx: Vec<String> = Vec::new();
        let mut dest_dx: Vec<String> = Vec::new();
        for mapping in &resolved {
            if !source_dx.contains(&mapping.source.data_element) {
                source_dx.push(mapping.source.data_element.clone());
            }
            if !dest_dx.contains(&mapping.destination.data_element) {
                dest_dx.push(mapping.destination.data_element.clone());
            }
        }
        if source_dx.is_empty() {
            tracing::info!(config = %config.id, "no data elements resolved for validation");
            return Ok(());
        }

        let mut org_units: Vec<String> = Vec::new();
        for item in &items {
            let level = params
                .runtime_config
                .org_unit_level_id
                .as_deref()
                .or(item.org_unit_level.as_deref());
            if let Some(level) = level {
                let selector = format!("LEVEL-{level}");
                if !org_units.contains(&selector) {
                    org_units.push(selector);
                }
            }
            let parent = params
                .runtime_config
                .parent_org_unit_id
                .as_deref()
                .unwrap_or(&item.parent_org_unit);
            if !org_units.contains(&parent.to_string()) {
                org_units.push(parent.to_string());
            }
        }

        let timeout = params
            .runtime_config
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(self.defaults.data_timeout);
        let page_size = params
            .runtime_config
            .page_size
            .filter(|_| params.runtime_config.paginate_by_data);

        tracing::info!(
            config = %config.id,
            source_elements = source_dx.len(),
            periods = periods.len(),
            skip_destination = params.skip_destination,
            "validation fetch starting"
        );

        let source_fetch = self.fetch_values(
            &source_endpoint,
            &source_dx,
            &periods,
            &org_units,
            timeout,
            page_size,
        );
        let dest_fetch = self.fetch_values(
            &dest_endpoint,
            &dest_dx,
            &periods,
            &org_units,
            timeout,
            page_size,
        );

        let (source_result, dest_result) = if params.skip_destination {
            (source_fetch.await, (DataValueSet::default(), Vec::new()))
        } else {
            tokio::join!(source_fetch, dest_fetch)
        };

        // Source faults fail the run: there is nothing to compare against.
        let (source_set, source_errors) = source_result;
        if let Some(error) = source_errors.into_iter().next() {
            return Err(EngineError::Internal(error));
        }
        // Destination faults are surfaced, never silently treated as an
        // empty destination: that would report everything as missing.
        let (dest_set, dest_errors) = dest_result;
        for error in &dest_errors {
            tracing::warn!(config = %config.id, error = %error, "destination fetch failed");
        }

        let source_map = value_map(&rewrite_values(source_set, &resolved));
        let dest_map = value_map(&dest_set);
        let total_records = (source_map.len() + dest_map.len()) as u64;
        self.sessions.update(session_id, |s| {
            s.progress.total_records = total_records;
            s.destination_errors = dest_errors.clone();
        });

        let discrepancies = diff_values(&source_map, &dest_map);
        tracing::info!(
            config = %config.id,
            records = total_records,
            discrepancies = discrepancies.len(),
            "validation diff complete"
        );
        self.sessions.update(session_id, |s| {
            s.progress.records_processed = total_records;
            s.progress.discrepancies_found = discrepancies.len() as u64;
            s.discrepancies = discrepancies;
        });
        Ok(())
    }

    /// Fetch values, optionally splitting the data-element list into chunks
    /// of `page_size`. Fetch faults are returned alongside whatever data was
    /// retrieved.
    async fn fetch_values(
        &self,
        endpoint: &Endpoint,
        dx: &[String],
        periods: &[String],
        org_units: &[String],
        timeout: Duration,
        page_size: Option<usize>,
    ) -> (DataValueSet, Vec<String>) {
        let chunks: Vec<&[String]> = match page_size {
            Some(size) if size > 0 => dx.chunks(size).collect(),
            _ => vec![dx],
        };

        let mut values = Vec::new();
        let mut errors = Vec::new();
        for chunk in chunks {
            let query = AnalyticsQuery {
                dx: chunk.to_vec(),
                pe: periods.to_vec(),
                ou: org_units.to_vec(),
                timeout,
            };
            match self.dhis.data_value_set(endpoint, &query).await {
                Ok(set) => values.extend(set.data_values),
                Err(e) => errors.push(fetch_error_message(endpoint, &e)),
            }
        }
        (DataValueSet::new(values), errors)
    }
}

fn fetch_error_message(endpoint: &Endpoint, error: &UpstreamError) -> String {
    format!("{}: {error}", endpoint.base_url)
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
