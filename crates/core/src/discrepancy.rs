// SPDX-License-Identifier: MIT

//! Validation discrepancy model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of disagreement a discrepancy records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    MissingInDestination,
    MissingInSource,
    ValueMismatch,
    MetadataMismatch,
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyKind::MissingInDestination => write!(f, "missing_in_destination"),
            DiscrepancyKind::MissingInSource => write!(f, "missing_in_source"),
            DiscrepancyKind::ValueMismatch => write!(f, "value_mismatch"),
            DiscrepancyKind::MetadataMismatch => write!(f, "metadata_mismatch"),
        }
    }
}

/// How serious a discrepancy is for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One source↔destination disagreement found by a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub data_element: String,
    pub org_unit: String,
    pub period: String,
    pub category_option_combo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_value: Option<String>,
    pub kind: DiscrepancyKind,
    pub severity: Severity,
}

#[cfg(test)]
#[path = "discrepancy_tests.rs"]
mod tests;
