// SPDX-License-Identifier: MIT

//! Data-value wire shapes (DHIS2 `dataValueSets` contract).

use serde::{Deserialize, Serialize};

/// A single aggregate data value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    pub data_element: String,
    pub period: String,
    pub org_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_option_combo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_option_combo: Option<String>,
    pub value: String,
}

impl DataValue {
    /// Whether the `value` field parses as a number. Non-numeric values are
    /// dropped before upload.
    pub fn is_numeric(&self) -> bool {
        self.value.trim().parse::<f64>().is_ok()
    }
}

/// A set of data values, the scratch-file and upload payload shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueSet {
    #[serde(default)]
    pub data_values: Vec<DataValue>,
}

impl DataValueSet {
    pub fn new(data_values: Vec<DataValue>) -> Self {
        Self { data_values }
    }

    pub fn is_empty(&self) -> bool {
        self.data_values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data_values.len()
    }
}

/// Counts from an upstream import response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportCount {
    pub imported: u64,
    pub updated: u64,
    pub ignored: u64,
    pub deleted: u64,
}

/// Summary of an upstream import (data values or metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub import_count: ImportCount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
#[path = "data_value_tests.rs"]
mod tests;
