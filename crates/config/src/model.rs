// SPDX-License-Identifier: MIT

//! Configuration model: a source/destination instance pair plus the data
//! items to migrate between them.

use porter_core::{ConfigId, PeriodType};
use serde::{Deserialize, Serialize};

/// Connection details for one DHIS2-compatible instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Route identifier used to proxy source reads through the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
}

/// One side of a mapping: a bare data element or a compound
/// `dataElement.categoryOptionCombo` identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingSide<'a> {
    pub data_element: &'a str,
    pub category_option_combo: Option<&'a str>,
}

impl<'a> MappingSide<'a> {
    /// Split an identifier on the first dot.
    pub fn parse(id: &'a str) -> Self {
        match id.split_once('.') {
            Some((de, coc)) => Self {
                data_element: de,
                category_option_combo: Some(coc),
            },
            None => Self {
                data_element: id,
                category_option_combo: None,
            },
        }
    }

    pub fn is_compound(&self) -> bool {
        self.category_option_combo.is_some()
    }
}

/// A source→destination identifier mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub source_id: String,
    pub destination_id: String,
}

impl Mapping {
    pub fn source(&self) -> MappingSide<'_> {
        MappingSide::parse(&self.source_id)
    }

    pub fn destination(&self) -> MappingSide<'_> {
        MappingSide::parse(&self.destination_id)
    }
}

/// Fans each produced value across the category-option-combos of one
/// category option, setting `attributeOptionCombo` accordingly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeComboSelector {
    pub attribute_id: String,
    pub category_option_id: String,
}

/// One migratable data item: period type, org-unit scope, and mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItemConfig {
    pub id: String,
    pub period_type: PeriodType,
    pub parent_org_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_unit_level: Option<String>,
    pub mappings: Vec<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_combo: Option<AttributeComboSelector>,
}

/// A persisted migration configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: ConfigId,
    pub source: InstanceConfig,
    pub destination: InstanceConfig,
    #[serde(default)]
    pub data_items: Vec<DataItemConfig>,
}

impl Configuration {
    /// Find a data item config by ID.
    pub fn data_item(&self, id: &str) -> Option<&DataItemConfig> {
        self.data_items.iter().find(|item| item.id == id)
    }
}

/// Runtime knobs carried on plan and validation requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub periods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    pub paginate_by_data: bool,
    /// Upstream request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_unit_level_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_org_unit_id: Option<String>,
}

/// Parameters of the most recent validation run, persisted per config so
/// operators can re-run without re-entering them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationParams {
    pub data_items_config_ids: Vec<String>,
    pub runtime_config: RuntimeConfig,
    pub skip_destination: bool,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
