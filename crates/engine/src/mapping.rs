// SPDX-License-Identifier: MIT

//! Mapping engine: source↔destination identifier translation.
//!
//! Bare mappings are expanded to compound `dataElement.categoryOptionCombo`
//! pairs by joining the two sides' category-option-combos, by ID first and
//! name second. Combos with no match on the other side are dropped.

use crate::engine::Engine;
use crate::error::HandlerError;
use porter_adapters::{CategoryOptionCombo, Endpoint};
use porter_config::{Mapping, MappingSide};
use porter_core::{Clock, DataValue, DataValueSet};
use std::collections::HashMap;

/// A fully-qualified data element + category-option-combo reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboRef {
    pub data_element: String,
    pub category_option_combo: String,
}

impl ComboRef {
    pub fn combo_key(&self) -> String {
        format!("{}.{}", self.data_element, self.category_option_combo)
    }
}

/// One expanded mapping pair. Both sides are always compound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    pub source: ComboRef,
    pub destination: ComboRef,
}

impl<C: Clock> Engine<C> {
    /// Expand a mapping list into fully-qualified pairs (§ComboRef). The
    /// output is deduplicated and every pair is compound.
    pub async fn expand_mappings(
        &self,
        source_endpoint: &Endpoint,
        dest_endpoint: &Endpoint,
        mappings: &[Mapping],
    ) -> Result<Vec<ResolvedMapping>, HandlerError> {
        let mut resolved: Vec<ResolvedMapping> = Vec::new();
        let mut push_unique = |pair: ResolvedMapping, out: &mut Vec<ResolvedMapping>| {
            if !out.contains(&pair) {
                out.push(pair);
            }
        };

        for mapping in mappings {
            let source_side = mapping.source();
            let dest_side = mapping.destination();

            // Both sides already compound: pass through unchanged.
            if let (Some(source_coc), Some(dest_coc)) = (
                source_side.category_option_combo,
                dest_side.category_option_combo,
            ) {
                push_unique(
                    ResolvedMapping {
                        source: ComboRef {
                            data_element: source_side.data_element.to_string(),
                            category_option_combo: source_coc.to_string(),
                        },
                        destination: ComboRef {
                            data_element: dest_side.data_element.to_string(),
                            category_option_combo: dest_coc.to_string(),
                        },
                    },
                    &mut resolved,
                );
                continue;
            }

            let source_combos = self.side_combos(source_endpoint, &source_side).await?;
            let dest_combos = self.side_combos(dest_endpoint, &dest_side).await?;

            for (dest_combo, source_combo) in match_combos(&dest_combos, &source_combos) {
                push_unique(
                    ResolvedMapping {
                        source: ComboRef {
                            data_element: source_side.data_element.to_string(),
                            category_option_combo: source_combo.id.clone(),
                        },
                        destination: ComboRef {
                            data_element: dest_side.data_element.to_string(),
                            category_option_combo: dest_combo.id.clone(),
                        },
                    },
                    &mut resolved,
                );
            }
        }
        Ok(resolved)
    }

    /// Combos of one mapping side. A compound side is narrowed to its named
    /// combo (resolving the combo's name for the join); a bare side expands
    /// to the element's full combo list.
    async fn side_combos(
        &self,
        endpoint: &Endpoint,
        side: &MappingSide<'_>,
    ) -> Result<Vec<CategoryOptionCombo>, HandlerError> {
        let combos = self
            .dhis
            .element_combos(endpoint, side.data_element)
            .await
            .map_err(HandlerError::from_upstream)?;
        Ok(match side.category_option_combo {
            Some(coc) => combos.into_iter().filter(|c| c.id == coc).collect(),
            None => combos,
        })
    }
}

/// Join destination combos to source combos: ID equality first, name
/// equality as the fallback. Unmatched destination combos are dropped.
pub(crate) fn match_combos<'a>(
    dest: &'a [CategoryOptionCombo],
    source: &'a [CategoryOptionCombo],
) -> Vec<(&'a CategoryOptionCombo, &'a CategoryOptionCombo)> {
    dest.iter()
        .filter_map(|d| {
            source
                .iter()
                .find(|s| s.id == d.id)
                .or_else(|| source.iter().find(|s| s.name == d.name))
                .map(|s| (d, s))
        })
        .collect()
}

/// Rewrite downloaded values to destination identifiers. Values whose
/// element/combo has no mapping cannot be translated and are dropped.
pub(crate) fn rewrite_values(set: DataValueSet, mappings: &[ResolvedMapping]) -> DataValueSet {
    let by_combo: HashMap<(&str, &str), &ResolvedMapping> = mappings
        .iter()
        .map(|m| {
            (
                (
                    m.source.data_element.as_str(),
                    m.source.category_option_combo.as_str(),
                ),
                m,
            )
        })
        .collect();
    let by_element: HashMap<&str, &str> = mappings
        .iter()
        .map(|m| {
            (
                m.source.data_element.as_str(),
                m.destination.data_element.as_str(),
            )
        })
        .collect();

    let rewritten = set
        .data_values
        .into_iter()
        .filter_map(|mut value| {
            match &value.category_option_combo {
                Some(coc) => {
                    let mapping = by_combo.get(&(value.data_element.as_str(), coc.as_str()))?;
                    let new_data_element = mapping.destination.data_element.clone();
                    let new_category_option_combo =
                        mapping.destination.category_option_combo.clone();
                    value.data_element = new_data_element;
                    value.category_option_combo = Some(new_category_option_combo);
                }
                None => {
                    let dest_element = by_element.get(value.data_element.as_str())?;
                    value.data_element = (*dest_element).to_string();
                }
            }
            Some(value)
        })
        .collect();
    DataValueSet::new(rewritten)
}

/// Replicate each value once per category-option-combo of the selected
/// category option, with `attributeOptionCombo` set accordingly.
pub fn apply_attribute_fanout(set: DataValueSet, combos: &[CategoryOptionCombo]) -> DataValueSet {
    let fanned = set
        .data_values
        .into_iter()
        .flat_map(|value| {
            combos.iter().map(move |combo| DataValue {
                attribute_option_combo: Some(combo.id.clone()),
                ..value.clone()
            })
        })
        .collect();
    DataValueSet::new(fanned)
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
