// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    integer = { "10", true },
    float = { "3.25", true },
    negative = { "-4", true },
    padded = { " 7 ", true },
    word = { "ten", false },
    empty = { "", false },
    partial = { "10kg", false },
)]
fn numeric_detection(value: &str, expected: bool) {
    let dv = DataValue {
        data_element: "DE_A".into(),
        period: "202401".into(),
        org_unit: "OU_X".into(),
        category_option_combo: None,
        attribute_option_combo: None,
        value: value.into(),
    };
    assert_eq!(dv.is_numeric(), expected);
}

#[test]
fn value_set_wire_shape() {
    let set = DataValueSet::new(vec![DataValue {
        data_element: "DE_B".into(),
        period: "202401".into(),
        org_unit: "OU_X".into(),
        category_option_combo: Some("C1".into()),
        attribute_option_combo: None,
        value: "10".into(),
    }]);
    let json = serde_json::to_value(&set).unwrap();
    assert_eq!(json["dataValues"][0]["dataElement"], "DE_B");
    assert_eq!(json["dataValues"][0]["categoryOptionCombo"], "C1");
    assert!(json["dataValues"][0].get("attributeOptionCombo").is_none());
}

#[test]
fn empty_set_deserializes_from_empty_object() {
    let set: DataValueSet = serde_json::from_str("{}").unwrap();
    assert!(set.is_empty());
}

#[test]
fn import_summary_parses_partial_body() {
    let summary: ImportSummary = serde_json::from_value(serde_json::json!({
        "importCount": {"imported": 1, "ignored": 2}
    }))
    .unwrap();
    assert_eq!(summary.import_count.imported, 1);
    assert_eq!(summary.import_count.ignored, 2);
    assert_eq!(summary.import_count.updated, 0);
}
