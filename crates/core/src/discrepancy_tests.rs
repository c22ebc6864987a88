// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn kind_wire_names_are_snake_case() {
    assert_eq!(
        serde_json::to_string(&DiscrepancyKind::MissingInDestination).unwrap(),
        "\"missing_in_destination\""
    );
    assert_eq!(DiscrepancyKind::ValueMismatch.to_string(), "value_mismatch");
}

#[test]
fn severity_orders_minor_to_critical() {
    assert!(Severity::Minor < Severity::Major);
    assert!(Severity::Major < Severity::Critical);
}

#[test]
fn discrepancy_serializes_without_absent_values() {
    let d = Discrepancy {
        data_element: "DE_A".into(),
        org_unit: "OU_X".into(),
        period: "202401".into(),
        category_option_combo: "default".into(),
        source_value: Some("10".into()),
        destination_value: None,
        kind: DiscrepancyKind::MissingInDestination,
        severity: Severity::Major,
    };
    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["sourceValue"], "10");
    assert!(json.get("destinationValue").is_none());
    assert_eq!(json["kind"], "missing_in_destination");
    assert_eq!(json["severity"], "major");
}
