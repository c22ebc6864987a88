// SPDX-License-Identifier: MIT

//! Validation specs: diff report over the HTTP surface.

use crate::prelude::*;
use porter_core::DataValueSet;

/// Source {OU_X:10, OU_Y:5}, destination {OU_Y:7, OU_Z:3}: one missing in
/// destination (major), one mismatch with destination greater (critical),
/// one missing in source (minor).
#[tokio::test(flavor = "multi_thread")]
async fn validation_classifies_discrepancies() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");
    harness.dhis.set_combos(SOURCE_URL, "DE_A", vec![combo("C1", "Default")]);
    harness.dhis.set_combos(DEST_URL, "DE_B", vec![combo("C1", "Default")]);
    harness.dhis.push_analytics(
        SOURCE_URL,
        Ok(DataValueSet::new(vec![
            source_value("DE_A", "202401", "OU_X", "10"),
            source_value("DE_A", "202401", "OU_Y", "5"),
        ])),
    );
    harness.dhis.push_analytics(
        DEST_URL,
        Ok(DataValueSet::new(vec![
            source_value("DE_B", "202401", "OU_Y", "7"),
            source_value("DE_B", "202401", "OU_Z", "3"),
        ])),
    );

    let (status, body) = harness
        .post(
            "/data-validation/cfg1",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": ["202401"]},
            }),
        )
        .await;
    assert_eq!(status, 202);
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    // Progress and completion surface through the status endpoint.
    let report = harness
        .wait_for("validation completion", || async {
            let (_, status_body) = harness.get("/status/cfg1").await;
            (status_body["validation"]["status"] == "completed").then_some(status_body)
        })
        .await;
    assert_eq!(report["validation"]["sessionId"], session_id.as_str());
    assert_eq!(report["validation"]["progress"]["discrepanciesFound"], 3);
    assert_eq!(report["validation"]["progress"]["totalRecords"], 4);

    let session = harness.engine.sessions().get(&session_id).unwrap();
    let kinds: Vec<String> = session
        .discrepancies
        .iter()
        .map(|d| format!("{}:{}:{}", d.org_unit, d.kind, d.severity))
        .collect();
    assert!(kinds.contains(&"OU_X:missing_in_destination:major".to_string()));
    assert!(kinds.contains(&"OU_Y:value_mismatch:critical".to_string()));
    assert!(kinds.contains(&"OU_Z:missing_in_source:minor".to_string()));
}

/// Zero periods: the report is empty and the run completes.
#[tokio::test(flavor = "multi_thread")]
async fn empty_validation_completes_with_no_discrepancies() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");

    let (status, body) = harness
        .post(
            "/data-validation/cfg1",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": []},
            }),
        )
        .await;
    assert_eq!(status, 202);
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    harness
        .wait_until("validation completes", || {
            harness
                .engine
                .sessions()
                .get(&session_id)
                .is_some_and(|s| s.status == porter_engine::ValidationStatus::Completed)
        })
        .await;
    let session = harness.engine.sessions().get(&session_id).unwrap();
    assert!(session.discrepancies.is_empty());
    assert_eq!(session.progress.total_records, 0);
}

/// Validation against an unknown configuration is a 404.
#[tokio::test(flavor = "multi_thread")]
async fn validation_for_unknown_config_is_404() {
    let harness = Harness::new();
    let (status, body) = harness
        .post(
            "/data-validation/ghost",
            serde_json::json!({
                "dataItemsConfigIds": [],
                "runtimeConfig": {"periods": []},
            }),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
}
