// SPDX-License-Identifier: MIT

//! Happy-path data migration specs.

use crate::prelude::*;
use porter_adapters::DhisCall;
use porter_core::DataValueSet;

/// End-to-end: one mapping, one monthly period. The download worker fetches
/// from the source, translates identifiers, stages a scratch file, and the
/// upload worker imports at the destination and cleans up.
#[tokio::test(flavor = "multi_thread")]
async fn single_period_migration_end_to_end() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");
    harness.dhis.set_combos(SOURCE_URL, "DE_A", vec![combo("C1", "Default")]);
    harness.dhis.set_combos(DEST_URL, "DE_B", vec![combo("C1", "Default")]);
    harness.dhis.push_analytics(
        SOURCE_URL,
        Ok(DataValueSet::new(vec![source_value(
            "DE_A", "202401", "OU_X", "10",
        )])),
    );
    harness.start_workers("cfg1").await;

    let (status, body) = harness
        .post(
            "/data-download/cfg1",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": ["202401"]},
            }),
        )
        .await;
    assert_eq!(status, 202);
    assert_eq!(body["success"], true);
    assert_eq!(body["totalItems"], 1);

    // The destination eventually receives exactly the translated value.
    let import = harness
        .wait_for("destination import", || async {
            harness.dhis.calls().into_iter().find_map(|c| match c {
                DhisCall::PostDataValues {
                    base_url,
                    values,
                    strategy,
                } if base_url == DEST_URL => Some((values, strategy)),
                _ => None,
            })
        })
        .await;
    assert_eq!(import.0, 1);
    assert_eq!(import.1, porter_adapters::ImportStrategy::CreateAndUpdate);

    // The source fetch used the mapped element and configured org units.
    let analytics = harness
        .dhis
        .calls()
        .into_iter()
        .find_map(|c| match c {
            DhisCall::DataValueSet { dx, pe, ou, .. } => Some((dx, pe, ou)),
            _ => None,
        })
        .unwrap();
    assert_eq!(analytics.0, vec!["DE_A".to_string()]);
    assert_eq!(analytics.1, vec!["202401".to_string()]);
    assert_eq!(analytics.2, vec!["LEVEL-3".to_string(), "OU_ROOT".to_string()]);

    // Scratch file removed, queues drained, status settles on COMPLETED.
    harness
        .wait_until("scratch cleanup", || harness.scratch_files().is_empty())
        .await;
    let completed = harness
        .wait_for("completed status", || async {
            let (_, body) = harness.get("/status/cfg1").await;
            (body["status"] == "COMPLETED").then_some(body)
        })
        .await;
    assert_eq!(completed["health"]["healthy"], true);
    assert_eq!(completed["dlqTotal"], 0);
}

/// A quarter against a monthly item expands to three download jobs.
#[tokio::test(flavor = "multi_thread")]
async fn quarterly_request_fans_out_per_month() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");
    harness.dhis.set_combos(SOURCE_URL, "DE_A", vec![combo("C1", "Default")]);
    harness.dhis.set_combos(DEST_URL, "DE_B", vec![combo("C1", "Default")]);
    // No workers: jobs stay queued so the fan-out is observable.
    harness
        .engine
        .create_queue_family(&porter_core::ConfigId::new("cfg1"))
        .await
        .unwrap();

    let (status, body) = harness
        .post(
            "/data-download/cfg1",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": ["2024Q1"]},
            }),
        )
        .await;
    assert_eq!(status, 202);
    assert_eq!(body["totalItems"], 3);
    assert_eq!(harness.queue_depth("data.download.cfg1").await, 3);
}

/// Deletion requests thread `isDelete` to the deletion queue and the
/// destination sees the DELETE import strategy.
#[tokio::test(flavor = "multi_thread")]
async fn deletion_flows_through_the_delete_queue() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");
    harness.dhis.set_combos(SOURCE_URL, "DE_A", vec![combo("C1", "Default")]);
    harness.dhis.set_combos(DEST_URL, "DE_B", vec![combo("C1", "Default")]);
    harness.dhis.push_analytics(
        SOURCE_URL,
        Ok(DataValueSet::new(vec![source_value(
            "DE_A", "202401", "OU_X", "10",
        )])),
    );
    harness.start_workers("cfg1").await;

    let (status, _) = harness
        .post(
            "/data-delete/cfg1",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": ["202401"]},
            }),
        )
        .await;
    assert_eq!(status, 202);

    let strategy = harness
        .wait_for("destination delete", || async {
            harness.dhis.calls().into_iter().find_map(|c| match c {
                DhisCall::PostDataValues { strategy, .. } => Some(strategy),
                _ => None,
            })
        })
        .await;
    assert_eq!(strategy, porter_adapters::ImportStrategy::Delete);
}

/// Metadata flows from the source bundle to the destination import, with
/// the upload job produced by the download handler.
#[tokio::test(flavor = "multi_thread")]
async fn metadata_migration_end_to_end() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");
    harness.dhis.set_metadata_bundle(
        SOURCE_URL,
        serde_json::json!({"dashboards": [{"id": "db1"}], "dataElements": [{"id": "DE_A"}]}),
    );
    harness.start_workers("cfg1").await;

    let (status, body) = harness
        .post(
            "/metadata-download/cfg1",
            serde_json::json!({
                "metadataSource": "source",
                "selectedDashboards": ["db1"],
            }),
        )
        .await;
    assert_eq!(status, 202);
    assert_eq!(body["totalItems"], 1);

    harness
        .wait_for("metadata import", || async {
            harness
                .dhis
                .calls()
                .into_iter()
                .find(|c| matches!(c, DhisCall::PostMetadata { base_url } if base_url == DEST_URL))
        })
        .await;
}

/// An empty selection still queues a metadata job, which completes
/// immediately with zero items.
#[tokio::test(flavor = "multi_thread")]
async fn empty_metadata_selection_completes() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg1", "DE_A", "DE_B");
    harness.dhis.set_metadata_bundle(SOURCE_URL, serde_json::json!({}));
    harness.start_workers("cfg1").await;

    let (status, body) = harness
        .post("/metadata-download/cfg1", serde_json::json!({}))
        .await;
    assert_eq!(status, 202);
    assert_eq!(body["totalItems"], 0);

    harness
        .wait_until("metadata download processed", || {
            harness
                .engine
                .metrics()
                .counters(
                    &porter_core::ConfigId::new("cfg1"),
                    porter_core::QueueKind::MetadataDownload,
                )
                .processed
                >= 1
        })
        .await;

    // No upload job, no failure: the empty download just completes.
    let (_, body) = harness.get("/status/cfg1").await;
    assert_eq!(body["dlqTotal"], 0);
}
