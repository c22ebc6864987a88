// SPDX-License-Identifier: MIT

//! Retry accounting and dead-letter specs.

use crate::prelude::*;
use porter_adapters::{headers, Broker, UpstreamError};
use porter_core::{DataValueSet, ImportCount, ImportSummary};

fn failing_import(status: u16) -> Result<ImportSummary, UpstreamError> {
    Err(UpstreamError::Status {
        status,
        url: format!("{DEST_URL}/api/dataValueSets"),
        body: String::new(),
    })
}

async fn run_single_value_migration(harness: &Harness) {
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
            "/data-download/cfg1",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": ["202401"]},
            }),
        )
        .await;
    assert_eq!(status, 202);
}

/// A destination that answers 503 on every upload: the message is requeued
/// up to the immediate limit, then lands once on the family DLQ with the
/// full failure header set.
#[tokio::test(flavor = "multi_thread")]
async fn persistent_503_exhausts_retries_into_dlq() {
    let harness = Harness::new();
    // Three attempts, each with one inline retry: six failing posts.
    for _ in 0..6 {
        harness.dhis.push_import_result(DEST_URL, failing_import(503));
    }
    run_single_value_migration(&harness).await;

    harness
        .wait_for("dead-lettered message", || async {
            (harness.queue_depth("failed.cfg1").await == 1).then_some(())
        })
        .await;

    let dead = harness.broker.peek("failed.cfg1", 10, 0).await.unwrap();
    assert_eq!(dead.len(), 1);
    let dead_headers = &dead[0].headers;
    assert_eq!(
        dead_headers.get(headers::HTTP_STATUS).map(String::as_str),
        Some("503")
    );
    assert_eq!(
        dead_headers.get(headers::QUEUE_TYPE).map(String::as_str),
        Some("dataUpload")
    );
    assert_eq!(headers::retry_count(dead_headers), 2);

    let (_, body) = harness.get("/status/cfg1").await;
    assert_eq!(body["status"], "FAILED");
    assert_eq!(body["health"]["healthy"], false);
}

/// A 409 with an import summary is partial success: counts logged, scratch
/// file removed, message acked, no DLQ entry.
#[tokio::test(flavor = "multi_thread")]
async fn conflict_with_summary_completes_without_dlq() {
    let harness = Harness::new();
    harness.dhis.push_import_result(
        DEST_URL,
        Err(UpstreamError::Conflict {
            url: format!("{DEST_URL}/api/dataValueSets"),
            summary: Some(ImportSummary {
                status: Some("WARNING".to_string()),
                import_count: ImportCount {
                    imported: 0,
                    ignored: 1,
                    ..Default::default()
                },
                description: None,
            }),
        }),
    );
    run_single_value_migration(&harness).await;

    harness
        .wait_until("upload settles", || {
            harness
                .engine
                .metrics()
                .counters(
                    &porter_core::ConfigId::new("cfg1"),
                    porter_core::QueueKind::DataUpload,
                )
                .processed
                >= 1
        })
        .await;

    assert_eq!(harness.queue_depth("failed.cfg1").await, 0);
    harness
        .wait_until("scratch cleanup", || harness.scratch_files().is_empty())
        .await;
}

/// Operator replay: a dead-lettered upload goes back to its queue with the
/// retry counter reset, and succeeds once the destination recovers.
#[tokio::test(flavor = "multi_thread")]
async fn dlq_replay_recovers_after_destination_heals() {
    let harness = Harness::new();
    for _ in 0..6 {
        harness.dhis.push_import_result(DEST_URL, failing_import(503));
    }
    run_single_value_migration(&harness).await;

    harness
        .wait_for("dead-lettered message", || async {
            (harness.queue_depth("failed.cfg1").await == 1).then_some(())
        })
        .await;

    // Destination heals (fake default succeeds); operator replays.
    let (status, body) = harness
        .get("/retry/cfg1?retryType=process-type&processType=dataUpload&maxRetries=5")
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["retried"], 1);

    harness
        .wait_until("replayed upload succeeds", || {
            harness
                .engine
                .metrics()
                .counters(
                    &porter_core::ConfigId::new("cfg1"),
                    porter_core::QueueKind::DataUpload,
                )
                .succeeded
                >= 1
        })
        .await;
    assert_eq!(harness.queue_depth("failed.cfg1").await, 0);
}
