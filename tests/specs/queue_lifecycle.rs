// SPDX-License-Identifier: MIT

//! Queue family lifecycle specs.

use crate::prelude::*;

#[tokio::test(flavor = "multi_thread")]
async fn create_returns_five_queues_and_declares_dlq() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg2", "DE_A", "DE_B");

    let (status, body) = harness
        .post("/queues/cfg2", serde_json::Value::Null)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["queues"],
        serde_json::json!([
            "metadata.download.cfg2",
            "metadata.upload.cfg2",
            "data.download.cfg2",
            "data.upload.cfg2",
            "data.delete.cfg2",
        ])
    );
    assert_eq!(body["deadLetterQueue"], "failed.cfg2");
    assert!(harness.broker.has_queue("failed.cfg2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn create_is_idempotent_and_delete_removes_six() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg2", "DE_A", "DE_B");

    let (_, first) = harness.post("/queues/cfg2", serde_json::Value::Null).await;
    let (status, second) = harness.post("/queues/cfg2", serde_json::Value::Null).await;
    assert_eq!(status, 200);
    assert_eq!(first["queues"], second["queues"]);

    let (status, body) = harness.delete("/queues/cfg2").await;
    assert_eq!(status, 200);
    assert_eq!(body["deletedQueues"], 6);
    assert!(!harness.broker.has_queue("data.upload.cfg2"));

    // delete after delete is a no-op
    let (status, body) = harness.delete("/queues/cfg2").await;
    assert_eq!(status, 200);
    assert_eq!(body["messagesPurged"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_reflect_published_messages() {
    let harness = Harness::new();
    harness.with_monthly_config("cfg2", "DE_A", "DE_B");
    harness.post("/queues/cfg2", serde_json::Value::Null).await;

    let (status, _) = harness
        .post(
            "/data-download/cfg2",
            serde_json::json!({
                "dataItemsConfigIds": ["item-1"],
                "runtimeConfig": {"periods": ["202401"]},
            }),
        )
        .await;
    assert_eq!(status, 202);

    let (status, stats) = harness.get("/queues/cfg2").await;
    assert_eq!(status, 200);
    let download = stats["queues"]
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["kind"] == "dataDownload")
        .unwrap();
    assert_eq!(download["ready"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_creation_for_unknown_config_is_rejected() {
    let harness = Harness::new();
    let (status, body) = harness.post("/queues/ghost", serde_json::Value::Null).await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
}
