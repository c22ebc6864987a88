// SPDX-License-Identifier: MIT

use super::*;
use crate::test_helpers::{config_with_items, test_engine, TestEngine};
use porter_adapters::Broker;
use porter_core::{JobId, JobKind, PayloadSource};

const DLQ: &str = "failed.cfg1";

async fn fixture() -> (TestEngine, ConfigId) {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg1", vec![]));
    let config_id = ConfigId::new("cfg1");
    fixture.engine.create_queue_family(&config_id).await.unwrap();
    (fixture, config_id)
}

/// Park a job on the DLQ the way the worker would: with queue-type and
/// retry-count headers.
async fn park_on_dlq(fixture: &TestEngine, config_id: &ConfigId, job_id: &str, kind: QueueKind) {
    let envelope = JobEnvelope {
        config_id: config_id.clone(),
        job_id: JobId::new(job_id),
        retry_count: 2,
        queued_at: 1_000,
        kind: match kind {
            QueueKind::DataUpload => JobKind::DataUpload {
                source: PayloadSource::Inline {
                    value: serde_json::json!({"dataValues": []}),
                },
                is_delete: false,
            },
            _ => JobKind::DataDownload {
                data_item_config_id: "item-1".to_string(),
                period_id: "202401".to_string(),
                overrides: Default::default(),
                is_delete: false,
            },
        },
    };
    let mut dead_headers = MessageHeaders::new();
    dead_headers.insert(headers::QUEUE_TYPE.to_string(), kind.api_key().to_string());
    dead_headers.insert(headers::RETRY_COUNT.to_string(), "2".to_string());
    dead_headers.insert(headers::ERROR_NAME.to_string(), "UpstreamTransient".to_string());
    fixture
        .broker
        .publish(
            ChannelRole::WorkerPublish,
            DLQ,
            envelope.to_bytes().unwrap(),
            dead_headers,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn listing_pages_and_counts() {
    let (fixture, config_id) = fixture().await;
    for i in 0..3 {
        park_on_dlq(&fixture, &config_id, &format!("job-{i}"), QueueKind::DataUpload).await;
    }

    let listing = fixture
        .engine
        .list_failed(&config_id, 2, 0, false, None)
        .await
        .unwrap();
    assert_eq!(listing.total, 3);
    assert_eq!(listing.messages.len(), 2);
    assert!(listing.messages[0].body.is_none());

    let second_page = fixture
        .engine
        .list_failed(&config_id, 2, 2, false, None)
        .await
        .unwrap();
    assert_eq!(second_page.messages.len(), 1);
}

#[tokio::test]
async fn listing_filters_by_originating_queue() {
    let (fixture, config_id) = fixture().await;
    park_on_dlq(&fixture, &config_id, "job-up", QueueKind::DataUpload).await;
    park_on_dlq(&fixture, &config_id, "job-down", QueueKind::DataDownload).await;

    let listing = fixture
        .engine
        .list_failed(&config_id, 10, 0, true, Some(QueueKind::DataDownload))
        .await
        .unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.messages[0].queue_type, Some(QueueKind::DataDownload));
    // include_messages parses the job body.
    assert_eq!(
        listing.messages[0].body.as_ref().unwrap()["jobId"],
        "job-down"
    );
}

#[tokio::test]
async fn listing_for_config_without_dlq_is_empty() {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg9", vec![]));
    let listing = fixture
        .engine
        .list_failed(&ConfigId::new("cfg9"), 10, 0, false, None)
        .await
        .unwrap();
    assert_eq!(listing.total, 0);
}

#[tokio::test]
async fn purge_empties_the_dlq() {
    let (fixture, config_id) = fixture().await;
    park_on_dlq(&fixture, &config_id, "job-1", QueueKind::DataUpload).await;
    park_on_dlq(&fixture, &config_id, "job-2", QueueKind::DataUpload).await;

    assert_eq!(fixture.engine.purge_failed(&config_id).await.unwrap(), 2);
    let stats = fixture.broker.queue_stats(DLQ).await.unwrap();
    assert_eq!(stats.ready, 0);
}

#[tokio::test]
async fn replay_by_process_type_routes_to_origin_with_reset_counter() {
    let (fixture, config_id) = fixture().await;
    park_on_dlq(&fixture, &config_id, "job-up", QueueKind::DataUpload).await;
    park_on_dlq(&fixture, &config_id, "job-down", QueueKind::DataDownload).await;

    let replayed = fixture
        .engine
        .replay_by_process_type(&config_id, QueueKind::DataUpload, None)
        .await
        .unwrap();
    assert_eq!(replayed, 1);

    // The upload message is back on its queue with a clean slate.
    let restored = fixture.broker.peek("data.upload.cfg1", 10, 0).await.unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(headers::retry_count(&restored[0].headers), 0);
    assert!(restored[0].headers.get(headers::ERROR_NAME).is_none());
    let envelope = JobEnvelope::from_bytes(&restored[0].body).unwrap();
    assert_eq!(envelope.retry_count, 0);

    // The download message was left in place.
    let remaining = fixture.broker.peek(DLQ, 10, 0).await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn replay_respects_the_max_cap() {
    let (fixture, config_id) = fixture().await;
    for i in 0..5 {
        park_on_dlq(&fixture, &config_id, &format!("job-{i}"), QueueKind::DataUpload).await;
    }

    let replayed = fixture
        .engine
        .replay_by_process_type(&config_id, QueueKind::DataUpload, Some(2))
        .await
        .unwrap();
    assert_eq!(replayed, 2);
    assert_eq!(fixture.broker.peek(DLQ, 10, 0).await.unwrap().len(), 3);
}

#[tokio::test]
async fn replay_single_message_by_id() {
    let (fixture, config_id) = fixture().await;
    park_on_dlq(&fixture, &config_id, "job-up", QueueKind::DataUpload).await;
    let id = fixture.broker.peek(DLQ, 1, 0).await.unwrap()[0].message_id.clone();

    assert!(fixture.engine.replay_message(&config_id, &id).await.unwrap());
    assert_eq!(fixture.broker.peek(DLQ, 10, 0).await.unwrap().len(), 0);
    assert_eq!(
        fixture.broker.peek("data.upload.cfg1", 10, 0).await.unwrap().len(),
        1
    );

    // Unknown IDs report false.
    assert!(!fixture.engine.replay_message(&config_id, "nope").await.unwrap());
}
