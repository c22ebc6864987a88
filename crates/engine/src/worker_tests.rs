// SPDX-License-Identifier: MIT

use super::*;
use crate::error::HandlerError;
use crate::test_helpers::{config_with_items, test_engine, TestEngine, DEST_URL};
use porter_adapters::{Broker, UpstreamError};
use porter_core::{JobId, JobKind, MetadataSelection, MetadataSource, PayloadSource};
use tokio::sync::mpsc;

const UPLOAD_QUEUE: &str = "data.upload.cfg1";
const DLQ: &str = "failed.cfg1";

async fn fixture() -> (TestEngine, ConfigId) {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg1", vec![]));
    let config_id = ConfigId::new("cfg1");
    fixture.engine.create_queue_family(&config_id).await.unwrap();
    (fixture, config_id)
}

fn upload_job(config_id: &ConfigId) -> JobEnvelope {
    JobEnvelope::new(
        config_id.clone(),
        JobId::new("job-1"),
        1_000,
        JobKind::DataUpload {
            source: PayloadSource::Inline {
                value: serde_json::json!({"dataValues": [
                    {"dataElement": "DE_B", "period": "202401", "orgUnit": "OU_X", "value": "10"}
                ]}),
            },
            is_delete: false,
        },
    )
}

fn push_503(fixture: &TestEngine, times: usize) {
    for _ in 0..times {
        fixture.dhis.push_import_result(
            DEST_URL,
            Err(UpstreamError::Status {
                status: 503,
                url: format!("{DEST_URL}/api/dataValueSets"),
                body: String::new(),
            }),
        );
    }
}

async fn consume_upload(fixture: &TestEngine) -> mpsc::Receiver<Delivery> {
    fixture
        .broker
        .consume(ChannelRole::Upload, UPLOAD_QUEUE, 20)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn transient_failure_requeues_twice_then_dead_letters() {
    let (fixture, config_id) = fixture().await;
    // Each attempt posts twice (inline retry), three attempts in total.
    push_503(&fixture, 6);
    fixture.engine.publish_job(&upload_job(&config_id)).await.unwrap();

    let mut rx = consume_upload(&fixture).await;

    let first = rx.recv().await.unwrap();
    assert_eq!(headers::retry_count(&first.headers), 0);
    fixture.engine.handle_delivery(first).await;

    let second = rx.recv().await.unwrap();
    assert_eq!(headers::retry_count(&second.headers), 1);
    fixture.engine.handle_delivery(second).await;

    let third = rx.recv().await.unwrap();
    assert_eq!(headers::retry_count(&third.headers), 2);
    fixture.engine.handle_delivery(third).await;

    // The retry budget is exhausted: exactly one DLQ copy, work queue empty.
    let dlq = fixture.broker.queue_stats(DLQ).await.unwrap();
    assert_eq!(dlq.ready, 1);
    let work = fixture.broker.queue_stats(UPLOAD_QUEUE).await.unwrap();
    assert_eq!(work.ready + work.unacked, 0);

    // Full failure header set, with the retry counter at the limit.
    let dead = &fixture.broker.peek(DLQ, 1, 0).await.unwrap()[0];
    let get = |key: &str| dead.headers.get(key).cloned().unwrap_or_default();
    assert_eq!(get(headers::QUEUE_TYPE), "dataUpload");
    assert_eq!(get(headers::ERROR_NAME), "UpstreamTransient");
    assert_eq!(get(headers::HTTP_STATUS), "503");
    assert_eq!(get(headers::HTTP_CODE), "http-status");
    assert!(!get(headers::ERROR_MESSAGE).is_empty());
    assert!(!get(headers::ERROR_TIMESTAMP).is_empty());
    assert!(get(headers::HTTP_URL).contains("/api/dataValueSets"));
    let reason: serde_json::Value = serde_json::from_str(&get(headers::FAILURE_REASON)).unwrap();
    assert_eq!(reason["name"], "UpstreamTransient");
    assert_eq!(reason["status"], 503);
    let final_retries: u32 = get(headers::RETRY_COUNT).parse().unwrap();
    assert!(final_retries <= IMMEDIATE_REQUEUE_LIMIT);

    // The retry table entry is gone after DLQ routing.
    assert!(fixture.engine.retry_counts.lock().get("job-1").is_none());
}

#[tokio::test]
async fn fatal_failure_dead_letters_on_first_occurrence() {
    let (fixture, config_id) = fixture().await;
    fixture.dhis.push_import_result(
        DEST_URL,
        Err(UpstreamError::Status {
            status: 400,
            url: format!("{DEST_URL}/api/dataValueSets"),
            body: String::new(),
        }),
    );
    fixture.engine.publish_job(&upload_job(&config_id)).await.unwrap();

    let mut rx = consume_upload(&fixture).await;
    let delivery = rx.recv().await.unwrap();
    fixture.engine.handle_delivery(delivery).await;

    let dlq = fixture.broker.queue_stats(DLQ).await.unwrap();
    assert_eq!(dlq.ready, 1);
    let dead = &fixture.broker.peek(DLQ, 1, 0).await.unwrap()[0];
    assert_eq!(dead.headers.get(headers::ERROR_NAME).map(String::as_str), Some("UpstreamFatal"));
}

#[tokio::test]
async fn success_acks_and_clears_retry_state() {
    let (fixture, config_id) = fixture().await;
    fixture.engine.publish_job(&upload_job(&config_id)).await.unwrap();

    let mut rx = consume_upload(&fixture).await;
    let delivery = rx.recv().await.unwrap();
    fixture.engine.handle_delivery(delivery).await;

    let work = fixture.broker.queue_stats(UPLOAD_QUEUE).await.unwrap();
    assert_eq!(work.ready + work.unacked, 0);
    let dlq = fixture.broker.queue_stats(DLQ).await.unwrap();
    assert_eq!(dlq.ready, 0);

    let counters = fixture.engine.metrics().counters(&config_id, QueueKind::DataUpload);
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.succeeded, 1);
}

#[tokio::test]
async fn unparseable_body_dead_letters_as_payload_invalid() {
    let (fixture, _config_id) = fixture().await;
    fixture
        .broker
        .publish(
            ChannelRole::WorkerPublish,
            UPLOAD_QUEUE,
            b"not json".to_vec(),
            MessageHeaders::new(),
        )
        .await
        .unwrap();

    let mut rx = consume_upload(&fixture).await;
    let delivery = rx.recv().await.unwrap();
    fixture.engine.handle_delivery(delivery).await;

    let dead = &fixture.broker.peek(DLQ, 1, 0).await.unwrap()[0];
    assert_eq!(
        dead.headers.get(headers::ERROR_NAME).map(String::as_str),
        Some("PayloadInvalid")
    );
}

#[tokio::test]
async fn job_on_wrong_queue_is_discarded_with_ack() {
    let (fixture, config_id) = fixture().await;
    // A metadata job published to the data-upload queue has no handler
    // there.
    let stray = JobEnvelope::new(
        config_id.clone(),
        JobId::new("job-x"),
        1_000,
        JobKind::MetadataDownload {
            selection: MetadataSelection::default(),
            metadata_source: MetadataSource::Source,
        },
    );
    let body = stray.to_bytes().unwrap();
    fixture
        .broker
        .publish(ChannelRole::WorkerPublish, UPLOAD_QUEUE, body, MessageHeaders::new())
        .await
        .unwrap();

    let mut rx = consume_upload(&fixture).await;
    let delivery = rx.recv().await.unwrap();
    fixture.engine.handle_delivery(delivery).await;

    let work = fixture.broker.queue_stats(UPLOAD_QUEUE).await.unwrap();
    assert_eq!(work.ready + work.unacked, 0);
    let dlq = fixture.broker.queue_stats(DLQ).await.unwrap();
    assert_eq!(dlq.ready, 0);
}

#[tokio::test]
async fn message_on_unrecognized_queue_is_discarded() {
    let (fixture, _config_id) = fixture().await;
    fixture
        .broker
        .declare_queue("bogus.queue", porter_adapters::QueueOptions::default())
        .await
        .unwrap();
    fixture
        .broker
        .publish(
            ChannelRole::WorkerPublish,
            "bogus.queue",
            b"{}".to_vec(),
            MessageHeaders::new(),
        )
        .await
        .unwrap();

    let mut rx = fixture
        .broker
        .consume(ChannelRole::Upload, "bogus.queue", 20)
        .await
        .unwrap();
    let delivery = rx.recv().await.unwrap();
    fixture.engine.handle_delivery(delivery).await;

    let stats = fixture.broker.queue_stats("bogus.queue").await.unwrap();
    assert_eq!(stats.ready + stats.unacked, 0);
}

#[tokio::test]
async fn started_workers_process_published_jobs() {
    let (fixture, config_id) = fixture().await;
    fixture.configs.set_portal_metadata(
        &config_id,
        serde_json::json!({"dashboards": [{"id": "db1"}]}),
    );
    fixture.engine.start_config_workers(&config_id).await.unwrap();

    fixture
        .engine
        .plan_metadata_download(
            &config_id,
            MetadataSelection::default(),
            MetadataSource::FlexiportalConfig,
        )
        .await
        .unwrap();

    // Download and follow-up upload complete in the background.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let uploaded = fixture
            .dhis
            .calls()
            .iter()
            .any(|c| matches!(c, porter_adapters::DhisCall::PostMetadata { .. }));
        if uploaded {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "upload never happened");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

#[test]
fn channel_roles_split_downloads_from_uploads() {
    assert_eq!(channel_for(QueueKind::MetadataDownload), ChannelRole::Download);
    assert_eq!(channel_for(QueueKind::DataDownload), ChannelRole::Download);
    assert_eq!(channel_for(QueueKind::MetadataUpload), ChannelRole::Upload);
    assert_eq!(channel_for(QueueKind::DataUpload), ChannelRole::Upload);
    assert_eq!(channel_for(QueueKind::DataDeletion), ChannelRole::Upload);
}

#[test]
fn failure_headers_for_non_upstream_errors_skip_http_fields() {
    let headers_map = failure_headers(
        QueueKind::DataDownload,
        &HandlerError::PayloadInvalid("bad".to_string()),
        0,
        42,
    );
    assert_eq!(
        headers_map.get(headers::ERROR_NAME).map(String::as_str),
        Some("PayloadInvalid")
    );
    assert_eq!(
        headers_map.get(headers::ERROR_TIMESTAMP).map(String::as_str),
        Some("42")
    );
    assert!(headers_map.get(headers::HTTP_STATUS).is_none());
    assert!(headers_map.get(headers::HTTP_URL).is_none());
}
