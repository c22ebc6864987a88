// SPDX-License-Identifier: MIT

use super::*;
use crate::test_helpers::{config_with_items, test_engine};

#[tokio::test]
async fn create_declares_five_work_queues_and_dlq() {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg2", vec![]));

    let queues = fixture
        .engine
        .create_queue_family(&ConfigId::new("cfg2"))
        .await
        .unwrap();

    assert_eq!(
        queues,
        vec![
            "metadata.download.cfg2",
            "metadata.upload.cfg2",
            "data.download.cfg2",
            "data.upload.cfg2",
            "data.delete.cfg2",
        ]
    );
    for queue in &queues {
        assert!(fixture.broker.has_queue(queue));
    }
    assert!(fixture.broker.has_queue("failed.cfg2"));
}

#[tokio::test]
async fn create_requires_existing_config() {
    let fixture = test_engine();
    let err = fixture
        .engine
        .create_queue_family(&ConfigId::new("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ConfigNotFound(_)));
}

#[tokio::test]
async fn create_is_idempotent() {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg2", vec![]));
    let config_id = ConfigId::new("cfg2");

    let first = fixture.engine.create_queue_family(&config_id).await.unwrap();
    let second = fixture.engine.create_queue_family(&config_id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn delete_reports_six_queues_and_purged_messages() {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg2", vec![]));
    let config_id = ConfigId::new("cfg2");
    fixture.engine.create_queue_family(&config_id).await.unwrap();

    use porter_adapters::{Broker, ChannelRole, MessageHeaders};
    fixture
        .broker
        .publish(
            ChannelRole::WorkerPublish,
            "data.upload.cfg2",
            b"{}".to_vec(),
            MessageHeaders::new(),
        )
        .await
        .unwrap();

    let deleted = fixture.engine.delete_queue_family(&config_id).await.unwrap();
    assert_eq!(deleted.deleted_queues, 6);
    assert_eq!(deleted.messages_purged, 1);
    assert!(!fixture.broker.has_queue("failed.cfg2"));

    // delete after delete is a no-op
    let again = fixture.engine.delete_queue_family(&config_id).await.unwrap();
    assert_eq!(again.messages_purged, 0);
}

#[tokio::test]
async fn family_stats_zero_for_undeclared_family() {
    let fixture = test_engine();
    let stats = fixture
        .engine
        .family_stats(&ConfigId::new("cfg9"))
        .await
        .unwrap();
    assert_eq!(stats.queues.len(), 5);
    assert!(stats.queues.iter().all(|q| q.ready == 0 && q.unacked == 0));
    assert_eq!(stats.dlq_ready, 0);
}

#[tokio::test]
async fn family_stats_reflect_queue_depths() {
    let fixture = test_engine();
    fixture.configs.insert(config_with_items("cfg2", vec![]));
    let config_id = ConfigId::new("cfg2");
    fixture.engine.create_queue_family(&config_id).await.unwrap();

    use porter_adapters::{Broker, ChannelRole, MessageHeaders};
    for _ in 0..2 {
        fixture
            .broker
            .publish(
                ChannelRole::WorkerPublish,
                "data.download.cfg2",
                b"{}".to_vec(),
                MessageHeaders::new(),
            )
            .await
            .unwrap();
    }

    let stats = fixture.engine.family_stats(&config_id).await.unwrap();
    let download = stats
        .queues
        .iter()
        .find(|q| q.kind == QueueKind::DataDownload)
        .unwrap();
    assert_eq!(download.ready, 2);
}
