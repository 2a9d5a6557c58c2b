//! Sharded population: publish windows, push them to the populator, then
//! deliver the resulting tasks to the batch processor.

use crate::test_utils::*;
use axum::http::{Method, StatusCode};
use imagery_core::ShardMessage;
use imagery_gcp::mock::MockMessageBus;
use imagery_shard_populator::shard;

#[tokio::test]
async fn test_sharded_run() {
    init_tracing();
    let fakes = Fakes::with_assets(10);
    let processor = fakes.batch_processor();
    let populator = fakes.shard_populator();
    let bus = MockMessageBus::new();

    let (_, body) = send(&processor, Method::POST, "/setup", Vec::new()).await;
    let queue_id = parse(&body)["task_queue_id"].as_str().unwrap().to_string();

    let plan = shard::publish_shards(&config(), fakes.warehouse.as_ref(), &bus, &queue_id)
        .await
        .unwrap();
    assert_eq!(plan.total_rows, 10);
    assert_eq!(plan.run_id, shard::run_id(&queue_id));
    let subscription = &bus.subscriptions()[&plan.subscription];
    assert_eq!(subscription.push_endpoint, POPULATOR_URL);

    // shard size is 4: windows at 0, 4 and 8
    let published = bus.published();
    assert_eq!(published.len(), 3);
    for (i, (topic, payload)) in published.iter().enumerate() {
        assert_eq!(topic, &plan.topic);
        let message: ShardMessage = serde_json::from_slice(payload).unwrap();
        assert_eq!(message.offset, 4 * i as u64);

        let (status, _) = send(&populator, Method::POST, "/", push_envelope(payload, i)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let tasks = fakes.tasks.take_tasks();
    assert_eq!(tasks.len(), 10);
    assert!(tasks.iter().all(|(queue, _)| queue == &queue_id));

    let statuses = dispatch(&processor, tasks).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::OK));
    assert_eq!(fakes.warehouse.inserted().len(), 10);

    shard::cleanup(&config(), &bus, &plan.run_id).await.unwrap();
    assert!(bus.topics().is_empty());
    assert!(bus.subscriptions().is_empty());
}

#[tokio::test]
async fn test_undecodable_push_is_rejected() {
    let fakes = Fakes::with_assets(3);
    let populator = fakes.shard_populator();

    let (status, _) = send(&populator, Method::POST, "/", push_envelope(b"not json", 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fakes.tasks.tasks().is_empty());
}

#[tokio::test]
async fn test_shard_for_missing_queue_fails() {
    let fakes = Fakes::with_assets(3);
    let populator = fakes.shard_populator();
    let payload = serde_json::to_vec(&ShardMessage {
        limit: 4,
        offset: 0,
        task_queue_id: "image-analysis-queue-gone".to_string(),
    })
    .unwrap();

    let (status, _) = send(&populator, Method::POST, "/", push_envelope(&payload, 1)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
