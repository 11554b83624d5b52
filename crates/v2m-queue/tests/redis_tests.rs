//! Redis integration tests. Run with a local Redis:
//! `cargo test -p v2m-queue -- --ignored`

use std::time::Duration;

use v2m_models::JobId;
use v2m_queue::{ProcessTask, QueueConfig, RedisTaskQueue, TaskConsumer, TaskDispatcher};

fn test_queue() -> RedisTaskQueue {
    dotenvy::dotenv().ok();
    let suffix = JobId::new();
    let config = QueueConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        stream_name: format!("v2m:test:{suffix}:tasks"),
        consumer_group: format!("v2m:test:{suffix}:workers"),
        dlq_stream_name: format!("v2m:test:{suffix}:dlq"),
        max_retries: 2,
        task_timeout: Duration::from_secs(30),
    };
    RedisTaskQueue::new(config).unwrap()
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_requeue_dead_letter() {
    let queue = test_queue();
    queue.init().await.unwrap();
    // init is idempotent
    queue.init().await.unwrap();

    let task = ProcessTask::new(JobId::new(), "https://www.douyin.com/video/1");
    queue.enqueue(task.clone()).await.unwrap();

    let first = queue.consume("w1", 100, 10).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].envelope.task, task);
    assert_eq!(first[0].envelope.attempt, 1);

    queue.requeue(&first[0]).await.unwrap();
    let second = queue.consume("w1", 100, 10).await.unwrap();
    assert_eq!(second[0].envelope.attempt, 2);
    assert!(!second[0].envelope.can_retry());

    queue.dead_letter(&second[0], "exhausted").await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_claim_pending_recovers_abandoned_delivery() {
    let queue = test_queue();
    queue.init().await.unwrap();

    queue
        .enqueue(ProcessTask::new(JobId::new(), "https://b23.tv/x"))
        .await
        .unwrap();
    let delivered = queue.consume("crashed", 100, 1).await.unwrap();
    assert_eq!(delivered.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let claimed = queue.claim_pending("rescuer", 10, 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].message_id, delivered[0].message_id);

    queue.ack(&claimed[0]).await.unwrap();
    assert!(queue.claim_pending("rescuer", 0, 10).await.unwrap().is_empty());
}
