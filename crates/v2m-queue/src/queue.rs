//! Task queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::task::{Delivery, ProcessTask, TaskEnvelope};

/// Stream entry field holding the envelope JSON.
const TASK_FIELD: &str = "task";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Attempts per task before DLQ
    pub max_retries: u32,
    /// Hard timeout stamped on every envelope
    pub task_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "v2m:tasks".to_string(),
            consumer_group: "v2m:workers".to_string(),
            dlq_stream_name: "v2m:dlq".to_string(),
            max_retries: 3,
            task_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or_else(|_| "v2m:tasks".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "v2m:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "v2m:dlq".to_string()),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            task_timeout: Duration::from_secs(
                std::env::var("MAX_JOB_DURATION")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|s| *s > 0)
                    .unwrap_or(600),
            ),
        }
    }
}

/// Producer side: hands tasks to asynchronous at-least-once delivery.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Enqueue a task, returning the broker message id.
    async fn enqueue(&self, task: ProcessTask) -> QueueResult<String>;

    /// Number of entries in the task stream.
    async fn len(&self) -> QueueResult<u64>;
}

/// Delivery side used by workers.
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Read up to `count` new deliveries, blocking up to `block_ms`.
    async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Take over deliveries idle for at least `min_idle_ms`.
    async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivery as done.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Re-add the envelope with `attempt + 1`, then ack the original.
    async fn requeue(&self, delivery: &Delivery) -> QueueResult<String>;

    /// Park the envelope in the DLQ, then ack the original.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;
}

/// Task queue client.
pub struct RedisTaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisTaskQueue {
    /// Create a new task queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // "0" so tasks enqueued before the first worker starts are delivered.
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn add_envelope(&self, envelope: &TaskEnvelope) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(envelope)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        Ok(message_id)
    }

    async fn ack_id(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged task: {}", message_id);
        Ok(())
    }

    /// Decode stream entries, acking any that do not parse so they are not
    /// redelivered forever.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());

        for entry in entries {
            let message_id = entry.id.clone();
            let parsed = entry
                .get::<String>(TASK_FIELD)
                .ok_or_else(|| "missing task field".to_string())
                .and_then(|payload| {
                    serde_json::from_str::<TaskEnvelope>(&payload).map_err(|e| e.to_string())
                });

            match parsed {
                Ok(envelope) => deliveries.push(Delivery {
                    message_id,
                    envelope,
                }),
                Err(e) => {
                    warn!("Dropping malformed task {}: {}", message_id, e);
                    self.ack_id(&message_id).await.ok();
                }
            }
        }

        deliveries
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }
}

#[async_trait]
impl TaskDispatcher for RedisTaskQueue {
    async fn enqueue(&self, task: ProcessTask) -> QueueResult<String> {
        let envelope = TaskEnvelope::new(
            task,
            self.config.max_retries,
            self.config.task_timeout.as_secs(),
        );
        let message_id = self.add_envelope(&envelope).await?;

        info!(
            "Enqueued job {} with message ID {}",
            envelope.task.job_id, message_id
        );
        Ok(message_id)
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}

#[async_trait]
impl TaskConsumer for RedisTaskQueue {
    async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let result: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = result.keys.into_iter().flat_map(|k| k.ids).collect();
        Ok(self.decode_entries(entries).await)
    }

    async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            cmd.arg(&entry.id);
        }
        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;

        let deliveries = self.decode_entries(claimed.ids).await;
        for delivery in &deliveries {
            info!(
                "Claimed pending job {} (message {})",
                delivery.job_id(),
                delivery.message_id
            );
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ack_id(&delivery.message_id).await
    }

    async fn requeue(&self, delivery: &Delivery) -> QueueResult<String> {
        let next = delivery.envelope.next_attempt();
        let message_id = self.add_envelope(&next).await?;
        self.ack_id(&delivery.message_id).await?;

        info!(
            "Requeued job {} as attempt {}/{}",
            next.task.job_id, next.attempt, next.max_retries
        );
        Ok(message_id)
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&delivery.envelope)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack_id(&delivery.message_id).await?;

        warn!("Moved job {} to DLQ: {}", delivery.job_id(), error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "v2m:tasks");
        assert_eq!(config.consumer_group, "v2m:workers");
        assert_eq!(config.dlq_stream_name, "v2m:dlq");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.task_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_rejects_bad_url() {
        let config = QueueConfig {
            redis_url: "not a url".into(),
            ..Default::default()
        };
        assert!(RedisTaskQueue::new(config).is_err());
    }
}
