//! Task executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use v2m_queue::{Delivery, TaskConsumer};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::{JobProcessor, Outcome};

/// Pause after a failed consume before polling the queue again.
const CONSUME_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Completed,
    Skipped,
    /// Retryable failure with budget left; a new attempt was enqueued.
    Requeued,
    /// Terminal failure recorded on the job.
    Failed { dead_lettered: bool },
    /// Cancelled mid-flight; left pending for another worker to claim.
    Abandoned,
}

/// Runs one delivery and settles it with the queue.
pub struct DeliveryHandler {
    processor: Arc<JobProcessor>,
    consumer: Arc<dyn TaskConsumer>,
    cancel: CancellationToken,
}

impl DeliveryHandler {
    pub fn new(
        processor: Arc<JobProcessor>,
        consumer: Arc<dyn TaskConsumer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            processor,
            consumer,
            cancel,
        }
    }

    /// Process under the envelope's timeout, then ack, requeue or
    /// dead-letter.
    pub async fn handle(&self, delivery: Delivery) -> DeliveryOutcome {
        let envelope = &delivery.envelope;
        let job_id = envelope.task.job_id.clone();
        let timeout = Duration::from_secs(envelope.timeout_secs.max(1));
        info!(
            "Executing job {} (attempt {}/{})",
            job_id, envelope.attempt, envelope.max_retries
        );

        let attempt = self
            .processor
            .process(&envelope.task, envelope.attempt, &self.cancel);
        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(timeout.as_secs())),
        };

        match result {
            Ok(Outcome::Completed { .. }) => {
                metrics::record_job_completed();
                self.settle_ack(&delivery).await;
                DeliveryOutcome::Completed
            }
            Ok(Outcome::Skipped { reason }) => {
                info!("Skipping job {}: {}", job_id, reason);
                metrics::record_job_skipped();
                self.settle_ack(&delivery).await;
                DeliveryOutcome::Skipped
            }
            Err(WorkerError::Cancelled) => {
                warn!("Job {} cancelled, leaving it pending", job_id);
                DeliveryOutcome::Abandoned
            }
            Err(e) if e.is_retryable() && !e.is_permanent_failure() && envelope.can_retry() => {
                warn!(
                    "Job {} failed, will retry (attempt {}/{}): {}",
                    job_id, envelope.attempt, envelope.max_retries, e
                );
                match self.consumer.requeue(&delivery).await {
                    Ok(_) => {
                        metrics::record_job_requeued();
                        DeliveryOutcome::Requeued
                    }
                    Err(requeue_err) => {
                        // Still pending; the claim loop will redeliver it.
                        error!("Failed to requeue job {}: {}", job_id, requeue_err);
                        DeliveryOutcome::Abandoned
                    }
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                if let Err(store_err) = self.processor.record_failure(&job_id, &e).await {
                    error!("Failed to record failure for job {}: {}", job_id, store_err);
                }

                let exhausted = e.is_retryable() && !e.is_permanent_failure();
                if exhausted {
                    metrics::record_job_failed("exhausted");
                    warn!(
                        "Job {} exceeded max retries ({}), moving to DLQ",
                        job_id, envelope.max_retries
                    );
                    if let Err(dlq_err) = self.consumer.dead_letter(&delivery, &e.to_string()).await {
                        error!("Failed to move job {} to DLQ: {}", job_id, dlq_err);
                    }
                } else {
                    let reason = if matches!(e, WorkerError::Timeout(_)) {
                        "timeout"
                    } else {
                        "permanent"
                    };
                    metrics::record_job_failed(reason);
                    self.settle_ack(&delivery).await;
                }

                DeliveryOutcome::Failed {
                    dead_lettered: exhausted,
                }
            }
        }
    }

    async fn settle_ack(&self, delivery: &Delivery) {
        if let Err(e) = self.consumer.ack(delivery).await {
            error!("Failed to ack job {}: {}", delivery.job_id(), e);
        }
    }
}

/// Task executor that processes deliveries from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    consumer: Arc<dyn TaskConsumer>,
    handler: Arc<DeliveryHandler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    cancel: CancellationToken,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new task executor.
    pub fn new(
        config: WorkerConfig,
        consumer: Arc<dyn TaskConsumer>,
        processor: Arc<JobProcessor>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let cancel = CancellationToken::new();
        let handler = Arc::new(DeliveryHandler::new(
            processor,
            Arc::clone(&consumer),
            cancel.clone(),
        ));

        Self {
            config,
            consumer,
            handler,
            job_semaphore,
            shutdown,
            cancel,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Start the executor. Returns after `shutdown` once in-flight jobs
    /// finish or the shutdown timeout elapses.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically reclaim deliveries abandoned by crashed workers
        let consumer = Arc::clone(&self.consumer);
        let handler = Arc::clone(&self.handler);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match consumer.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!("Claimed {} pending tasks", deliveries.len());
                                for delivery in deliveries {
                                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                        break;
                                    };
                                    let handler = Arc::clone(&handler);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        handler.handle(delivery).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending tasks: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_tasks() => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        // Back off on error, but stay responsive to shutdown
                        tokio::select! {
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    info!("Shutdown signal received, stopping executor");
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(CONSUME_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Shutdown timeout elapsed, cancelling in-flight jobs");
            self.cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(5), self.wait_for_jobs()).await;
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and dispatch tasks from the queue.
    async fn consume_tasks(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .consumer
            .consume(
                &self.consumer_name,
                self.config.consume_block.as_millis() as u64,
                available.min(5),
            )
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} tasks from queue", deliveries.len());

        for delivery in deliveries {
            let handler = Arc::clone(&self.handler);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::Cancelled)?;

            tokio::spawn(async move {
                let _permit = permit;
                handler.handle(delivery).await;
            });
        }

        Ok(())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        let total = self.config.max_concurrent_jobs.max(1);
        while self.job_semaphore.available_permits() != total {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
