//! In-process task queue for tests and single-binary runs.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{QueueError, QueueResult};
use crate::queue::{TaskConsumer, TaskDispatcher};
use crate::task::{Delivery, ProcessTask, TaskEnvelope};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<Delivery>,
    /// Delivered but unacknowledged, with delivery time
    pending: HashMap<String, (Delivery, Instant)>,
    dead: Vec<(TaskEnvelope, String)>,
    fail_enqueue: bool,
}

impl State {
    fn push(&mut self, envelope: TaskEnvelope) -> String {
        self.next_id += 1;
        let message_id = format!("{}-0", self.next_id);
        self.ready.push_back(Delivery {
            message_id: message_id.clone(),
            envelope,
        });
        message_id
    }
}

/// `TaskDispatcher` + `TaskConsumer` over a mutex-guarded deque.
#[derive(Debug)]
pub struct MemoryTaskQueue {
    state: Mutex<State>,
    notify: Notify,
    max_retries: u32,
    timeout_secs: u64,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(3, 600)
    }
}

impl MemoryTaskQueue {
    pub fn new(max_retries: u32, timeout_secs: u64) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            max_retries,
            timeout_secs,
        }
    }

    /// Make subsequent `enqueue` calls fail, as an unreachable broker would.
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.state.lock().fail_enqueue = fail;
    }

    /// Push a prepared envelope.
    pub fn push_envelope(&self, envelope: TaskEnvelope) -> String {
        let id = self.state.lock().push(envelope);
        self.notify.notify_one();
        id
    }

    /// Envelopes waiting for delivery.
    pub fn ready_envelopes(&self) -> Vec<TaskEnvelope> {
        self.state
            .lock()
            .ready
            .iter()
            .map(|d| d.envelope.clone())
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Dead-lettered envelopes with their errors.
    pub fn dead_letters(&self) -> Vec<(TaskEnvelope, String)> {
        self.state.lock().dead.clone()
    }

    fn take_ready(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.state.lock();
        let n = count.max(1).min(state.ready.len());
        let taken: Vec<Delivery> = state.ready.drain(..n).collect();
        let now = Instant::now();
        for d in &taken {
            state
                .pending
                .insert(d.message_id.clone(), (d.clone(), now));
        }
        taken
    }

    fn settle(&self, message_id: &str) -> QueueResult<()> {
        self.state
            .lock()
            .pending
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownDelivery(message_id.to_string()))
    }
}

#[async_trait]
impl TaskDispatcher for MemoryTaskQueue {
    async fn enqueue(&self, task: ProcessTask) -> QueueResult<String> {
        if self.state.lock().fail_enqueue {
            return Err(QueueError::connection_failed("broker unavailable"));
        }
        Ok(self.push_envelope(TaskEnvelope::new(task, self.max_retries, self.timeout_secs)))
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.state.lock();
        Ok((state.ready.len() + state.pending.len()) as u64)
    }
}

#[async_trait]
impl TaskConsumer for MemoryTaskQueue {
    async fn consume(
        &self,
        _consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let taken = self.take_ready(count);
        if !taken.is_empty() || block_ms == 0 {
            return Ok(taken);
        }

        let _ = tokio::time::timeout(Duration::from_millis(block_ms), self.notify.notified()).await;
        Ok(self.take_ready(count))
    }

    async fn claim_pending(
        &self,
        _consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let min_idle = Duration::from_millis(min_idle_ms);
        let now = Instant::now();
        let mut state = self.state.lock();

        let mut claimed = Vec::new();
        for (delivery, delivered_at) in state.pending.values_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(*delivered_at) >= min_idle {
                *delivered_at = now;
                claimed.push(delivery.clone());
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.settle(&delivery.message_id)
    }

    async fn requeue(&self, delivery: &Delivery) -> QueueResult<String> {
        let id = self.push_envelope(delivery.envelope.next_attempt());
        self.settle(&delivery.message_id)?;
        Ok(id)
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        self.state
            .lock()
            .dead
            .push((delivery.envelope.clone(), error.to_string()));
        self.settle(&delivery.message_id)
    }
}
