//! Task payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use v2m_models::JobId;

/// Convert the media behind `source_url` for job `job_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTask {
    pub job_id: JobId,
    pub source_url: String,
}

impl ProcessTask {
    pub fn new(job_id: JobId, source_url: impl Into<String>) -> Self {
        Self {
            job_id,
            source_url: source_url.into(),
        }
    }
}

/// A task plus delivery bookkeeping, as stored in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: ProcessTask,
    /// 1-based attempt number of this delivery
    pub attempt: u32,
    /// Total attempts allowed before dead-lettering
    pub max_retries: u32,
    /// Hard execution limit for one attempt
    pub timeout_secs: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task: ProcessTask, max_retries: u32, timeout_secs: u64) -> Self {
        Self {
            task,
            attempt: 1,
            max_retries: max_retries.max(1),
            timeout_secs,
            enqueued_at: Utc::now(),
        }
    }

    /// Whether a failed attempt may be requeued.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    /// The envelope for the following attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            task: self.task.clone(),
            attempt: self.attempt + 1,
            max_retries: self.max_retries,
            timeout_secs: self.timeout_secs,
            enqueued_at: Utc::now(),
        }
    }
}

/// A delivered envelope and the stream entry it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub envelope: TaskEnvelope,
}

impl Delivery {
    pub fn job_id(&self) -> &JobId {
        &self.envelope.task.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget() {
        let first = TaskEnvelope::new(ProcessTask::new(JobId::new(), "https://b23.tv/x"), 3, 600);
        assert_eq!(first.attempt, 1);
        assert!(first.can_retry());

        let third = first.next_attempt().next_attempt();
        assert_eq!(third.attempt, 3);
        assert!(!third.can_retry());
        assert_eq!(third.task, first.task);
    }

    #[test]
    fn test_zero_budget_still_runs_once() {
        let env = TaskEnvelope::new(ProcessTask::new(JobId::new(), "u"), 0, 600);
        assert_eq!(env.max_retries, 1);
        assert!(!env.can_retry());
    }

    #[test]
    fn test_envelope_wire_format() {
        let env = TaskEnvelope::new(ProcessTask::new(JobId::from("j-1"), "https://b23.tv/x"), 3, 600);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["task"]["job_id"], "j-1");
        assert_eq!(json["task"]["source_url"], "https://b23.tv/x");
        assert_eq!(json["attempt"], 1);
        assert_eq!(json["timeout_secs"], 600);
    }
}
