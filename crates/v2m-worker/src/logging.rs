//! Structured job logging.

use tracing::{error, info, warn, Span};
use v2m_models::JobId;

/// Logs job lifecycle events with `job_id`, `attempt` and `stage` fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    attempt: u32,
}

impl JobLogger {
    pub fn new(job_id: &JobId, attempt: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            attempt,
        }
    }

    pub fn log_start(&self, source_url: &str) {
        info!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = "start",
            "Job started: {}", source_url
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, stage: &str, message: &str) {
        warn!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %stage,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, stage: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %stage,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, result_ref: &str) {
        info!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = "ready",
            "Job completed: {}", result_ref
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Span carrying the job fields, for instrumenting a whole attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, attempt = self.attempt)
    }
}
