//! The job store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use v2m_models::{Job, JobId, JobStatus};

use crate::error::StoreResult;

/// Page size used by `list` when the caller gives none.
pub const DEFAULT_LIST_LIMIT: i64 = 20;
/// Hard cap on `list` page size.
pub const MAX_LIST_LIMIT: i64 = 100;
/// Page size used by retention sweeps.
pub const SWEEP_PAGE_SIZE: i64 = 200;

/// Normalize a caller-provided list limit. Non-positive values fall back to
/// the default, anything above the cap is clamped.
pub fn clamp_list_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(MAX_LIST_LIMIT),
        _ => DEFAULT_LIST_LIMIT,
    }
}

/// Keyset position of the last row returned by `list_before`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: JobId,
}

impl PageCursor {
    pub fn after(job: &Job) -> Self {
        Self {
            created_at: job.created_at,
            id: job.id.clone(),
        }
    }
}

/// The narrow set of fields a status transition may overwrite.
///
/// Use the constructors: they keep `error` tied to `Failed` and
/// `result_ref` tied to `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub error: Option<String>,
    pub result_ref: Option<String>,
}

impl StatusUpdate {
    /// An active or re-queued status with no error or result.
    pub fn stage(status: JobStatus) -> Self {
        Self {
            status,
            error: None,
            result_ref: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
            result_ref: None,
        }
    }

    pub fn ready(result_ref: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Ready,
            error: None,
            result_ref: Some(result_ref.into()),
        }
    }
}

/// Durable CRUD over job rows.
///
/// Every write is a single-row atomic statement. `update_status` never
/// touches `source_url`, `platform` or `created_at`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `Conflict` if the id exists.
    async fn create(&self, job: &Job) -> StoreResult<()>;

    /// Point lookup. Fails with `NotFound`.
    async fn get(&self, id: &JobId) -> StoreResult<Job>;

    /// Most recent first, limited by `clamp_list_limit`.
    async fn list(&self, limit: i64) -> StoreResult<Vec<Job>>;

    /// Oldest first, rows with `created_at < cutoff` strictly after `after`.
    async fn list_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: i64,
    ) -> StoreResult<Vec<Job>>;

    /// Remove every row with `created_at < cutoff`, returning the count.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Overwrite status, error and result ref and refresh `updated_at`.
    /// Fails with `NotFound` when no row matched.
    async fn update_status(&self, id: &JobId, update: StatusUpdate) -> StoreResult<Job>;

    /// Like `update_status`, but only applied while the current status is
    /// one of `from`. The check and the write are one atomic step.
    ///
    /// Returns `Ok(None)` when the row exists in some other status and
    /// `NotFound` when it does not exist.
    async fn transition(
        &self,
        id: &JobId,
        from: &[JobStatus],
        update: StatusUpdate,
    ) -> StoreResult<Option<Job>>;

    /// Move a `failed` or `expired` job back to `queued`, clearing its
    /// error and result. `Ok(None)` means the job is not retryable.
    async fn requeue_if_retryable(&self, id: &JobId) -> StoreResult<Option<Job>> {
        self.transition(id, &JobStatus::RETRYABLE, StatusUpdate::stage(JobStatus::Queued))
            .await
    }

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}
