//! Retention sweeper.
//!
//! Deletes jobs created before a cutoff together with their MP3 objects.
//! Object deletion is best-effort; rows are removed in one bulk statement
//! after every page has been visited. The sweeper never assigns `expired`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use v2m_models::object_key_for_job;
use v2m_storage::ObjectStore;
use v2m_store::{JobStore, PageCursor, StoreResult, SWEEP_PAGE_SIZE};

use crate::metrics;

/// Counts returned by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_jobs: u64,
    pub deleted_objects: u64,
}

/// `now - days`, the horizon for a retention of `days`.
pub fn cutoff_for_days(days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::days(days)
}

pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    page_size: i64,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            objects,
            bucket: bucket.into(),
            page_size: SWEEP_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Remove every job with `created_at < cutoff` and its object.
    pub async fn sweep(&self, cutoff: DateTime<Utc>) -> StoreResult<SweepReport> {
        let mut deleted_objects = 0u64;
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self
                .store
                .list_before(cutoff, cursor.as_ref(), self.page_size)
                .await?;

            for job in &page {
                let Some(key) = object_key_for_job(job, &self.bucket) else {
                    continue;
                };
                match self.objects.delete(&key).await {
                    Ok(()) => deleted_objects += 1,
                    Err(e) => debug!(job_id = %job.id, key = %key, "Object delete skipped: {}", e),
                }
            }

            if (page.len() as i64) < self.page_size {
                break;
            }
            match page.last() {
                Some(last) => cursor = Some(PageCursor::after(last)),
                None => break,
            }
        }

        let deleted_jobs = self.store.delete_before(cutoff).await?;
        metrics::record_cleanup(deleted_jobs, deleted_objects);

        info!(
            cutoff = %cutoff,
            deleted_jobs,
            deleted_objects,
            "Retention sweep finished"
        );

        Ok(SweepReport {
            deleted_jobs,
            deleted_objects,
        })
    }

    /// Sweep every `interval` with a horizon of `retention_days`. The first
    /// sweep happens one interval after start.
    pub async fn run_periodic(self: Arc<Self>, interval: Duration, retention_days: i64) {
        info!(
            "Periodic cleanup every {:?}, retention {} days",
            interval, retention_days
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let cutoff = cutoff_for_days(retention_days, Utc::now());
            if let Err(e) = self.sweep(cutoff).await {
                error!("Periodic cleanup failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2m_models::{Job, JobStatus, Platform};
    use v2m_storage::MemoryObjectStore;
    use v2m_store::{MemoryJobStore, StatusUpdate};

    async fn job_aged(store: &MemoryJobStore, days: i64, result_ref: Option<&str>) -> Job {
        let mut job = Job::new("https://v.kuaishou.com/abc", Platform::Kuaishou);
        job.created_at = Utc::now() - chrono::Duration::days(days);
        job.updated_at = job.created_at;
        store.create(&job).await.unwrap();
        if let Some(r) = result_ref {
            store
                .update_status(&job.id, StatusUpdate::ready(r))
                .await
                .unwrap();
        }
        job
    }

    fn sweeper(store: &Arc<MemoryJobStore>, objects: &Arc<MemoryObjectStore>) -> RetentionSweeper {
        RetentionSweeper::new(store.clone(), objects.clone(), "v2m")
    }

    #[tokio::test]
    async fn test_sweep_deletes_old_jobs_and_objects() {
        let store = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::default());
        objects.insert("jobs/a.mp3", b"a".to_vec());
        objects.insert("jobs/b.mp3", b"b".to_vec());
        objects.insert("jobs/new.mp3", b"n".to_vec());

        job_aged(&store, 10, Some("jobs/a.mp3")).await;
        job_aged(&store, 9, Some("https://objects.test/v2m/jobs/b.mp3")).await;
        job_aged(&store, 8, Some("https://cdn.example.com/c.mp3")).await;
        job_aged(&store, 8, Some("jobs/missing.mp3")).await;
        job_aged(&store, 8, None).await;
        let fresh = job_aged(&store, 1, Some("jobs/new.mp3")).await;

        let report = sweeper(&store, &objects)
            .with_page_size(2)
            .sweep(cutoff_for_days(7, Utc::now()))
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport {
                deleted_jobs: 5,
                deleted_objects: 2
            }
        );
        assert!(!objects.contains("jobs/a.mp3"));
        assert!(!objects.contains("jobs/b.mp3"));
        assert!(objects.contains("jobs/new.mp3"));

        let kept = store.get(&fresh.id).await.unwrap();
        assert_eq!(kept.status, JobStatus::Ready);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::default());
        job_aged(&store, 30, None).await;

        let sweeper = sweeper(&store, &objects);
        let cutoff = cutoff_for_days(7, Utc::now());
        assert_eq!(sweeper.sweep(cutoff).await.unwrap().deleted_jobs, 1);
        assert_eq!(sweeper.sweep(cutoff).await.unwrap(), SweepReport::default());
    }

    #[test]
    fn test_cutoff_for_days() {
        let now = Utc::now();
        assert_eq!(cutoff_for_days(7, now), now - chrono::Duration::days(7));
    }
}
