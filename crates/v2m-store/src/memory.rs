//! In-process job store.
//!
//! Same contract as `PgJobStore`, kept in a lock-guarded map. Used by unit
//! and end-to-end tests, and handy for running the API without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use v2m_models::{Job, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};
use crate::store::{clamp_list_limit, JobStore, PageCursor, StatusUpdate};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

fn sort_key(job: &Job) -> (DateTime<Utc>, &str) {
    (job.created_at, job.id.as_str())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(job.id.as_str()) {
            return Err(StoreError::conflict(job.id.as_str()));
        }
        jobs.insert(job.id.to_string(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        self.jobs
            .read()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    async fn list(&self, limit: i64) -> StoreResult<Vec<Job>> {
        let limit = clamp_list_limit(Some(limit)) as usize;
        let jobs = self.jobs.read();
        let mut items: Vec<Job> = jobs.values().cloned().collect();
        items.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        items.truncate(limit);
        Ok(items)
    }

    async fn list_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: i64,
    ) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read();
        let mut items: Vec<Job> = jobs
            .values()
            .filter(|j| j.created_at < cutoff)
            .filter(|j| match after {
                Some(c) => sort_key(j) > (c.created_at, c.id.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        items.truncate(page_size.max(1) as usize);
        Ok(items)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, j| j.created_at >= cutoff);
        Ok((before - jobs.len()) as u64)
    }

    async fn update_status(&self, id: &JobId, update: StatusUpdate) -> StoreResult<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;

        // Keep updated_at strictly increasing even on coarse clocks.
        let at = Utc::now().max(job.updated_at + Duration::microseconds(1));
        job.apply_status(update.status, update.error, update.result_ref, at);
        Ok(job.clone())
    }

    async fn transition(
        &self,
        id: &JobId,
        from: &[JobStatus],
        update: StatusUpdate,
    ) -> StoreResult<Option<Job>> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        if !from.contains(&job.status) {
            return Ok(None);
        }

        let at = Utc::now().max(job.updated_at + Duration::microseconds(1));
        job.apply_status(update.status, update.error, update.result_ref, at);
        Ok(Some(job.clone()))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use v2m_models::Platform;

    fn job_at(created_at: DateTime<Utc>) -> Job {
        let mut job = Job::new("https://www.douyin.com/video/123", Platform::Douyin);
        job.created_at = created_at;
        job.updated_at = created_at;
        job
    }

    #[tokio::test]
    async fn test_create_then_get_is_queued() {
        let store = MemoryJobStore::new();
        let job = Job::new("https://www.douyin.com/video/123", Platform::Douyin);
        store.create(&job).await.unwrap();

        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert!(fetched.error.is_none());
        assert!(fetched.result_ref.is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let store = MemoryJobStore::new();
        let job = Job::new("https://b23.tv/x", Platform::Bilibili);
        store.create(&job).await.unwrap();

        let err = store.create(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryJobStore::new();
        let err = store.get(&JobId::new()).await.unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .update_status(&JobId::new(), StatusUpdate::stage(JobStatus::Downloading))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_status_preserves_immutable_fields() {
        let store = MemoryJobStore::new();
        let job = job_at(Utc::now() - Duration::hours(1));
        store.create(&job).await.unwrap();

        let updated = store
            .update_status(&job.id, StatusUpdate::ready("jobs/a.mp3"))
            .await
            .unwrap();
        assert_eq!(updated.source_url, job.source_url);
        assert_eq!(updated.platform, job.platform);
        assert_eq!(updated.created_at, job.created_at);
        assert!(updated.updated_at > job.updated_at);
        assert_eq!(updated.result_ref.as_deref(), Some("jobs/a.mp3"));
    }

    #[tokio::test]
    async fn test_list_is_recent_first_and_capped() {
        let store = MemoryJobStore::new();
        let base = Utc::now() - Duration::days(1);
        for i in 0..120 {
            store.create(&job_at(base + Duration::seconds(i))).await.unwrap();
        }

        let page = store.list(1000).await.unwrap();
        assert_eq!(page.len(), 100);
        assert!(page.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        assert_eq!(store.list(0).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_list_before_pages_with_cursor() {
        let store = MemoryJobStore::new();
        let base = Utc::now() - Duration::days(10);
        for i in 0..5 {
            store.create(&job_at(base + Duration::minutes(i))).await.unwrap();
        }
        let cutoff = base + Duration::minutes(4);

        let first = store.list_before(cutoff, None, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        let cursor = PageCursor::after(first.last().unwrap());
        let second = store.list_before(cutoff, Some(&cursor), 3).await.unwrap();
        assert_eq!(second.len(), 1);
        assert!(second[0].created_at > first[2].created_at);
        assert!(second.iter().all(|j| j.created_at < cutoff));
    }

    #[tokio::test]
    async fn test_delete_before_respects_cutoff_and_is_idempotent() {
        let store = MemoryJobStore::new();
        let cutoff = Utc::now() - Duration::days(7);
        store.create(&job_at(cutoff - Duration::seconds(1))).await.unwrap();
        store.create(&job_at(cutoff - Duration::days(3))).await.unwrap();
        let kept = job_at(cutoff);
        store.create(&kept).await.unwrap();
        store.create(&job_at(cutoff + Duration::hours(1))).await.unwrap();

        assert_eq!(store.delete_before(cutoff).await.unwrap(), 2);
        assert_eq!(store.delete_before(cutoff).await.unwrap(), 0);
        assert_eq!(store.len(), 2);
        assert!(store.get(&kept.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_transition_applies_only_from_listed_states() {
        let store = MemoryJobStore::new();
        let job = Job::new("https://www.douyin.com/video/123", Platform::Douyin);
        store.create(&job).await.unwrap();

        let refused = store
            .transition(
                &job.id,
                &[JobStatus::Transcoding],
                StatusUpdate::ready("jobs/a.mp3"),
            )
            .await
            .unwrap();
        assert!(refused.is_none());
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Queued);

        let moved = store
            .transition(
                &job.id,
                &[JobStatus::Queued],
                StatusUpdate::stage(JobStatus::Downloading),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, JobStatus::Downloading);

        let err = store
            .transition(&JobId::new(), &JobStatus::ALL, StatusUpdate::failed("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_requeue_if_retryable() {
        let store = MemoryJobStore::new();
        let job = Job::new("https://b23.tv/x", Platform::Bilibili);
        store.create(&job).await.unwrap();

        assert!(store.requeue_if_retryable(&job.id).await.unwrap().is_none());

        store
            .update_status(&job.id, StatusUpdate::failed("boom"))
            .await
            .unwrap();
        let requeued = store.requeue_if_retryable(&job.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert!(requeued.error.is_none());

        // Already queued again, so a second retry is refused.
        assert!(store.requeue_if_retryable(&job.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requeue_admits_one_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let job = Job::new("https://b23.tv/x", Platform::Bilibili);
        store.create(&job).await.unwrap();
        store
            .update_status(&job.id, StatusUpdate::failed("boom"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = job.id.clone();
            handles.push(tokio::spawn(async move {
                store.requeue_if_retryable(&id).await.unwrap().is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
