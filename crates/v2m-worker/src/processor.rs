//! The conversion pipeline for one job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use v2m_media::{MediaError, ResumableFetcher, Transcoder};
use v2m_models::{truncate_message, JobId, JobStatus, MAX_ERROR_LEN};
use v2m_queue::ProcessTask;
use v2m_resolver::MediaResolver;
use v2m_storage::{ObjectStore, MP3_CONTENT_TYPE};
use v2m_store::{JobStore, StatusUpdate};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Object key of a job's MP3.
pub fn mp3_object_key(job_id: &JobId) -> String {
    format!("jobs/{}.mp3", job_id)
}

/// Result of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The MP3 is uploaded and the job is `ready`.
    Completed { result_ref: String },
    /// Nothing to do: the job is gone or already terminal.
    Skipped { reason: String },
}

/// Runs resolve, fetch, transcode and upload for a task.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    resolver: Arc<dyn MediaResolver>,
    transcoder: Arc<dyn Transcoder>,
    fetcher: ResumableFetcher,
    work_dir: PathBuf,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        resolver: Arc<dyn MediaResolver>,
        transcoder: Arc<dyn Transcoder>,
        fetcher: ResumableFetcher,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            objects,
            resolver,
            transcoder,
            fetcher,
            work_dir: work_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Run one attempt. The scratch directory is removed when this
    /// returns or when the future is dropped.
    pub async fn process(
        &self,
        task: &ProcessTask,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> WorkerResult<Outcome> {
        let job_id = &task.job_id;
        let logger = JobLogger::new(job_id, attempt);

        let entered_from = match self.store.get(job_id).await {
            Ok(job) if job.is_terminal() => {
                return Ok(Outcome::Skipped {
                    reason: format!("job already {}", job.status),
                });
            }
            Ok(job) => job.status,
            Err(e) if e.is_not_found() => {
                return Ok(Outcome::Skipped {
                    reason: "job no longer exists".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        logger.log_start(&task.source_url);

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(&self.work_dir)?;

        // Download. A job another attempt left mid-flight restarts here.
        let downloading = JobStatus::Downloading;
        if !entered_from.can_transition_to(downloading) && !entered_from.can_restart_to(downloading)
        {
            return Ok(superseded(downloading));
        }
        if entered_from != JobStatus::Queued {
            logger.log_warning(
                "downloading",
                &format!("Restarting pipeline from {}", entered_from),
            );
        }
        if !self
            .advance(job_id, &[entered_from], StatusUpdate::stage(downloading))
            .await?
        {
            return Ok(superseded(downloading));
        }
        let started = Instant::now();

        let resolved = self.resolver.resolve(&task.source_url).await?;
        logger.log_stage(
            "downloading",
            &format!("Resolved {} media on {}", resolved.kind.file_extension(), resolved.platform),
        );

        let source_path = scratch
            .path()
            .join(format!("{}.{}", job_id, resolved.kind.file_extension()));
        let bytes = self
            .fetcher
            .fetch(&resolved.media_url, &source_path, Some(&task.source_url), cancel)
            .await
            .map_err(|e| match e {
                MediaError::Cancelled => WorkerError::Cancelled,
                other => WorkerError::Media(other),
            })?;
        metrics::record_download_bytes(bytes);
        metrics::record_stage_duration("downloading", started.elapsed().as_secs_f64());

        // Transcode
        if !self
            .advance(
                job_id,
                &JobStatus::sources_for(JobStatus::Transcoding),
                StatusUpdate::stage(JobStatus::Transcoding),
            )
            .await?
        {
            return Ok(superseded(JobStatus::Transcoding));
        }
        logger.log_stage("transcoding", &format!("Transcoding {} bytes", bytes));
        let started = Instant::now();

        let mp3_path = scratch.path().join(format!("{}.mp3", job_id));
        self.transcoder.transcode(&source_path, &mp3_path).await?;
        metrics::record_stage_duration("transcoding", started.elapsed().as_secs_f64());

        // Upload
        let started = Instant::now();
        let key = self
            .objects
            .put(&mp3_object_key(job_id), &mp3_path, MP3_CONTENT_TYPE)
            .await?;
        metrics::record_stage_duration("uploading", started.elapsed().as_secs_f64());

        if !self
            .advance(
                job_id,
                &JobStatus::sources_for(JobStatus::Ready),
                StatusUpdate::ready(&key),
            )
            .await?
        {
            return Ok(superseded(JobStatus::Ready));
        }
        logger.log_completion(&key);

        Ok(Outcome::Completed { result_ref: key })
    }

    /// Persist `failed` with the truncated error message. A job that is
    /// already terminal keeps its status.
    pub async fn record_failure(&self, job_id: &JobId, error: &WorkerError) -> WorkerResult<()> {
        let message = truncate_message(&error.to_string(), MAX_ERROR_LEN);
        let recorded = self
            .advance(
                job_id,
                &JobStatus::sources_for(JobStatus::Failed),
                StatusUpdate::failed(message),
            )
            .await?;
        if !recorded {
            warn!(job_id = %job_id, "Job already left the pipeline, failure not recorded");
        }
        Ok(())
    }

    /// Write `update` only if the job is still in one of `from`. Returns
    /// false when another writer moved the job elsewhere first.
    async fn advance(
        &self,
        job_id: &JobId,
        from: &[JobStatus],
        update: StatusUpdate,
    ) -> WorkerResult<bool> {
        Ok(self.store.transition(job_id, from, update).await?.is_some())
    }
}

fn superseded(next: JobStatus) -> Outcome {
    Outcome::Skipped {
        reason: format!("job moved on before it could enter {}", next),
    }
}
