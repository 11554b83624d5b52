//! Job handlers.

use std::convert::Infallible;
use std::pin::pin;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use v2m_models::{
    extract_url, truncate_message, CreateJobRequest, CreateJobResponse, Job, JobId, JobStatus,
    JobView, ListJobsResponse, Platform, ResultRef, MAX_ERROR_LEN,
};
use v2m_queue::ProcessTask;
use v2m_store::{clamp_list_limit, StatusUpdate};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::notifier::{watch_job, WatchConfig, WatchEvent};
use crate::state::AppState;

/// Query parameters for `GET /jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    /// Kept as text so a malformed value falls back to the default
    #[serde(default)]
    pub limit: Option<String>,
}

/// Download filename offered to browsers.
pub fn download_filename(job_id: &JobId) -> String {
    format!("video2mp3-{}.mp3", job_id)
}

/// Resolve a job's result ref into a client-usable URL.
///
/// Object keys, and legacy URLs pointing into the bucket, are signed fresh.
/// Any other legacy URL is returned untouched.
pub async fn mp3_url_for_job(
    state: &AppState,
    job: &Job,
    filename: Option<&str>,
) -> ApiResult<Option<String>> {
    let Some(raw) = job.result_ref.as_deref() else {
        return Ok(None);
    };

    match ResultRef::resolve(raw, &state.bucket) {
        None => Ok(None),
        Some(ResultRef::External(url)) => Ok(Some(url)),
        Some(ResultRef::Key(key)) => {
            let url = state
                .objects
                .presign_read(&key, state.config.mp3_url_ttl, filename)
                .await?;
            Ok(Some(url))
        }
    }
}

async fn job_view(state: &AppState, job: &Job) -> ApiResult<JobView> {
    let mp3_url = mp3_url_for_job(state, job, None).await?;
    Ok(JobView::new(job, mp3_url))
}

/// Snapshot for the event stream. A signing failure drops only the URL so
/// observers still see every transition, the terminal one included.
async fn stream_view(state: &AppState, job: &Job) -> JobView {
    match mp3_url_for_job(state, job, None).await {
        Ok(mp3_url) => JobView::new(job, mp3_url),
        Err(e) => {
            warn!(job_id = %job.id, "Sending snapshot without mp3_url: {}", e);
            JobView::new(job, None)
        }
    }
}

/// Hand the job to the dispatcher. On failure the job is marked `failed`
/// so the client can retry it later.
async fn dispatch(state: &AppState, job: &Job) -> ApiResult<()> {
    let task = ProcessTask::new(job.id.clone(), job.source_url.clone());

    if let Err(e) = state.dispatcher.enqueue(task).await {
        metrics::record_dispatch_failure();
        warn!(job_id = %job.id, "Task dispatch failed: {}", e);

        let message = truncate_message(&format!("task dispatch failed: {}", e), MAX_ERROR_LEN);
        let marked = state
            .store
            .transition(
                &job.id,
                &JobStatus::sources_for(JobStatus::Failed),
                StatusUpdate::failed(message),
            )
            .await;
        match marked {
            Ok(Some(_)) => {}
            Ok(None) => warn!(job_id = %job.id, "Job left queued before dispatch failure was recorded"),
            Err(update_err) => warn!(job_id = %job.id, "Failed to mark job failed: {}", update_err),
        }

        return Err(ApiError::dispatch_failed(job.id.as_str(), e.to_string()));
    }

    Ok(())
}

fn accepted(job_id: &JobId) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            job_id: job_id.to_string(),
            status: JobStatus::Queued,
        }),
    )
        .into_response()
}

/// POST /jobs
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|_| ApiError::validation("invalid json"))?;

    if request.url.trim().is_empty() {
        return Err(ApiError::validation("url is required"));
    }
    request
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let source_url =
        extract_url(&request.url).ok_or_else(|| ApiError::validation("no valid url found"))?;
    let platform =
        Platform::detect(&source_url).ok_or_else(|| ApiError::validation("unsupported platform"))?;

    let job = Job::new(source_url, platform);
    state.store.create(&job).await?;
    metrics::record_job_created(platform.as_str());

    dispatch(&state, &job).await?;

    info!(job_id = %job.id, platform = %platform.as_str(), "Job queued");
    Ok(accepted(&job.id))
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<ListJobsResponse>> {
    let limit = clamp_list_limit(query.limit.and_then(|s| s.trim().parse().ok()));
    let jobs = state.store.list(limit).await?;

    let mut views = Vec::with_capacity(jobs.len());
    for job in &jobs {
        views.push(job_view(&state, job).await?);
    }

    Ok(Json(ListJobsResponse { jobs: views }))
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job = state.store.get(&JobId::from(id)).await?;
    Ok(Json(job_view(&state, &job).await?))
}

/// GET /jobs/:id/download
pub async fn download_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job = state.store.get(&JobId::from(id)).await?;
    if job.status != JobStatus::Ready {
        return Err(ApiError::conflict("job not ready"));
    }

    let filename = download_filename(&job.id);
    let url = mp3_url_for_job(&state, &job, Some(&filename))
        .await?
        .ok_or_else(|| ApiError::not_found("mp3 not found"))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// POST /jobs/:id/retry
///
/// The retryable check and the move back to `queued` are one atomic store
/// write, so concurrent retries of the same job dispatch it once.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job = state
        .store
        .requeue_if_retryable(&JobId::from(id))
        .await?
        .ok_or_else(|| ApiError::conflict("job not retryable"))?;
    metrics::record_job_retried();

    dispatch(&state, &job).await?;

    info!(job_id = %job.id, "Job re-queued");
    Ok(accepted(&job.id))
}

/// GET /jobs/:id/events
pub async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job = state.store.get(&JobId::from(id)).await?;
    let events = sse_events(state, job, WatchConfig::default());

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response())
}

/// Decrements the open-stream gauge when the client goes away.
struct StreamGuard;

impl StreamGuard {
    fn open() -> Self {
        metrics::record_stream_opened();
        Self
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        metrics::record_stream_closed();
    }
}

fn sse_events(
    state: AppState,
    job: Job,
    config: WatchConfig,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream! {
        let _guard = StreamGuard::open();
        let mut events = pin!(watch_job(state.store.clone(), job, config));

        while let Some(event) = events.next().await {
            match event {
                WatchEvent::Keepalive => {
                    yield Ok::<_, Infallible>(Event::default().comment("keepalive"));
                }
                WatchEvent::Snapshot(job) => {
                    let view = stream_view(&state, &job).await;
                    match Event::default().json_data(&view) {
                        Ok(event) => yield Ok::<_, Infallible>(event),
                        Err(e) => warn!(job_id = %job.id, "Skipping snapshot: {}", e),
                    }
                }
            }
        }
    }
}
