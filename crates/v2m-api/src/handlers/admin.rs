//! Admin handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tracing::info;

use v2m_models::{CleanupRequest, CleanupResponse};

use crate::error::{ApiError, ApiResult};
use crate::retention::{cutoff_for_days, RetentionSweeper};
use crate::state::AppState;

/// POST /admin/cleanup
///
/// The body is optional. A missing, malformed or non-positive
/// `retention_days` falls back to the configured horizon.
pub async fn cleanup(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<CleanupResponse>> {
    let requested = serde_json::from_slice::<CleanupRequest>(&body)
        .map(|r| r.retention_days)
        .unwrap_or(0);

    let retention_days = if requested > 0 {
        requested
    } else {
        state.config.job_retention_days
    };
    if retention_days <= 0 {
        return Err(ApiError::validation("retention_days is required"));
    }

    let cutoff = cutoff_for_days(retention_days, Utc::now());
    info!(retention_days, cutoff = %cutoff, "Manual cleanup requested");

    let sweeper = RetentionSweeper::new(
        state.store.clone(),
        state.objects.clone(),
        state.bucket.clone(),
    );
    let report = sweeper.sweep(cutoff).await?;

    Ok(Json(CleanupResponse {
        deleted_jobs: report.deleted_jobs,
        deleted_objects: report.deleted_objects,
    }))
}
