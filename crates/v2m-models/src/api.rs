//! HTTP request/response schemas.
//!
//! `JobView` is the single snapshot shape used by the REST read endpoints
//! and by every event on the live status stream.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::job::Job;
use crate::job_status::JobStatus;

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Body of `POST /jobs`. `url` may be free-form share text containing a link.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct CreateJobRequest {
    #[serde(default)]
    #[validate(length(max = 4096, message = "url is too long"))]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Client-facing job snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobView {
    pub job_id: String,
    pub source_url: String,
    pub platform: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Freshly signed download URL, present only when ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp3_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobView {
    pub fn new(job: &Job, mp3_url: Option<String>) -> Self {
        Self {
            job_id: job.id.to_string(),
            source_url: job.source_url.clone(),
            platform: job.platform.clone(),
            status: job.status,
            error: job.error.clone(),
            mp3_url,
            created_at: rfc3339(&job.created_at),
            updated_at: rfc3339(&job.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
}

/// Body of `POST /admin/cleanup`. Missing or zero falls back to the configured
/// retention horizon.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, JsonSchema)]
pub struct CleanupRequest {
    #[serde(default)]
    #[validate(range(min = 0, max = 36500, message = "retention_days out of range"))]
    pub retention_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupResponse {
    pub deleted_jobs: u64,
    pub deleted_objects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    #[test]
    fn test_job_view_omits_empty_optionals() {
        let job = Job::new("https://www.douyin.com/video/123", Platform::Douyin);
        let value = serde_json::to_value(JobView::new(&job, None)).unwrap();

        assert_eq!(value["status"], "queued");
        assert_eq!(value["platform"], "douyin");
        assert!(value.get("error").is_none());
        assert!(value.get("mp3_url").is_none());
        assert!(value["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateJobRequest { url: "https://b23.tv/x".into() };
        assert!(ok.validate().is_ok());

        let too_long = CreateJobRequest { url: "x".repeat(5000) };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_cleanup_request_defaults_to_zero() {
        let req: CleanupRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.retention_days, 0);
    }
}
