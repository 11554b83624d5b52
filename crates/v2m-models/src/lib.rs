//! Shared data models for the video2mp3 backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and the job status state machine
//! - Platform classification of source links
//! - HTTP request/response schemas
//! - Result reference helpers (object keys vs. legacy URLs)

pub mod api;
pub mod job;
pub mod job_status;
pub mod platform;
pub mod result_ref;
pub mod utils;

// Re-export common types
pub use api::{
    CleanupRequest, CleanupResponse, CreateJobRequest, CreateJobResponse, JobView,
    ListJobsResponse,
};
pub use job::{Job, JobId};
pub use job_status::{JobStatus, ParseStatusError};
pub use platform::Platform;
pub use result_ref::{is_http_url, object_key_for_job, object_key_from_url, ResultRef};
pub use utils::{extract_url, truncate_message, MAX_ERROR_LEN};
