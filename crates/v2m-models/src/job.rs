//! Job record definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job_status::JobStatus;
use crate::platform::Platform;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse as a UUID, if the ID has that shape.
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One video-to-audio conversion request and its tracked lifecycle.
///
/// `result_ref` is set only when `status == Ready`, `error` only when
/// `status == Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub source_url: String,
    pub platform: String,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Object key of the produced MP3, or a legacy absolute URL.
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly queued job for a normalized source URL.
    pub fn new(source_url: impl Into<String>, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            platform: platform.as_str().to_string(),
            status: JobStatus::Queued,
            error: None,
            result_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status update in place, enforcing the field invariants.
    ///
    /// `error` is dropped unless the new status is `Failed`, and
    /// `result_ref` is dropped unless it is `Ready`.
    pub fn apply_status(
        &mut self,
        status: JobStatus,
        error: Option<String>,
        result_ref: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.error = if status == JobStatus::Failed { error } else { None };
        self.result_ref = if status == JobStatus::Ready { result_ref } else { None };
        self.updated_at = at;
    }
}
