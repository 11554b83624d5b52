//! Job status state machine.
//!
//! ```text
//! queued -> downloading -> transcoding -> ready
//!    \            \              \
//!     +------------+--------------+--> failed
//!
//! failed | expired --(retry)--> queued
//! downloading | transcoding --(restart)--> downloading
//! ```
//!
//! The restart edge is taken only when a redelivered task re-enters the
//! pipeline for a job a previous attempt left mid-flight.
//!
//! `expired` is only ever assigned by an explicit out-of-band decision.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is persisted and waiting for a worker
    #[default]
    Queued,
    /// Worker is resolving and fetching the source media
    Downloading,
    /// Worker is converting the fetched media to MP3
    Transcoding,
    /// MP3 is uploaded and available for download
    Ready,
    /// Processing failed with an unrecoverable error
    Failed,
    /// Job was retired by retention policy
    Expired,
}

/// Error returned when a stored status string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct ParseStatusError(pub String);

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Downloading,
        JobStatus::Transcoding,
        JobStatus::Ready,
        JobStatus::Failed,
        JobStatus::Expired,
    ];

    /// States an explicit retry may start from.
    pub const RETRYABLE: [JobStatus; 2] = [JobStatus::Failed, JobStatus::Expired];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Transcoding => "transcoding",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
        }
    }

    /// Check if this is a terminal state (no more automatic updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed | JobStatus::Expired)
    }

    /// Check if the job is still in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether an explicit retry is permitted from this state.
    pub fn is_retryable(&self) -> bool {
        Self::RETRYABLE.contains(self)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Self-transitions on active states are accepted so that a redelivered
    /// task may rewrite the stage it is already in.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, Queued | Downloading | Failed) => true,
            (Downloading, Downloading | Transcoding | Failed) => true,
            (Transcoding, Transcoding | Ready | Failed) => true,
            (Failed | Expired, Queued) => true,
            (Ready, Expired) => true,
            _ => false,
        }
    }

    /// Whether a redelivered attempt may restart the pipeline from `self`.
    pub fn can_restart_to(&self, next: JobStatus) -> bool {
        self.is_active() && next == JobStatus::Downloading
    }

    /// Every status from which `next` is a legal forward transition.
    pub fn sources_for(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "downloading" => Ok(JobStatus::Downloading),
            "transcoding" => Ok(JobStatus::Transcoding),
            "ready" => Ok(JobStatus::Ready),
            "failed" => Ok(JobStatus::Failed),
            "expired" => Ok(JobStatus::Expired),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
