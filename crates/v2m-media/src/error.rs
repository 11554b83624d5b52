//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while fetching or transcoding media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("download url is empty")]
    EmptyUrl,

    #[error("download http status {status}")]
    HttpStatus { status: u16, retryable: bool },

    #[error("download http status 416: partial file discarded")]
    RangeNotSatisfiable,

    #[error("download transport error: {0}")]
    Transport(String),

    #[error("download exceeds max file size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        output: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("transcoder produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create an HTTP status error, classifying 5xx and 429 as transient.
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus {
            status,
            retryable: status >= 500 || status == 429,
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        output: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            output,
            exit_code,
        }
    }

    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::HttpStatus { retryable, .. } => *retryable,
            MediaError::RangeNotSatisfiable
            | MediaError::Transport(_)
            | MediaError::Io(_)
            | MediaError::FfmpegNotFound
            | MediaError::FfmpegFailed { .. }
            | MediaError::MissingOutput(_) => true,
            MediaError::EmptyUrl | MediaError::TooLarge { .. } | MediaError::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
