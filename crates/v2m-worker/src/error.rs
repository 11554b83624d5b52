//! Worker error types.

use thiserror::Error;

use v2m_media::MediaError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors from one task attempt. Display strings are what gets persisted
/// as the job's `error`, so wrapped errors render transparently.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Resolve(#[from] v2m_resolver::ResolveError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("upload failed: {0}")]
    Storage(#[from] v2m_storage::StorageError),

    #[error("job store error: {0}")]
    Store(#[from] v2m_store::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] v2m_queue::QueueError),

    #[error("job exceeded max duration of {0}s")]
    Timeout(u64),

    #[error("job cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Storage(_)
            | WorkerError::Store(_)
            | WorkerError::Queue(_)
            | WorkerError::Io(_) => true,
            WorkerError::Resolve(_) | WorkerError::Timeout(_) | WorkerError::Cancelled => false,
        }
    }

    /// Failures where another attempt cannot help: the link does not
    /// resolve, the media is too large, or the attempt ran out of time.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::Resolve(_)
                | WorkerError::Timeout(_)
                | WorkerError::Media(MediaError::TooLarge { .. })
                | WorkerError::Media(MediaError::EmptyUrl)
        )
    }
}
