//! Object store contract.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Content type of every produced object.
pub const MP3_CONTENT_TYPE: &str = "audio/mpeg";

/// Signed URL lifetime used when the caller passes zero.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

/// Key-addressed blob store.
///
/// Signed URLs are minted at read time, so stored references stay stable
/// keys and never silently expire.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key`, returning the key.
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<String>;

    /// Issue a time-limited read URL. With a filename hint the URL forces an
    /// attachment download under that name.
    async fn presign_read(
        &self,
        key: &str,
        ttl: Duration,
        filename_hint: Option<&str>,
    ) -> StorageResult<String>;

    /// Remove an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

pub(crate) fn require_key(key: &str) -> StorageResult<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(StorageError::InvalidKey("object key is empty".into()));
    }
    Ok(key)
}

pub(crate) fn effective_ttl(ttl: Duration) -> Duration {
    if ttl.is_zero() {
        DEFAULT_PRESIGN_TTL
    } else {
        ttl
    }
}

pub(crate) fn attachment_disposition(filename: &str) -> String {
    let filename = filename.trim();
    let filename = if filename.is_empty() { "download.mp3" } else { filename };
    format!("attachment; filename=\"{}\"", filename.replace('"', ""))
}
