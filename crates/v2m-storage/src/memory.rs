//! In-process object store for tests.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::object_store::{attachment_disposition, effective_ttl, require_key, ObjectStore};

/// A stored blob and its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Object store keeping blobs in memory. Signed URLs point at a fake host
/// and carry the expiry as a query parameter so callers can assert on it.
#[derive(Debug)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("https://objects.test/v2m")
    }
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Seed an object directly.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.write().insert(
            key.into(),
            StoredObject {
                bytes,
                content_type: crate::MP3_CONTENT_TYPE.to_string(),
            },
        );
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<String> {
        let key = require_key(key)?;
        let bytes = tokio::fs::read(path).await?;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(key.to_string())
    }

    async fn presign_read(
        &self,
        key: &str,
        ttl: Duration,
        filename_hint: Option<&str>,
    ) -> StorageResult<String> {
        let key = require_key(key)?;
        if !self.contains(key) {
            return Err(StorageError::not_found(key));
        }

        let mut url = url::Url::parse(&format!("{}/{}", self.base_url, key))
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("X-Amz-Expires", &effective_ttl(ttl).as_secs().to_string());
            if let Some(filename) = filename_hint {
                query.append_pair("response-content-disposition", &attachment_disposition(filename));
            }
        }
        Ok(url.to_string())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = require_key(key)?;
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(key))
    }
}
