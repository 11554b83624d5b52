//! Result reference helpers.
//!
//! New jobs store the object key of their MP3. Older rows may carry an
//! absolute URL instead; when that URL points into our bucket the key is
//! recovered from it so it can be re-signed, otherwise it is passed through.

use url::Url;

use crate::job::Job;

/// A stored result reference, resolved against the configured bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultRef {
    /// Object key in the configured bucket; must be signed before use.
    Key(String),
    /// Absolute URL outside the bucket; returned untouched.
    External(String),
}

impl ResultRef {
    /// Resolve a raw stored value. Returns `None` for blank input.
    pub fn resolve(raw: &str, bucket: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if !is_http_url(raw) {
            return Some(ResultRef::Key(raw.to_string()));
        }
        match object_key_from_url(raw, bucket) {
            Some(key) => Some(ResultRef::Key(key)),
            None => Some(ResultRef::External(raw.to_string())),
        }
    }

    pub fn object_key(&self) -> Option<&str> {
        match self {
            ResultRef::Key(key) => Some(key),
            ResultRef::External(_) => None,
        }
    }
}

/// Whether the value parses as an http or https URL.
pub fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
}

/// Extract an object key from a bucket URL.
///
/// Handles virtual-hosted style (`https://{bucket}.host/{key}`) and path
/// style (`https://host/{bucket}/{key}`).
pub fn object_key_from_url(raw: &str, bucket: &str) -> Option<String> {
    if bucket.trim().is_empty() {
        return None;
    }
    let parsed = Url::parse(raw).ok()?;
    let path = parsed.path().trim_start_matches('/');
    let host = parsed.host_str().unwrap_or_default();

    if host.starts_with(&format!("{bucket}.")) {
        return (!path.is_empty()).then(|| path.to_string());
    }

    match path.split_once('/') {
        Some((first, rest)) if first == bucket && !rest.is_empty() => Some(rest.to_string()),
        _ => None,
    }
}

/// The deletable object key backing a job's result, if any.
pub fn object_key_for_job(job: &Job, bucket: &str) -> Option<String> {
    let raw = job.result_ref.as_deref()?;
    ResultRef::resolve(raw, bucket)?.object_key().map(str::to_string)
}
