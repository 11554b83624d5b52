//! S3 client implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::object_store::{
    attachment_disposition, effective_ttl, require_key, ObjectStore, MP3_CONTENT_TYPE,
};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint used by the services
    pub endpoint_url: String,
    /// Endpoint reachable by clients; signed URLs are minted against it
    pub public_endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region
    pub region: String,
    /// Use `{endpoint}/{bucket}/{key}` addressing (required by MinIO)
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:9000".to_string(),
            public_endpoint_url: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket_name: "v2m".to_string(),
            region: "us-east-1".to_string(),
            force_path_style: true,
        }
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint_url: std::env::var("S3_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.endpoint_url),
            public_endpoint_url: std::env::var("S3_PUBLIC_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_access_key: std::env::var("S3_SECRET_KEY").unwrap_or_default(),
            bucket_name: std::env::var("S3_BUCKET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.bucket_name),
            region: std::env::var("S3_REGION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.region),
            force_path_style: std::env::var("S3_USE_PATH_STYLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }
}

/// Accept `host:port` as well as full URLs.
fn normalize_endpoint(raw: &str) -> StorageResult<String> {
    let raw = raw.trim().trim_end_matches('/');
    if raw.is_empty() {
        return Err(StorageError::config_error("S3_ENDPOINT is required"));
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let parsed = url::Url::parse(&with_scheme)
        .map_err(|e| StorageError::config_error(format!("invalid S3 endpoint {raw}: {e}")))?;
    if parsed.host_str().is_none() {
        return Err(StorageError::config_error(format!("invalid S3 endpoint {raw}")));
    }
    Ok(with_scheme)
}

fn build_client(config: &S3Config, endpoint: &str) -> Client {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "v2m",
    );

    let sdk_config = Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .force_path_style(config.force_path_style)
        .build();

    Client::from_conf(sdk_config)
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    presign_client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> StorageResult<Self> {
        let endpoint = normalize_endpoint(&config.endpoint_url)?;
        let client = build_client(&config, &endpoint);

        let presign_client = match config.public_endpoint_url.as_deref() {
            Some(public) => build_client(&config, &normalize_endpoint(public)?),
            None => client.clone(),
        };

        Ok(Self {
            client,
            presign_client,
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Verify the bucket is reachable.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<String> {
        let key = require_key(key)?;
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(key.to_string())
    }

    async fn presign_read(
        &self,
        key: &str,
        ttl: Duration,
        filename_hint: Option<&str>,
    ) -> StorageResult<String> {
        let key = require_key(key)?;
        let presign_config = PresigningConfig::expires_in(effective_ttl(ttl))
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let mut request = self.presign_client.get_object().bucket(&self.bucket).key(key);
        if let Some(filename) = filename_hint {
            request = request
                .response_content_disposition(attachment_disposition(filename))
                .response_content_type(MP3_CONTENT_TYPE);
        }

        let presigned = request
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = require_key(key)?;
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("localhost:9000").unwrap(),
            "http://localhost:9000"
        );
        assert_eq!(
            normalize_endpoint("https://s3.example.com/").unwrap(),
            "https://s3.example.com"
        );
        assert!(normalize_endpoint("  ").is_err());
    }

    #[tokio::test]
    async fn test_presign_uses_public_endpoint() {
        let client = S3Client::new(S3Config {
            endpoint_url: "http://minio:9000".into(),
            public_endpoint_url: Some("https://files.example.com".into()),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            ..Default::default()
        })
        .unwrap();

        let url = client
            .presign_read("jobs/a.mp3", Duration::from_secs(60), Some("video2mp3-a.mp3"))
            .await
            .unwrap();

        assert!(url.starts_with("https://files.example.com/v2m/jobs/a.mp3?"), "{url}");
        assert!(url.contains("X-Amz-Expires=60"));
        assert!(url.contains("response-content-disposition="));
        assert!(url.contains("response-content-type=audio%2Fmpeg"));
    }
}
