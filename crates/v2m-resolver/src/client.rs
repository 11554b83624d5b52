//! HTTP client for the resolution service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{ResolveError, ResolveResult};
use crate::signing::{SignedHeaders, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::types::{ParseRequest, ParseResponse, ResolvedMedia};

/// Turns a share link into a direct media URL.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, source_url: &str) -> ResolveResult<ResolvedMedia>;
}

/// Resolution service configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ParserConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("PARSER_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("PARSER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// `MediaResolver` backed by the parse API.
#[derive(Debug, Clone)]
pub struct ParserClient {
    client: Client,
    endpoint: String,
}

impl ParserClient {
    pub fn new(config: ParserConfig) -> ResolveResult<Self> {
        let base = config.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ResolveError::NotConfigured);
        }
        let endpoint = format!("{base}/api/parse");
        url::Url::parse(&endpoint).map_err(|e| ResolveError::InvalidEndpoint(e.to_string()))?;

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn from_env() -> ResolveResult<Self> {
        Self::new(ParserConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MediaResolver for ParserClient {
    async fn resolve(&self, source_url: &str) -> ResolveResult<ResolvedMedia> {
        let signed = SignedHeaders::generate(chrono::Utc::now().timestamp_millis());
        debug!("Resolving {} via {}", source_url, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(TIMESTAMP_HEADER, &signed.timestamp)
            .header(NONCE_HEADER, &signed.nonce)
            .header(SIGNATURE_HEADER, &signed.signature)
            .json(&ParseRequest { text: source_url })
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ResolveError::HttpStatus(status.as_u16()));
        }

        let parsed: ParseResponse = response.json().await?;
        if !parsed.succ || parsed.retcode != 200 {
            return Err(ResolveError::Rejected {
                retcode: parsed.retcode,
                retdesc: parsed.retdesc,
            });
        }

        let resolved = parsed.data.into_resolved().ok_or(ResolveError::NoMedia)?;
        info!(
            platform = %resolved.platform,
            kind = ?resolved.kind,
            "Resolved media url"
        );
        Ok(resolved)
    }
}
