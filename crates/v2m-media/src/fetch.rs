//! Resumable HTTP download.
//!
//! A partial file left by a failed attempt is resumed with a `Range`
//! request on the next one. Servers that ignore the range and answer 200
//! get the file truncated and rewritten from the start.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{RANGE, REFERER};
use reqwest::StatusCode;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Desktop browser UA; some CDNs refuse obvious bot agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Download retry and limit settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Attempts per fetch, including the first
    pub max_attempts: u32,
    /// Sleep before attempt `n + 1` is `n * backoff_step`
    pub backoff_step: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Reject bodies larger than this
    pub max_file_size: Option<u64>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
            request_timeout: Duration::from_secs(300),
            max_file_size: Some(200_000_000),
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_file_size: match std::env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(0) => None,
                Some(n) => Some(n),
                None => defaults.max_file_size,
            },
            ..defaults
        }
    }
}

/// HTTP downloader with byte-range resume.
#[derive(Debug, Clone)]
pub struct ResumableFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl ResumableFetcher {
    pub fn new(config: FetchConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download `url` into `dest`, returning the final file size.
    ///
    /// Transient failures are retried up to `max_attempts` times with a
    /// linear backoff. Cancellation aborts both in-flight requests and
    /// backoff sleeps.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        referer: Option<&str>,
        cancel: &CancellationToken,
    ) -> MediaResult<u64> {
        if url.trim().is_empty() {
            return Err(MediaError::EmptyUrl);
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(MediaError::Cancelled),
                r = self.fetch_once(url, dest, referer) => r,
            };

            match result {
                Ok(size) => {
                    info!(bytes = size, attempt, "Download complete: {}", dest.display());
                    return Ok(size);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, "Download attempt failed: {}", e);
                    let backoff = self.config.backoff_step * attempt;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(MediaError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str, dest: &Path, referer: Option<&str>) -> MediaResult<u64> {
        let offset = match fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(url);
        if let Some(referer) = referer.filter(|r| !r.is_empty()) {
            request = request.header(REFERER, referer);
        }
        if offset > 0 {
            debug!(offset, "Resuming download");
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            // The partial file no longer matches the remote; start over.
            let _ = fs::remove_file(dest).await;
            return Err(MediaError::RangeNotSatisfiable);
        }
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(MediaError::http_status(status.as_u16()));
        }

        let append = status == StatusCode::PARTIAL_CONTENT && offset > 0;
        let mut written = if append { offset } else { 0 };

        if let (Some(limit), Some(len)) = (self.config.max_file_size, response.content_length()) {
            if written + len > limit {
                let _ = fs::remove_file(dest).await;
                return Err(MediaError::TooLarge { limit });
            }
        }

        let mut file = if append {
            OpenOptions::new().append(true).open(dest).await?
        } else {
            fs::File::create(dest).await?
        };

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if let Some(limit) = self.config.max_file_size {
                if written > limit {
                    drop(file);
                    let _ = fs::remove_file(dest).await;
                    return Err(MediaError::TooLarge { limit });
                }
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_fetcher(max_file_size: Option<u64>) -> ResumableFetcher {
        ResumableFetcher::new(FetchConfig {
            backoff_step: Duration::from_millis(5),
            request_timeout: Duration::from_secs(5),
            max_file_size,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_retries_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v.mp4"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v.mp4"))
            .and(header("referer", "https://www.douyin.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.mp4");
        let size = fast_fetcher(None)
            .fetch(
                &format!("{}/v.mp4", server.uri()),
                &dest,
                Some("https://www.douyin.com/"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(size, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_fetch_resumes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.m4a"))
            .and(header("range", "bytes=4-"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"efgh".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.m4a");
        std::fs::write(&dest, b"abcd").unwrap();

        let size = fast_fetcher(None)
            .fetch(&format!("{}/a.m4a", server.uri()), &dest, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(size, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn test_fetch_restarts_after_range_not_satisfiable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.m4a"))
            .respond_with(ResponseTemplate::new(416))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.m4a"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.m4a");
        std::fs::write(&dest, b"stale-bytes").unwrap();

        fast_fetcher(None)
            .fetch(&format!("{}/a.m4a", server.uri()), &dest, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].headers.get("range").unwrap(), "bytes=11-");
        assert!(requests[1].headers.get("range").is_none());
    }

    /// Serves `responses` in order, one per connection, and returns the
    /// `Range` header each request carried.
    async fn scripted_server(
        responses: Vec<&'static [u8]>,
    ) -> (String, tokio::task::JoinHandle<Vec<Option<String>>>) {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v.mp4", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut ranges = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let text = String::from_utf8_lossy(&request).to_lowercase();
                ranges.push(
                    text.lines()
                        .find_map(|l| l.strip_prefix("range:"))
                        .map(|v| v.trim().to_string()),
                );
                socket.write_all(response).await.unwrap();
                socket.shutdown().await.ok();
            }
            ranges
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_fetch_resumes_after_truncated_body() {
        let (url, server) = scripted_server(vec![
            &b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nabcd"[..],
            &b"HTTP/1.1 206 Partial Content\r\nContent-Length: 6\r\nContent-Range: bytes 4-9/10\r\nConnection: close\r\n\r\nefghij"[..],
        ])
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.mp4");
        let size = fast_fetcher(None)
            .fetch(&url, &dest, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(size, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdefghij");
        assert_eq!(
            server.await.unwrap(),
            vec![None, Some("bytes=4-".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fast_fetcher(None)
            .fetch(
                &format!("{}/gone.mp4", server.uri()),
                &dir.path().join("x.mp4"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::HttpStatus { status: 404, retryable: false }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("big.mp4");
        let err = fast_fetcher(Some(16))
            .fetch(&format!("{}/big.mp4", server.uri()), &dest, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::TooLarge { limit: 16 }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let dir = tempfile::tempdir().unwrap();
        let err = fast_fetcher(None)
            .fetch("http://127.0.0.1:9/never", &dir.path().join("x"), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = fast_fetcher(None)
            .fetch(" ", &dir.path().join("x"), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EmptyUrl));
    }
}
