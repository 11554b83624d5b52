//! Submit a link through the API, run the worker pipeline against stub
//! collaborators, then download the result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{header as header_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use v2m_api::{create_router, ApiConfig, AppState};
use v2m_media::{FetchConfig, MediaResult, ResumableFetcher, Transcoder};
use v2m_models::{JobId, JobStatus};
use v2m_queue::{MemoryTaskQueue, TaskConsumer};
use v2m_resolver::{MediaKind, MediaResolver, ResolveResult, ResolvedMedia};
use v2m_storage::MemoryObjectStore;
use v2m_store::{JobStore, MemoryJobStore};
use v2m_worker::{DeliveryHandler, DeliveryOutcome, JobProcessor};

struct StubResolver {
    media_url: String,
}

#[async_trait]
impl MediaResolver for StubResolver {
    async fn resolve(&self, _source_url: &str) -> ResolveResult<ResolvedMedia> {
        Ok(ResolvedMedia {
            platform: "douyin".into(),
            media_url: self.media_url.clone(),
            kind: MediaKind::Video,
            title: Some("demo".into()),
        })
    }
}

/// Writes a fixed MP3 header followed by the input bytes.
struct StubTranscoder;

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let mut bytes = b"ID3".to_vec();
        bytes.extend(tokio::fs::read(input).await?);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_douyin_link_to_download() {
    let media = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/play/v.mp4"))
        .and(header_matcher("referer", "https://v.douyin.com/abc123/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video-bytes".to_vec()))
        .mount(&media)
        .await;

    let store = Arc::new(MemoryJobStore::new());
    let objects = Arc::new(MemoryObjectStore::default());
    let queue = Arc::new(MemoryTaskQueue::default());

    let state = AppState::from_parts(
        ApiConfig::default(),
        store.clone(),
        objects.clone(),
        queue.clone(),
        "v2m",
    );
    let router = create_router(state, None);

    // Submit
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"url":"7.43 复制打开抖音 https://v.douyin.com/abc123/ 看看"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body["status"], "queued");
    let job_id = JobId::from(body["job_id"].as_str().unwrap());
    assert_eq!(store.get(&job_id).await.unwrap().status, JobStatus::Queued);

    // Process
    let work_dir = tempfile::tempdir().unwrap();
    let fetcher = ResumableFetcher::new(FetchConfig {
        backoff_step: Duration::from_millis(5),
        ..Default::default()
    })
    .unwrap();
    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        objects.clone(),
        Arc::new(StubResolver {
            media_url: format!("{}/play/v.mp4", media.uri()),
        }),
        Arc::new(StubTranscoder),
        fetcher,
        work_dir.path(),
    ));
    let handler = DeliveryHandler::new(processor, queue.clone(), CancellationToken::new());

    let delivery = queue.consume("e2e", 0, 1).await.unwrap().remove(0);
    assert_eq!(delivery.job_id(), &job_id);
    assert_eq!(handler.handle(delivery).await, DeliveryOutcome::Completed);
    assert_eq!(queue.pending_len(), 0);

    let key = format!("jobs/{}.mp3", job_id);
    let job = store.get(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Ready);
    assert_eq!(job.result_ref.as_deref(), Some(key.as_str()));
    assert!(job.error.is_none());
    assert_eq!(objects.get(&key).unwrap().bytes, b"ID3video-bytes");

    // Download
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/jobs/{}/download", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("https://objects.test/v2m/{}", key)));
    assert!(location.contains(&format!("video2mp3-{}.mp3", job_id)));
}
