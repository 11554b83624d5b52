//! Conversion worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use v2m_media::{FetchConfig, FfmpegTranscoder, ResumableFetcher};
use v2m_queue::RedisTaskQueue;
use v2m_resolver::ParserClient;
use v2m_storage::S3Client;
use v2m_store::PgJobStore;
use v2m_worker::{JobExecutor, JobProcessor, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive(
        "v2m=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn build_executor(config: WorkerConfig) -> anyhow::Result<JobExecutor> {
    let store = PgJobStore::from_env()
        .await
        .context("failed to connect to job store")?;
    store.init().await.context("failed to initialize job store")?;

    let objects = S3Client::from_env().context("failed to create S3 client")?;
    let resolver = ParserClient::from_env().context("failed to create parser client")?;

    let transcoder = FfmpegTranscoder::new();
    if let Err(e) = transcoder.check_available() {
        warn!("{}; transcoding will fail until it is installed", e);
    }

    let fetcher = ResumableFetcher::new(FetchConfig {
        request_timeout: config.job_timeout,
        ..FetchConfig::from_env()
    })
    .context("failed to create HTTP client")?;

    let queue = RedisTaskQueue::from_env().context("failed to create task queue")?;
    queue.init().await.context("failed to initialize task queue")?;

    let processor = Arc::new(JobProcessor::new(
        Arc::new(store),
        Arc::new(objects),
        Arc::new(resolver),
        Arc::new(transcoder),
        fetcher,
        config.work_dir.clone(),
    ));

    Ok(JobExecutor::new(config, Arc::new(queue), processor))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting v2m-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match v2m_worker::metrics::init_metrics(addr) {
            Ok(()) => info!("Metrics listening on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let executor = match build_executor(config).await {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            error!("Failed to start worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
