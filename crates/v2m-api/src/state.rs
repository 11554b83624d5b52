//! Application state.

use std::sync::Arc;

use v2m_queue::{RedisTaskQueue, TaskDispatcher};
use v2m_storage::{ObjectStore, S3Client};
use v2m_store::{JobStore, PgJobStore};

use crate::config::ApiConfig;
use crate::rate_limit::{AdmissionControl, FixedWindowLimiter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    /// Bucket used to recognize legacy result URLs
    pub bucket: String,
    /// `None` when admission control is disabled
    pub limiter: Option<Arc<dyn AdmissionControl>>,
}

impl AppState {
    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        bucket: impl Into<String>,
    ) -> Self {
        let limiter = (config.rate_limit_per_min > 0).then(|| {
            Arc::new(FixedWindowLimiter::per_minute(config.rate_limit_per_min))
                as Arc<dyn AdmissionControl>
        });

        Self {
            config,
            store,
            objects,
            dispatcher,
            bucket: bucket.into(),
            limiter,
        }
    }

    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = PgJobStore::from_env().await?;
        store.init().await?;

        let objects = S3Client::from_env()?;
        let bucket = objects.bucket().to_string();

        let queue = RedisTaskQueue::from_env()?;
        queue.init().await?;

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(objects),
            Arc::new(queue),
            bucket,
        ))
    }
}
