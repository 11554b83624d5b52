//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission, status, download, retry and live status streams
//! - Shared-token auth and per-client admission control
//! - Retention cleanup, on demand and periodic
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod notifier;
pub mod rate_limit;
pub mod retention;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use notifier::{watch_job, WatchConfig, WatchEvent};
pub use rate_limit::{AdmissionControl, Decision, FixedWindowLimiter};
pub use retention::{RetentionSweeper, SweepReport};
pub use routes::create_router;
pub use state::AppState;
