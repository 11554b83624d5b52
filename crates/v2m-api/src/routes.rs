//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::auth::auth_middleware;
use crate::handlers::{
    cleanup, create_job, download_job, get_job, health, job_events, list_jobs, ready, retry_job,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/download", get(download_job))
        .route("/jobs/:id/retry", post(retry_job))
        .route("/jobs/:id/events", get(job_events));

    let admin_routes = Router::new().route("/admin/cleanup", post(cleanup));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = match metrics_handle {
        Some(handle) => {
            Router::new().route("/metrics", get(move || async move { handle.render() }))
        }
        None => Router::new(),
    };

    let mut app = Router::new()
        .merge(job_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .merge(metrics_routes);

    // Auth sits inside admission control so rejected clients still count.
    if let Some(token) = state.config.api_token.as_deref() {
        app = app.layer(middleware::from_fn_with_state(
            Arc::<str>::from(token),
            auth_middleware,
        ));
    }
    if let Some(limiter) = state.limiter.clone() {
        app = app.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    app = app
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging));

    if let Some(cors) = cors_layer(&state.config.cors_origins) {
        app = app.layer(cors);
    }

    app.with_state(state)
}
