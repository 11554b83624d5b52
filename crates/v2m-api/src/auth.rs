//! Shared-token authentication.
//!
//! Accepted credentials, in order: `Authorization: Bearer {token}`,
//! `X-API-KEY: {token}`, `?token={token}`. The query form exists for
//! `EventSource` and download links, which cannot set headers.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use tracing::debug;

use crate::error::ApiError;

/// Routes reachable without credentials.
fn is_public_path(path: &str) -> bool {
    matches!(path, "/health" | "/healthz" | "/ready")
}

/// Whether the request carries `token` in any accepted form.
pub fn is_authorized(request: &Request<Body>, token: &str) -> bool {
    if token.is_empty() {
        return true;
    }

    let headers = request.headers();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer == Some(token) {
        return true;
    }

    let api_key = headers.get("X-API-KEY").and_then(|v| v.to_str().ok());
    if api_key == Some(token) {
        return true;
    }

    request
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(k, v)| k == "token" && !v.is_empty() && v == token)
        })
        .unwrap_or(false)
}

/// Reject requests without the configured token.
pub async fn auth_middleware(
    State(token): State<Arc<str>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if is_public_path(request.uri().path()) || is_authorized(&request, &token) {
        return next.run(request).await;
    }

    debug!(path = %request.uri().path(), "Rejected unauthenticated request");
    ApiError::unauthorized().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_accepts_each_credential_form() {
        assert!(is_authorized(
            &request("/jobs", &[("Authorization", "Bearer s3cret")]),
            "s3cret"
        ));
        assert!(is_authorized(
            &request("/jobs", &[("X-API-KEY", "s3cret")]),
            "s3cret"
        ));
        assert!(is_authorized(&request("/jobs/1/events?token=s3cret", &[]), "s3cret"));
    }

    #[test]
    fn test_rejects_wrong_or_missing_token() {
        assert!(!is_authorized(&request("/jobs", &[]), "s3cret"));
        assert!(!is_authorized(
            &request("/jobs", &[("Authorization", "Bearer nope")]),
            "s3cret"
        ));
        assert!(!is_authorized(
            &request("/jobs", &[("Authorization", "s3cret")]),
            "s3cret"
        ));
        assert!(!is_authorized(&request("/jobs?token=", &[]), "s3cret"));
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/healthz"));
        assert!(is_public_path("/ready"));
        assert!(!is_public_path("/jobs"));
        assert!(!is_public_path("/admin/cleanup"));
    }
}
