//! Resolution errors.

use thiserror::Error;

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors from the resolution service. Every variant is terminal for the
/// job: resolving the same link again will not succeed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("PARSER_API_URL is required")]
    NotConfigured,

    #[error("invalid parser url: {0}")]
    InvalidEndpoint(String),

    #[error("parser request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("parser http status {0}")]
    HttpStatus(u16),

    #[error("parser error: {retcode} {retdesc}")]
    Rejected { retcode: i64, retdesc: String },

    #[error("parser returned no media url")]
    NoMedia,
}
