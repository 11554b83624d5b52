//! Resolution of share links into direct media URLs.
//!
//! The resolution service expects a signed header triple on every call;
//! see `signing` for the scheme.

pub mod client;
pub mod error;
pub mod signing;
pub mod types;

pub use client::{MediaResolver, ParserClient, ParserConfig};
pub use error::{ResolveError, ResolveResult};
pub use types::{MediaKind, ResolvedMedia};
