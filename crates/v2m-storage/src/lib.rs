//! Object storage for produced audio.
//!
//! This crate provides:
//! - The `ObjectStore` trait (upload, signed read URLs, delete)
//! - `S3Client` for S3-compatible endpoints, with a separate public
//!   endpoint for signing URLs handed to browsers
//! - `MemoryObjectStore` for tests

pub mod client;
pub mod error;
pub mod memory;
pub mod object_store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryObjectStore;
pub use object_store::{ObjectStore, DEFAULT_PRESIGN_TTL, MP3_CONTENT_TYPE};
