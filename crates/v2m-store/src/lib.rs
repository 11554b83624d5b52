//! Job record store.
//!
//! This crate provides:
//! - The `JobStore` trait consumed by the API and the worker
//! - `PgJobStore`, backed by PostgreSQL via sqlx
//! - `MemoryJobStore`, an in-process implementation for tests and local runs

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use postgres::{PgJobStore, StoreConfig};
pub use store::{
    clamp_list_limit, JobStore, PageCursor, StatusUpdate, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
    SWEEP_PAGE_SIZE,
};
