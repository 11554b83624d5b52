//! Conversion worker.
//!
//! This crate provides:
//! - `JobProcessor`: the resolve, fetch, transcode and upload pipeline
//! - `JobExecutor`: queue consumption with bounded concurrency, per-task
//!   timeouts, requeue/DLQ handling and crash recovery
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{DeliveryHandler, DeliveryOutcome, JobExecutor};
pub use logging::JobLogger;
pub use processor::{JobProcessor, Outcome};
