//! Task dispatch over Redis Streams.
//!
//! This crate provides:
//! - `TaskDispatcher`: the producer side used by the API
//! - `TaskConsumer`: the delivery side used by workers, with ack, requeue,
//!   dead-lettering and crash recovery via pending-entry claims
//! - `RedisTaskQueue` implementing both, plus an in-process `MemoryTaskQueue`

pub mod error;
pub mod memory;
pub mod queue;
pub mod task;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryTaskQueue;
pub use queue::{QueueConfig, RedisTaskQueue, TaskConsumer, TaskDispatcher};
pub use task::{Delivery, ProcessTask, TaskEnvelope};
