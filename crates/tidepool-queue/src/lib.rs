//! Ordered, blocking-pop message queues shared by the controller and the device loop.
//!
//! The byte-level [`MessageQueue`] trait is what a backend implements: an
//! in-process [`InMemoryQueue`] for tests and single-process runs, and a Redis
//! list ([`RedisQueue`], feature `redis-queue`) when the two sides live in
//! different processes. [`TypedQueue`] layers the wire schema on top, and
//! [`ExchangeQueues`] bundles the action/observation pair a session needs.

pub mod args;
pub mod exchange;
pub mod memory;
mod metrics;
pub mod queue;
#[cfg(feature = "redis-queue")]
pub mod queue_redis;
pub mod typed;

pub use args::QueueArgs;
pub use exchange::{ExchangeQueues, QueueBackend, QueueConfig};
pub use memory::InMemoryQueue;
pub use queue::{MessageQueue, QueueError, QueueResult};
#[cfg(feature = "redis-queue")]
pub use queue_redis::RedisQueue;
pub use typed::TypedQueue;
