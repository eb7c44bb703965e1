//! Adapters for the ports.
//!
//! - **RedisMergeStore**: production store over a shared Redis
//! - **InMemoryMergeStore**: dev/test store, no external process
//! - **LoggingObserver**: failure reporting on the tracing stack

pub mod logging_observer;
pub mod memory;
pub mod redis_client;
pub mod redis_store;

pub use self::logging_observer::LoggingObserver;
pub use self::memory::InMemoryMergeStore;
pub use self::redis_client::{KeySpace, RedisClient, DEFAULT_NAMESPACE};
pub use self::redis_store::RedisMergeStore;
