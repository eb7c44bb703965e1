//! merger-core
//!
//! Core building blocks for the merger runtime: accumulate job messages
//! under a caller-supplied merge key, dedup identical payloads, and hand
//! the whole batch to one execution once the key's scheduled time elapses.
//!
//! # Module map
//! - **domain**: model (MergeKey, canonical message codec, outcomes, errors)
//! - **ports**: abstraction layer (MergeStore, BatchHandler, ExecutionObserver, Clock)
//! - **impls**: adapters (RedisMergeStore for production, InMemoryMergeStore for dev/test, LoggingObserver)
//! - **app**: application logic (config, builder/facade, dispatch scheduler, status views)

pub mod domain;
pub mod ports;
pub mod impls;
pub mod app;
