//! Merger wiring and facade.
//!
//! The builder validates the wiring up front (fail-fast) so a bad
//! deployment dies at startup with a clear message instead of limping
//! through its first poll cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::app::config::MergerConfig;
use crate::app::scheduler::{Scheduler, SchedulerHandle};
use crate::app::status::PendingCounts;
use crate::domain::{MergeKey, MergerError};
use crate::impls::LoggingObserver;
use crate::ports::{BatchHandler, Clock, ExecutionObserver, MergeStore, SystemClock};

/// Wiring failures surfaced at build time.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("a merge store is required")]
    MissingStore,

    #[error("a batch handler is required")]
    MissingHandler,

    #[error("lock_ttl ({lock_ttl:?}) must exceed execution_timeout ({execution_timeout:?})")]
    LockShorterThanTimeout {
        lock_ttl: Duration,
        execution_timeout: Duration,
    },

    #[error("max_in_flight must be non-zero")]
    ZeroConcurrency,
}

/// Builds a [`Merger`].
///
/// # 使用例
/// ```ignore
/// let merger = MergerBuilder::new()
///     .store(Arc::new(InMemoryMergeStore::new()))
///     .handler(Arc::new(MyBatchHandler))
///     .build()?;
/// let handle = merger.start();
/// ```
pub struct MergerBuilder {
    store: Option<Arc<dyn MergeStore>>,
    handler: Option<Arc<dyn BatchHandler>>,
    observer: Option<Arc<dyn ExecutionObserver>>,
    clock: Option<Arc<dyn Clock>>,
    config: MergerConfig,
}

impl MergerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            handler: None,
            observer: None,
            clock: None,
            config: MergerConfig::default_v1(),
        }
    }

    pub fn store(mut self, store: Arc<dyn MergeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn BatchHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Defaults to [`LoggingObserver`].
    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: MergerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the wiring and produce the runtime facade.
    pub fn build(self) -> Result<Merger, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let handler = self.handler.ok_or(BuildError::MissingHandler)?;
        let config = self.config;
        if config.max_in_flight == 0 {
            return Err(BuildError::ZeroConcurrency);
        }
        if config.lock_ttl <= config.execution_timeout {
            return Err(BuildError::LockShorterThanTimeout {
                lock_ttl: config.lock_ttl,
                execution_timeout: config.execution_timeout,
            });
        }
        Ok(Merger {
            store,
            handler,
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(LoggingObserver)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config,
        })
    }
}

impl Default for MergerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime facade: submission, inspection, administration, lifecycle.
pub struct Merger {
    store: Arc<dyn MergeStore>,
    handler: Arc<dyn BatchHandler>,
    observer: Arc<dyn ExecutionObserver>,
    clock: Arc<dyn Clock>,
    config: MergerConfig,
}

impl Merger {
    /// Submission hook: accumulate `msg` under `key`, scheduled at
    /// `execute_at` (last write wins).
    pub async fn push(
        &self,
        key: &MergeKey,
        msg: &Value,
        execute_at: DateTime<Utc>,
    ) -> Result<(), MergerError> {
        self.store.push(key, msg, execute_at).await
    }

    /// Drop one occurrence of `msg` from `key`'s batch.
    pub async fn delete(&self, key: &MergeKey, msg: &Value) -> Result<(), MergerError> {
        self.store.delete(key, msg).await
    }

    pub async fn size(&self, key: &MergeKey) -> Result<usize, MergerError> {
        self.store.size(key).await
    }

    pub async fn contains(&self, key: &MergeKey, msg: &Value) -> Result<bool, MergerError> {
        self.store.contains(key, msg).await
    }

    pub async fn all(&self) -> Result<Vec<MergeKey>, MergerError> {
        self.store.all().await
    }

    pub async fn get(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError> {
        self.store.get(key).await
    }

    /// Snapshot of pending keys and messages.
    pub async fn counts(&self) -> Result<PendingCounts, MergerError> {
        let keys = self.store.all().await?;
        let mut counts = PendingCounts {
            keys: keys.len(),
            messages: 0,
        };
        for key in &keys {
            counts.messages += self.store.size(key).await?;
        }
        Ok(counts)
    }

    /// Administrative full-state reset.
    pub async fn purge(&self) -> Result<(), MergerError> {
        self.store.purge().await
    }

    /// Start the dispatch scheduler.
    pub fn start(&self) -> SchedulerHandle {
        Scheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.handler),
            Arc::clone(&self.observer),
            Arc::clone(&self.clock),
            self.config.clone(),
        )
        .spawn()
    }
}
