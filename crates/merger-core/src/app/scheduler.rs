//! Dispatch scheduler: discovers due merge keys and executes batches.
//!
//! One polling loop on a fixed cadence. Each due key's batch runs as an
//! independent tokio task bounded by a timeout; the loop itself never
//! waits on an execution, so one slow key cannot stall the others.

use std::sync::Arc;

use rand::Rng;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::app::config::MergerConfig;
use crate::domain::{ExecutionOutcome, MergeKey, MergerError};
use crate::ports::{BatchHandler, Clock, DrainOutcome, ExecutionObserver, MergeStore};

/// Scheduler handle.
/// - `request_shutdown()` stops the poll loop
/// - `shutdown_and_join()` waits for the loop to finish
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request shutdown. In-flight batch executions are not cancelled;
    /// the loop just stops starting new cycles.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the poll loop.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

/// Polls the store for due keys; locks, plucks, and dispatches each one.
pub struct Scheduler {
    store: Arc<dyn MergeStore>,
    handler: Arc<dyn BatchHandler>,
    observer: Arc<dyn ExecutionObserver>,
    clock: Arc<dyn Clock>,
    config: MergerConfig,
    /// Lock owner token for this scheduler instance.
    instance_id: String,
    in_flight: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn MergeStore>,
        handler: Arc<dyn BatchHandler>,
        observer: Arc<dyn ExecutionObserver>,
        clock: Arc<dyn Clock>,
        config: MergerConfig,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight));
        Self {
            store,
            handler,
            observer,
            clock,
            config,
            instance_id: ulid::Ulid::new().to_string(),
            in_flight,
        }
    }

    /// Spawn the poll loop.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::new(self);
        let join = tokio::spawn(async move {
            poll_loop(scheduler, &mut shutdown_rx).await;
        });
        SchedulerHandle { shutdown_tx, join }
    }

    /// One poll cycle: enumerate the registry and dispatch every due key.
    ///
    /// Per-key store errors only skip that key; `Err` here means the
    /// registry itself was unreadable.
    pub async fn poll_cycle(&self) -> Result<(), MergerError> {
        let keys = self.store.all().await?;
        for key in keys {
            if !self.is_due(&key).await {
                continue;
            }
            // 空き枠がなければ残りは次のサイクルに回す
            let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
                break;
            };
            match self.claim(&key).await {
                Ok(Some(batch)) => self.dispatch(key, batch, permit),
                Ok(None) => {} // contention, or already drained elsewhere
                Err(e) => {
                    tracing::warn!(merge_key = %key, error = %e, "skipping key this cycle");
                }
            }
        }
        Ok(())
    }

    /// Due when the scheduled time has elapsed. A missing time or a store
    /// error reads as "not due" - retried next cycle.
    async fn is_due(&self, key: &MergeKey) -> bool {
        match self.store.scheduled_time(key).await {
            Ok(Some(at)) => at <= self.clock.now(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(merge_key = %key, error = %e, "failed to read scheduled time");
                false
            }
        }
    }

    /// Lock the key and pluck its batch. `None` when another instance
    /// holds the lock or the sequence turned out empty.
    async fn claim(&self, key: &MergeKey) -> Result<Option<Vec<Value>>, MergerError> {
        if !self
            .store
            .try_lock(key, &self.instance_id, self.config.lock_ttl)
            .await?
        {
            return Ok(None);
        }
        let batch = match self.store.pluck(key).await {
            Ok(batch) => batch,
            Err(e) => {
                // let the key retry next cycle instead of waiting out the TTL
                let _ = self.store.unlock(key, &self.instance_id).await;
                return Err(e);
            }
        };
        if batch.is_empty() {
            // raced with another drain; the conditional teardown is a
            // no-op for keys that picked up fresh pushes meanwhile
            self.store.delete_all(key, &self.instance_id).await?;
            return Ok(None);
        }
        Ok(Some(batch))
    }

    /// Run one batch off the poll thread, bounded by the timeout.
    fn dispatch(&self, key: MergeKey, batch: Vec<Value>, permit: OwnedSemaphorePermit) {
        let store = Arc::clone(&self.store);
        let handler = Arc::clone(&self.handler);
        let observer = Arc::clone(&self.observer);
        let timeout = self.config.execution_timeout;
        let owner = self.instance_id.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = match tokio::time::timeout(timeout, handler.handle(&key, batch)).await {
                Ok(Ok(())) => ExecutionOutcome::Success,
                Ok(Err(e)) => ExecutionOutcome::Failed(e.to_string()),
                Err(_) => ExecutionOutcome::TimedOut,
            };
            observer.on_settled(&key, &outcome);
            settle(store.as_ref(), &key, &owner, &outcome).await;
        });
    }
}

/// Post-execution store bookkeeping. Failures here only log: the next
/// cycle (or the lock TTL) picks the key back up.
async fn settle(store: &dyn MergeStore, key: &MergeKey, owner: &str, outcome: &ExecutionOutcome) {
    let result = match outcome {
        ExecutionOutcome::Success => store.delete_all(key, owner).await.map(|drain| {
            if drain == DrainOutcome::Rearmed {
                tracing::debug!(merge_key = %key, "new pushes arrived during execution; key re-armed");
            }
        }),
        ExecutionOutcome::Failed(_) => store.unlock(key, owner).await,
        // the abandoned handler may still be running; the lock TTL keeps
        // the key fenced until it cannot be
        ExecutionOutcome::TimedOut => Ok(()),
    };
    if let Err(e) = result {
        tracing::warn!(merge_key = %key, error = %e, "post-execution cleanup failed");
    }
}

async fn poll_loop(scheduler: Arc<Scheduler>, shutdown_rx: &mut watch::Receiver<bool>) {
    // initial splay so multiple instances don't poll in lockstep
    let splay_ms =
        rand::thread_rng().gen_range(0..=scheduler.config.poll_interval.as_millis() as u64);
    tokio::select! {
        _ = shutdown_rx.changed() => {}
        _ = tokio::time::sleep(Duration::from_millis(splay_ms)) => {}
    }

    let mut failures: u32 = 0;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match scheduler.poll_cycle().await {
            Ok(()) => failures = 0,
            Err(e) => {
                failures += 1;
                if failures >= scheduler.config.max_poll_failures {
                    tracing::error!(error = %e, failures, "merge registry unreachable; stopping scheduler");
                    break;
                }
                tracing::warn!(error = %e, failures, "failed to enumerate merge keys");
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => continue,
            _ = tokio::time::sleep(scheduler.config.poll_interval) => {}
        }
    }
}
