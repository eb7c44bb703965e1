//! MergeStore port - keyed merge state (registry, times, dedup set,
//! sequence, locks).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{MergeKey, MergerError};

/// Result of a [`MergeStore::delete_all`] teardown attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The key had no pending messages; all of its state is gone.
    Drained,
    /// New pushes arrived after the pluck. Only the caller's lock was
    /// released; the key stays registered with its fresh scheduled time.
    Rearmed,
}

/// Keyed merge state behind an atomic shared store.
///
/// Every operation is atomic with respect to concurrent callers, across
/// processes: the adapters back this with a single mutex section (in
/// memory) or a single MULTI/EXEC unit or script (Redis).
///
/// v1 ships Redis and in-memory adapters; this trait is the seam for
/// swapping implementations later.
#[async_trait]
pub trait MergeStore: Send + Sync {
    /// Record `msg` under `key` and (re)schedule the key at `execute_at`.
    ///
    /// The scheduled time is last-writer-wins - no min/max comparison.
    /// The canonical payload joins the dedup set and is appended to the
    /// sequence even when it is already a member.
    async fn push(
        &self,
        key: &MergeKey,
        msg: &Value,
        execute_at: DateTime<Utc>,
    ) -> Result<(), MergerError>;

    /// Remove `msg` from the dedup set and exactly one matching occurrence
    /// from the sequence. No-op when absent. Registry and scheduled time
    /// are untouched, even if the sequence becomes empty.
    async fn delete(&self, key: &MergeKey, msg: &Value) -> Result<(), MergerError>;

    /// Sequence length (duplicates counted).
    async fn size(&self, key: &MergeKey) -> Result<usize, MergerError>;

    /// Dedup-set membership: has this exact payload been pushed and not
    /// deleted, regardless of how many times it was pushed.
    async fn contains(&self, key: &MergeKey, msg: &Value) -> Result<bool, MergerError>;

    /// All currently registered merge keys, unordered.
    async fn all(&self) -> Result<Vec<MergeKey>, MergerError>;

    /// The key's scheduled execution time, if present and well-formed.
    async fn scheduled_time(&self, key: &MergeKey) -> Result<Option<DateTime<Utc>>, MergerError>;

    /// All messages in stored order, without mutating anything.
    async fn get(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError>;

    /// Atomically return all messages and empty the sequence. The dedup
    /// set, registry entry, and scheduled time are left alone - callers
    /// needing full teardown follow up with [`MergeStore::delete_all`].
    async fn pluck(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError>;

    /// Acquire the key's exclusive dispatch lock for `owner`, bounded by
    /// `ttl`. Returns `false` on contention.
    async fn try_lock(
        &self,
        key: &MergeKey,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, MergerError>;

    /// Release the key's lock if `owner` still holds it.
    async fn unlock(&self, key: &MergeKey, owner: &str) -> Result<(), MergerError>;

    /// Tear the key down once a batch has fully executed.
    ///
    /// If pushes raced in after the pluck, the sequence is no longer empty:
    /// only the `owner` lock is released and the key is reported as
    /// [`DrainOutcome::Rearmed`]. Otherwise the registry entry, scheduled
    /// time, dedup set, sequence, and lock go away as one logical unit.
    /// Newly pushed messages are never dropped.
    async fn delete_all(&self, key: &MergeKey, owner: &str) -> Result<DrainOutcome, MergerError>;

    /// Administrative wipe of every merge key's state. Test/reset tooling,
    /// not normal operation.
    async fn purge(&self) -> Result<(), MergerError>;
}
