//! In-memory store implementation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::{MergeKey, MergerError, message};
use crate::ports::{DrainOutcome, MergeStore};

/// Lock entry: owner token plus expiry, so a crashed holder cannot wedge
/// the key.
#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// In-memory store state.
///
/// Single source of truth behind one mutex: every operation takes the lock
/// once, so each is naturally atomic - the same contract the Redis adapter
/// gets from MULTI/EXEC.
#[derive(Default)]
struct InMemoryState {
    registry: HashSet<MergeKey>,
    times: HashMap<MergeKey, i64>,
    unique: HashMap<MergeKey, HashSet<String>>,
    sequences: HashMap<MergeKey, VecDeque<String>>,
    locks: HashMap<MergeKey, LockEntry>,
}

impl InMemoryState {
    fn lock_held(&self, key: &MergeKey, now: Instant) -> bool {
        self.locks.get(key).is_some_and(|l| l.expires_at > now)
    }

    fn held_by(&self, key: &MergeKey, owner: &str, now: Instant) -> bool {
        self.locks
            .get(key)
            .is_some_and(|l| l.expires_at > now && l.owner == owner)
    }
}

/// In-memory [`MergeStore`] for development and tests: same contract as
/// the Redis adapter, no external process.
pub struct InMemoryMergeStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryMergeStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
        }
    }
}

impl Default for InMemoryMergeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MergeStore for InMemoryMergeStore {
    async fn push(
        &self,
        key: &MergeKey,
        msg: &Value,
        execute_at: DateTime<Utc>,
    ) -> Result<(), MergerError> {
        let payload = message::canonical(msg);
        let mut state = self.state.lock().await;
        state.registry.insert(key.clone());
        state.times.insert(key.clone(), execute_at.timestamp());
        state
            .unique
            .entry(key.clone())
            .or_default()
            .insert(payload.clone());
        state
            .sequences
            .entry(key.clone())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn delete(&self, key: &MergeKey, msg: &Value) -> Result<(), MergerError> {
        let payload = message::canonical(msg);
        let mut state = self.state.lock().await;
        if let Some(set) = state.unique.get_mut(key) {
            set.remove(&payload);
        }
        if let Some(seq) = state.sequences.get_mut(key)
            && let Some(pos) = seq.iter().position(|m| m == &payload)
        {
            seq.remove(pos);
        }
        Ok(())
    }

    async fn size(&self, key: &MergeKey) -> Result<usize, MergerError> {
        let state = self.state.lock().await;
        Ok(state.sequences.get(key).map_or(0, VecDeque::len))
    }

    async fn contains(&self, key: &MergeKey, msg: &Value) -> Result<bool, MergerError> {
        let payload = message::canonical(msg);
        let state = self.state.lock().await;
        Ok(state.unique.get(key).is_some_and(|s| s.contains(&payload)))
    }

    async fn all(&self) -> Result<Vec<MergeKey>, MergerError> {
        let state = self.state.lock().await;
        Ok(state.registry.iter().cloned().collect())
    }

    async fn scheduled_time(&self, key: &MergeKey) -> Result<Option<DateTime<Utc>>, MergerError> {
        let state = self.state.lock().await;
        Ok(state
            .times
            .get(key)
            .and_then(|secs| DateTime::from_timestamp(*secs, 0)))
    }

    async fn get(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError> {
        let raw = {
            let state = self.state.lock().await;
            state
                .sequences
                .get(key)
                .map(|seq| seq.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        };
        Ok(message::decode_sequence(key, raw))
    }

    async fn pluck(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError> {
        let raw = {
            let mut state = self.state.lock().await;
            state
                .sequences
                .remove(key)
                .map(Vec::from)
                .unwrap_or_default()
        };
        Ok(message::decode_sequence(key, raw))
    }

    async fn try_lock(
        &self,
        key: &MergeKey,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, MergerError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.lock_held(key, now) {
            return Ok(false);
        }
        state.locks.insert(
            key.clone(),
            LockEntry {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &MergeKey, owner: &str) -> Result<(), MergerError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.held_by(key, owner, now) {
            state.locks.remove(key);
        }
        Ok(())
    }

    async fn delete_all(&self, key: &MergeKey, owner: &str) -> Result<DrainOutcome, MergerError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.sequences.get(key).is_some_and(|seq| !seq.is_empty()) {
            // Pushes raced in after the pluck: keep everything, drop only
            // the caller's lock.
            if state.held_by(key, owner, now) {
                state.locks.remove(key);
            }
            return Ok(DrainOutcome::Rearmed);
        }
        state.registry.remove(key);
        state.times.remove(key);
        state.unique.remove(key);
        state.sequences.remove(key);
        state.locks.remove(key);
        Ok(DrainOutcome::Drained)
    }

    async fn purge(&self) -> Result<(), MergerError> {
        let mut state = self.state.lock().await;
        *state = InMemoryState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn key(s: &str) -> MergeKey {
        MergeKey::new(s)
    }

    fn at(secs_from_epoch: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs_from_epoch, 0).unwrap()
    }

    #[tokio::test]
    async fn push_registers_key_time_unique_and_sequence() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();

        assert_eq!(store.all().await.unwrap(), vec![key("foo")]);
        assert_eq!(store.scheduled_time(&key("foo")).await.unwrap(), Some(at(100)));
        assert!(store.contains(&key("foo"), &json!([1, 2, 3])).await.unwrap());
        assert_eq!(store.size(&key("foo")).await.unwrap(), 1);
        assert_eq!(store.get(&key("foo")).await.unwrap(), vec![json!([1, 2, 3])]);
    }

    #[tokio::test]
    async fn push_to_existing_key_appends() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("foo"), &json!([2, 3, 4]), at(100)).await.unwrap();

        assert_eq!(store.all().await.unwrap(), vec![key("foo")]);
        assert_eq!(store.size(&key("foo")).await.unwrap(), 2);
        assert_eq!(
            store.get(&key("foo")).await.unwrap(),
            vec![json!([1, 2, 3]), json!([2, 3, 4])]
        );
    }

    #[tokio::test]
    async fn duplicate_push_grows_sequence_not_unique_set() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();

        assert_eq!(store.size(&key("foo")).await.unwrap(), 2);
        assert!(store.contains(&key("foo"), &json!([1, 2, 3])).await.unwrap());
        let state = store.state.lock().await;
        assert_eq!(state.unique.get(&key("foo")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pushes_to_other_keys_stay_separate() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("bar"), &json!([2, 3, 4]), at(3700)).await.unwrap();

        let mut all = store.all().await.unwrap();
        all.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(all, vec![key("bar"), key("foo")]);
        assert_eq!(store.scheduled_time(&key("bar")).await.unwrap(), Some(at(3700)));
        assert_eq!(store.get(&key("bar")).await.unwrap(), vec![json!([2, 3, 4])]);
        assert_eq!(store.get(&key("foo")).await.unwrap(), vec![json!([1, 2, 3])]);
    }

    #[tokio::test]
    async fn scheduled_time_is_last_writer_wins() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!(1), at(200)).await.unwrap();
        store.push(&key("foo"), &json!(2), at(100)).await.unwrap();
        // The later push wins even though it scheduled an earlier time.
        assert_eq!(store.scheduled_time(&key("foo")).await.unwrap(), Some(at(100)));
    }

    #[tokio::test]
    async fn logically_equal_payloads_dedup_regardless_of_key_order() {
        let store = InMemoryMergeStore::new();
        store
            .push(&key("foo"), &json!({"a": 1, "b": 2}), at(100))
            .await
            .unwrap();
        assert!(
            store
                .contains(&key("foo"), &json!({"b": 2, "a": 1}))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn delete_removes_one_occurrence_and_unique_membership() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("foo"), &json!([2, 3, 4]), at(100)).await.unwrap();
        store.delete(&key("foo"), &json!([1, 2, 3])).await.unwrap();

        assert_eq!(store.get(&key("foo")).await.unwrap(), vec![json!([2, 3, 4])]);
        assert!(!store.contains(&key("foo"), &json!([1, 2, 3])).await.unwrap());
    }

    #[tokio::test]
    async fn delete_with_duplicates_leaves_the_rest() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.delete(&key("foo"), &json!([1, 2, 3])).await.unwrap();

        // One occurrence is gone; unique membership is gone unconditionally.
        assert_eq!(store.size(&key("foo")).await.unwrap(), 1);
        assert!(!store.contains(&key("foo"), &json!([1, 2, 3])).await.unwrap());
        // Registry and time survive even when deletes empty the sequence.
        store.delete(&key("foo"), &json!([1, 2, 3])).await.unwrap();
        assert_eq!(store.size(&key("foo")).await.unwrap(), 0);
        assert_eq!(store.all().await.unwrap(), vec![key("foo")]);
        assert!(store.scheduled_time(&key("foo")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_of_absent_payload_is_a_noop() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.delete(&key("foo"), &json!("missing")).await.unwrap();
        assert_eq!(store.size(&key("foo")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_does_not_mutate() {
        let store = InMemoryMergeStore::new();
        store.push(&key("bar"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("bar"), &json!([2, 3, 4]), at(100)).await.unwrap();

        assert_eq!(
            store.get(&key("bar")).await.unwrap(),
            vec![json!([1, 2, 3]), json!([2, 3, 4])]
        );
        assert_eq!(store.size(&key("bar")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pluck_empties_sequence_but_keeps_unique_set_and_registry() {
        let store = InMemoryMergeStore::new();
        store.push(&key("bar"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("bar"), &json!([2, 3, 4]), at(100)).await.unwrap();

        let plucked = store.pluck(&key("bar")).await.unwrap();
        assert_eq!(plucked, vec![json!([1, 2, 3]), json!([2, 3, 4])]);
        assert_eq!(store.size(&key("bar")).await.unwrap(), 0);
        assert!(store.contains(&key("bar"), &json!([1, 2, 3])).await.unwrap());
        assert_eq!(store.all().await.unwrap(), vec![key("bar")]);
    }

    #[tokio::test]
    async fn delete_all_drains_an_empty_key() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.pluck(&key("foo")).await.unwrap();

        let drain = store.delete_all(&key("foo"), "owner").await.unwrap();
        assert_eq!(drain, DrainOutcome::Drained);
        assert!(store.all().await.unwrap().is_empty());
        assert_eq!(store.size(&key("foo")).await.unwrap(), 0);
        assert!(store.get(&key("foo")).await.unwrap().is_empty());
        assert!(store.scheduled_time(&key("foo")).await.unwrap().is_none());
        assert!(!store.contains(&key("foo"), &json!([1, 2, 3])).await.unwrap());
    }

    #[tokio::test]
    async fn delete_all_rearms_when_pushes_raced_in() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        assert!(
            store
                .try_lock(&key("foo"), "owner", Duration::from_secs(60))
                .await
                .unwrap()
        );
        store.pluck(&key("foo")).await.unwrap();
        // A caller pushes between pluck and teardown.
        store.push(&key("foo"), &json!([9, 9]), at(200)).await.unwrap();

        let drain = store.delete_all(&key("foo"), "owner").await.unwrap();
        assert_eq!(drain, DrainOutcome::Rearmed);
        assert_eq!(store.all().await.unwrap(), vec![key("foo")]);
        assert_eq!(store.size(&key("foo")).await.unwrap(), 1);
        assert_eq!(store.scheduled_time(&key("foo")).await.unwrap(), Some(at(200)));
        // The lock was released, so the key is dispatchable again.
        assert!(
            store
                .try_lock(&key("foo"), "other", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn try_lock_is_exclusive_until_unlock() {
        let store = InMemoryMergeStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.try_lock(&key("foo"), "a", ttl).await.unwrap());
        assert!(!store.try_lock(&key("foo"), "b", ttl).await.unwrap());

        // A non-owner unlock must not release it.
        store.unlock(&key("foo"), "b").await.unwrap();
        assert!(!store.try_lock(&key("foo"), "b", ttl).await.unwrap());

        store.unlock(&key("foo"), "a").await.unwrap();
        assert!(store.try_lock(&key("foo"), "b", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_is_acquirable_again() {
        let store = InMemoryMergeStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.try_lock(&key("foo"), "a", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.try_lock(&key("foo"), "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn purge_wipes_every_key() {
        let store = InMemoryMergeStore::new();
        store.push(&key("foo"), &json!([1, 2, 3]), at(100)).await.unwrap();
        store.push(&key("bar"), &json!([2, 3, 4]), at(100)).await.unwrap();
        store
            .try_lock(&key("foo"), "a", Duration::from_secs(60))
            .await
            .unwrap();

        store.purge().await.unwrap();

        assert!(store.all().await.unwrap().is_empty());
        assert_eq!(store.size(&key("foo")).await.unwrap(), 0);
        assert!(!store.contains(&key("bar"), &json!([2, 3, 4])).await.unwrap());
        assert!(store.scheduled_time(&key("foo")).await.unwrap().is_none());
        assert!(
            store
                .try_lock(&key("foo"), "b", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    /// The end-to-end sequence of push / duplicate / delete semantics.
    #[tokio::test]
    async fn merge_lifecycle_for_one_key() {
        let store = InMemoryMergeStore::new();
        let foo = key("foo");
        let msg = json!([1, 2, 3]);

        store.push(&foo, &msg, at(100)).await.unwrap();
        assert_eq!(store.all().await.unwrap(), vec![foo.clone()]);
        assert_eq!(store.get(&foo).await.unwrap(), vec![msg.clone()]);
        assert_eq!(store.size(&foo).await.unwrap(), 1);

        store.push(&foo, &msg, at(100)).await.unwrap();
        assert_eq!(store.size(&foo).await.unwrap(), 2);
        assert!(store.contains(&foo, &msg).await.unwrap());

        // Deleting removes one occurrence from the sequence and the dedup
        // membership unconditionally.
        store.delete(&foo, &msg).await.unwrap();
        assert_eq!(store.size(&foo).await.unwrap(), 1);
        assert!(!store.contains(&foo, &msg).await.unwrap());
    }
}
