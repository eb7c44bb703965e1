//! RedisMergeStore - [`MergeStore`] over the shared Redis.
//!
//! Multi-key updates that must land as one unit use MULTI/EXEC pipelines.
//! Updates whose write depends on a read in the same unit (owner-checked
//! unlock, conditional teardown) use small Lua scripts instead - the lock
//! alone cannot guard them, because `push` is deliberately lock-free.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};
use serde_json::Value;

use super::redis_client::{RedisClient, store_err};
use crate::domain::{MergeKey, MergerError, message};
use crate::ports::{DrainOutcome, MergeStore};

/// Release the lock (KEYS[1]) only while ARGV[1] still owns it.
const UNLOCK_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// Conditional teardown. KEYS = registry, time, unique, sequence, lock;
/// ARGV = registry member, owner token. Returns 1 when the key was fully
/// drained, 0 when new pushes re-armed it (then only the owner's lock is
/// dropped).
const DELETE_ALL_SCRIPT: &str = r"
if redis.call('LLEN', KEYS[4]) > 0 then
  if redis.call('GET', KEYS[5]) == ARGV[2] then
    redis.call('DEL', KEYS[5])
  end
  return 0
end
redis.call('SREM', KEYS[1], ARGV[1])
redis.call('DEL', KEYS[2], KEYS[3], KEYS[4], KEYS[5])
return 1
";

pub struct RedisMergeStore {
    client: RedisClient,
}

impl RedisMergeStore {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MergeStore for RedisMergeStore {
    async fn push(
        &self,
        key: &MergeKey,
        msg: &Value,
        execute_at: DateTime<Utc>,
    ) -> Result<(), MergerError> {
        let payload = message::canonical(msg);
        let keys = self.client.keys();
        let mut conn = self.client.conn();
        redis::pipe()
            .atomic()
            .sadd(keys.registry(), key.as_str())
            .ignore()
            .set(keys.time(key), execute_at.timestamp().to_string())
            .ignore()
            .sadd(keys.unique(key), &payload)
            .ignore()
            .rpush(keys.sequence(key), &payload)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn delete(&self, key: &MergeKey, msg: &Value) -> Result<(), MergerError> {
        let payload = message::canonical(msg);
        let keys = self.client.keys();
        let mut conn = self.client.conn();
        redis::pipe()
            .atomic()
            .srem(keys.unique(key), &payload)
            .ignore()
            .lrem(keys.sequence(key), 1, &payload)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn size(&self, key: &MergeKey) -> Result<usize, MergerError> {
        let mut conn = self.client.conn();
        conn.llen(self.client.keys().sequence(key))
            .await
            .map_err(store_err)
    }

    async fn contains(&self, key: &MergeKey, msg: &Value) -> Result<bool, MergerError> {
        let payload = message::canonical(msg);
        let mut conn = self.client.conn();
        conn.sismember(self.client.keys().unique(key), &payload)
            .await
            .map_err(store_err)
    }

    async fn all(&self) -> Result<Vec<MergeKey>, MergerError> {
        let mut conn = self.client.conn();
        let members: Vec<String> = conn
            .smembers(self.client.keys().registry())
            .await
            .map_err(store_err)?;
        Ok(members.into_iter().map(MergeKey::new).collect())
    }

    async fn scheduled_time(&self, key: &MergeKey) -> Result<Option<DateTime<Utc>>, MergerError> {
        let mut conn = self.client.conn();
        let raw: Option<String> = conn
            .get(self.client.keys().time(key))
            .await
            .map_err(store_err)?;
        Ok(raw
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }

    async fn get(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError> {
        let mut conn = self.client.conn();
        let raw: Vec<String> = conn
            .lrange(self.client.keys().sequence(key), 0, -1)
            .await
            .map_err(store_err)?;
        Ok(message::decode_sequence(key, raw))
    }

    async fn pluck(&self, key: &MergeKey) -> Result<Vec<Value>, MergerError> {
        let sequence = self.client.keys().sequence(key);
        let mut conn = self.client.conn();
        let (raw,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(&sequence, 0, -1)
            .del(&sequence)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(message::decode_sequence(key, raw))
    }

    async fn try_lock(
        &self,
        key: &MergeKey,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, MergerError> {
        let mut conn = self.client.conn();
        let granted: Option<String> = redis::cmd("SET")
            .arg(self.client.keys().lock(key))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(granted.is_some())
    }

    async fn unlock(&self, key: &MergeKey, owner: &str) -> Result<(), MergerError> {
        let mut conn = self.client.conn();
        let _released: i64 = Script::new(UNLOCK_SCRIPT)
            .key(self.client.keys().lock(key))
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_all(&self, key: &MergeKey, owner: &str) -> Result<DrainOutcome, MergerError> {
        let keys = self.client.keys();
        let mut conn = self.client.conn();
        let drained: i64 = Script::new(DELETE_ALL_SCRIPT)
            .key(keys.registry())
            .key(keys.time(key))
            .key(keys.unique(key))
            .key(keys.sequence(key))
            .key(keys.lock(key))
            .arg(key.as_str())
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(if drained == 1 {
            DrainOutcome::Drained
        } else {
            DrainOutcome::Rearmed
        })
    }

    async fn purge(&self) -> Result<(), MergerError> {
        let mut conn = self.client.conn();
        let found: Vec<String> = redis::cmd("KEYS")
            .arg(self.client.keys().wildcard())
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        if !found.is_empty() {
            let _: () = conn.del(found).await.map_err(store_err)?;
        }
        Ok(())
    }
}
