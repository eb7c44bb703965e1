//! Redis client - scoped access to the shared keyed store.
//!
//! Thin wrapper around a reconnecting connection plus the namespaced key
//! layout. All merge state for one deployment lives under a single
//! namespace prefix.

use redis::aio::ConnectionManager;

use crate::domain::{MergeKey, MergerError};

/// Default namespace prefix.
pub const DEFAULT_NAMESPACE: &str = "merger";

/// Namespaced key layout, preserved across deployments: one registry set,
/// one time scalar per key, one dedup set per key, one ordered list per
/// key, one lock entry per key.
#[derive(Debug, Clone)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Set of all pending merge keys.
    pub fn registry(&self) -> String {
        format!("{}:merges", self.namespace)
    }

    /// Scheduled execution time (epoch seconds) for one key.
    pub fn time(&self, key: &MergeKey) -> String {
        format!("{}:time:{}", self.namespace, key)
    }

    /// Dedup membership set for one key.
    pub fn unique(&self, key: &MergeKey) -> String {
        format!("{}:unique_msg:{}", self.namespace, key)
    }

    /// Ordered message sequence for one key.
    pub fn sequence(&self, key: &MergeKey) -> String {
        format!("{}:msg:{}", self.namespace, key)
    }

    /// Exclusive dispatch lock for one key.
    pub fn lock(&self, key: &MergeKey) -> String {
        format!("{}:lock:{}", self.namespace, key)
    }

    /// Match pattern covering every key in this namespace.
    pub fn wildcard(&self) -> String {
        format!("{}:*", self.namespace)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Shared-store client: owns the reconnecting connection and hands out
/// scoped clones per round-trip.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    keys: KeySpace,
}

impl RedisClient {
    /// Connect to `url` (e.g. "redis://127.0.0.1:6379") and scope all keys
    /// under `namespace`.
    pub async fn connect(
        url: impl AsRef<str>,
        namespace: impl Into<String>,
    ) -> Result<Self, MergerError> {
        let client = redis::Client::open(url.as_ref()).map_err(store_err)?;
        let manager = client.get_connection_manager().await.map_err(store_err)?;
        Ok(Self {
            manager,
            keys: KeySpace::new(namespace),
        })
    }

    /// Scoped connection for one operation. The manager reconnects
    /// underneath, so clones are cheap and always usable.
    pub fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }
}

pub(crate) fn store_err(e: redis::RedisError) -> MergerError {
    MergerError::Store(e.to_string())
}
