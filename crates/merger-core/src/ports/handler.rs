//! BatchHandler port - the host's batch execution callback.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{MergeKey, MergerError};

/// Executes one batch: every message accumulated under `key`, in arrival
/// order. The return value classifies the execution as success or failure;
/// the scheduler adds the timeout dimension on top.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, key: &MergeKey, batch: Vec<Value>) -> Result<(), MergerError>;
}
