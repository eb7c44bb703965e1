use serde::{Deserialize, Serialize};

/// Snapshot of pending merge state, for CLIs and dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingCounts {
    /// Registered merge keys.
    pub keys: usize,
    /// Messages across all sequences (duplicates counted).
    pub messages: usize,
}
