//! ExecutionObserver port - settled-outcome reporting.

use crate::domain::{ExecutionOutcome, MergeKey};

/// Receives the outcome of each batch execution, exactly once per settled
/// task, after the task settles.
///
/// Implementations must not panic: nothing reported here may feed back
/// into the scheduler's control flow.
pub trait ExecutionObserver: Send + Sync {
    fn on_settled(&self, key: &MergeKey, outcome: &ExecutionOutcome);
}

/// Observer that ignores everything, for hosts that bring their own
/// reporting.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {
    fn on_settled(&self, _key: &MergeKey, _outcome: &ExecutionOutcome) {}
}
