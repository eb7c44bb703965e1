//! Failure reporting on the tracing stack.

use crate::domain::{ExecutionOutcome, MergeKey};
use crate::ports::ExecutionObserver;

/// Emits one structured error event per settled failure; success is
/// silent.
///
/// Tracing macros do not panic, so this observer can never feed an error
/// back into the scheduler.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl ExecutionObserver for LoggingObserver {
    fn on_settled(&self, key: &MergeKey, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Success => {}
            ExecutionOutcome::TimedOut => {
                tracing::error!(merge_key = %key, "Execution timed out");
            }
            ExecutionOutcome::Failed(description) => {
                tracing::error!(merge_key = %key, error = %description, "Execution failed with error");
            }
        }
    }
}
