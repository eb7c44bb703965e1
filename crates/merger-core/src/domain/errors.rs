use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergerError {
    /// Backing store round-trip failed (connectivity, command error).
    #[error("store error: {0}")]
    Store(String),

    /// A batch handler reported a failure.
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("{0}")]
    Other(String),
}
