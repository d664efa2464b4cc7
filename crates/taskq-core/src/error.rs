use thiserror::Error;

use crate::codec::CodecError;
use crate::ports::StoreError;

/// Errors surfaced by the queue engine.
///
/// Only genuine backend/storage faults end up here. An empty queue, a lost
/// lease race and exhausted retries are normal outcomes, not errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Encoding a task for storage failed. Decoding failures are not
    /// propagated; a corrupt record reads as absent.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl QueueError {
    /// Transient backend failure; the caller may retry the whole operation.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, QueueError::Store(StoreError::Unavailable(_)))
    }
}

/// Errors from the worker-side runtime (handler lookup and execution).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("handler not found for task_type={0}")]
    HandlerNotFound(String),

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(String),

    #[error("{0}")]
    Failed(String),
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutionError::Failed(message.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
