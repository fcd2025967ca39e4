//! Error types for workflow execution
//!
//! Node-level errors terminate a run and surface as a single terminal
//! error event; store-level errors propagate uncaught.

use crate::inference::InferenceError;
use mailflow_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during workflow execution
#[derive(Error, Debug)]
pub enum EngineError {
    /// Checkpoint store failure
    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Inference service failure
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Resume was called with no suspended run to resume
    #[error("No suspended run to resume for thread: {0}")]
    InvalidResume(String),

    /// Rewind targeted a checkpoint that does not exist
    #[error("Checkpoint not found: {checkpoint_id} in thread {thread_id}")]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    /// Workflow state could not be serialized to or restored from a
    /// checkpoint
    #[error("State serialization error: {0}")]
    State(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether retrying the failed operation could reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Inference(e) if e.is_transient())
    }
}
