//! Relay-level errors: everything a client can get wrong, plus
//! passthrough for store failures

use mailflow_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors surfaced at the relay boundary
#[derive(Error, Debug)]
pub enum RelayError {
    /// The command envelope carried a tag the relay does not know.
    /// Unknown commands are explicit errors, never silent no-ops.
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// The command tag was recognized but the payload did not parse
    #[error("Invalid command payload: {0}")]
    InvalidCommand(String),

    /// Durable persistence was requested but is not configured
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// A history query targeted a checkpoint that does not exist
    #[error("Checkpoint not found: {checkpoint_id} in thread {thread_id}")]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    /// Checkpoint store failure
    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),
}
