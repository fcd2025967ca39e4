//! # mailflow-checkpoint - State Persistence for Workflow Execution
//!
//! Trait-based checkpoint abstractions and implementations for persisting
//! and restoring workflow execution state. Checkpoints are snapshots of the
//! triage state captured after each node, forming an append-only,
//! parent-linked chain per thread. They enable:
//!
//! - **Durable execution** - resume after a process restart
//! - **Human-in-the-loop** - pause indefinitely while a decision is pending
//! - **Time travel** - replay from any historical checkpoint, extending a
//!   new chain from it without mutating old history
//! - **Crash-safe steps** - pending writes buffer node output before the
//!   successor checkpoint commits
//!
//! ## Core concepts
//!
//! The [`CheckpointSaver`] trait defines the persistence contract:
//! `put` / `get_tuple` / `list` / `put_writes` / `delete_thread` /
//! `list_threads`. Two backends are provided: [`InMemorySaver`] for
//! development and tests, and [`SqliteSaver`] for durable storage.
//!
//! Every write is keyed by a deterministic checkpoint id supplied by the
//! caller, so crash replays overwrite rather than branch.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mailflow_checkpoint::{
//!     CheckpointSaver, CheckpointConfig, Checkpoint, CheckpointMetadata, InMemorySaver,
//! };
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemorySaver::new();
//!
//!     let config = CheckpointConfig::new("thread-123");
//!     let checkpoint = Checkpoint::new(HashMap::new());
//!     let metadata = CheckpointMetadata::new("input", -1);
//!
//!     let stored = saver.put(&config, checkpoint, metadata).await?;
//!     let tuple = saver.get_tuple(&stored).await?;
//!     println!("stored checkpoint: {:?}", tuple.map(|t| t.checkpoint.id));
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    generate_id, Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointTuple,
    PendingWrite,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemorySaver;
pub use sqlite::SqliteSaver;
pub use traits::{CheckpointSaver, CheckpointStream, ListOptions};
