//! Extensible checkpoint storage trait for backend implementations
//!
//! [`CheckpointSaver`] is the core abstraction for checkpoint persistence.
//! Implementations provide:
//!
//! - `put()` - durably upsert a checkpoint with its metadata
//! - `get_tuple()` - retrieve a specific or the latest checkpoint
//! - `list()` - stream history, newest first, with pagination
//! - `put_writes()` - buffer node output before its checkpoint commits
//! - `delete_thread()` - cascade-delete a thread
//! - `list_threads()` - enumerate known threads
//!
//! Every write is keyed by a caller-supplied, deterministic identifier, so
//! re-running a step after a transient failure produces an overwrite rather
//! than a duplicate history entry. This is the cornerstone of safe
//! resumability: the engine may safely re-submit an already-written
//! checkpoint after a crash.
//!
//! Implementations must be `Send + Sync`; each `thread_id` holds an
//! independent checkpoint history, and the engine serializes execution per
//! thread, so backends only need row-level atomicity.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Type alias for a finite async stream of checkpoint tuples
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Options for [`CheckpointSaver::list`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Exclusive upper bound on checkpoint id, for pagination
    pub before: Option<String>,

    /// Maximum number of tuples to yield
    pub limit: Option<usize>,
}

impl ListOptions {
    /// List everything, newest first
    pub fn new() -> Self {
        Self::default()
    }

    /// Only yield checkpoints with an id strictly below `before`
    pub fn before(mut self, before: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self
    }

    /// Cap the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Core trait for checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Retrieve a checkpoint tuple.
    ///
    /// Targets `config.checkpoint_id` when present, otherwise the latest
    /// checkpoint of the thread (highest id). Returns `Ok(None)` rather
    /// than an error when the thread or checkpoint does not exist. The
    /// tuple carries the checkpoint's pending writes in replay order and a
    /// resolved parent config when the checkpoint has a parent.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Stream checkpoints for a thread, newest first by id.
    ///
    /// The stream is finite and non-restartable. `options.before` is an
    /// exclusive upper bound used for pagination. Listed tuples carry an
    /// empty `pending_writes`; callers that need the buffered writes of a
    /// checkpoint fetch it with [`get_tuple`](Self::get_tuple).
    async fn list(&self, config: &CheckpointConfig, options: &ListOptions)
        -> Result<CheckpointStream>;

    /// Durably store a checkpoint.
    ///
    /// The stored parent id is `config.checkpoint_id` at call time (absent
    /// when starting fresh). Re-applying an identical checkpoint id is an
    /// overwrite, not a duplicate. Returns a config pointing at the stored
    /// checkpoint.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Buffer writes from a node execution that has run but whose
    /// checkpoint has not been committed yet.
    ///
    /// `config.checkpoint_id` must identify the checkpoint the task ran
    /// against. Writes are stored at their vector position as `idx`;
    /// re-submitting the same `(checkpoint, task, idx)` overwrites.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: &str,
    ) -> Result<()>;

    /// Delete every checkpoint and pending write for a thread. Irreversible.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Enumerate all thread ids with at least one checkpoint, sorted.
    async fn list_threads(&self) -> Result<Vec<String>>;
}
