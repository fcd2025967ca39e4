//! Core checkpoint data structures for state persistence and time travel
//!
//! This module defines the fundamental types of the checkpoint system:
//! [`Checkpoint`], [`CheckpointConfig`], [`CheckpointMetadata`],
//! [`CheckpointTuple`] and [`PendingWrite`]. A checkpoint is an immutable
//! snapshot of workflow state at one execution step; a thread owns an
//! append-only, parent-linked chain of them.
//!
//! Checkpoint ids are lexicographically sortable. Within a `(thread_id,
//! checkpoint_ns)` pair they are totally ordered, which makes id order the
//! history order and lets a backend answer "latest" with a plain
//! `ORDER BY checkpoint_id DESC LIMIT 1`.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use mailflow_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata};
//! use std::collections::HashMap;
//!
//! let config = CheckpointConfig::new("thread-123");
//! let checkpoint = Checkpoint::new(HashMap::new());
//! let metadata = CheckpointMetadata::new("input", -1);
//! let stored = saver.put(&config, checkpoint, metadata).await?;
//! assert!(stored.checkpoint_id.is_some());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a new sortable checkpoint id.
///
/// The id embeds a zero-padded microsecond timestamp, a process-monotonic
/// sequence number and a uuid suffix. Lexicographic order therefore matches
/// generation order for ids produced by a single process, and ids produced
/// after a restart still sort after older ones.
pub fn generate_id() -> CheckpointId {
    let micros = Utc::now().timestamp_micros().max(0) as u64;
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1_000_000;
    format!("{:020}-{:06}-{}", micros, seq, Uuid::new_v4().simple())
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// The node that produced this checkpoint, or `"input"` for the seed
    /// checkpoint of a thread
    pub source: String,

    /// The step number: -1 for the input checkpoint, 0 for the first node
    /// checkpoint, n for the nth afterwards
    pub step: i64,

    /// Where execution goes after this checkpoint: a node name, `"end"`,
    /// or absent when the run already terminated here.
    ///
    /// Recording the routing decision alongside the snapshot is what makes
    /// rewind-and-resume possible without re-running the decision logic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    /// Create metadata for a checkpoint produced by `source` at `step`
    pub fn new(source: impl Into<String>, step: i64) -> Self {
        Self {
            source: source.into(),
            step,
            next: None,
            extra: HashMap::new(),
        }
    }

    /// Record the successor of this checkpoint
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// The ID of the checkpoint (unique and sortable within a thread)
    pub id: CheckpointId,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// The values of the state channels at the time of the checkpoint,
    /// mapping from state-field name to its serialized value
    pub channel_values: HashMap<String, serde_json::Value>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new checkpoint with a freshly generated id
    pub fn new(channel_values: HashMap<String, serde_json::Value>) -> Self {
        Self::with_id(generate_id(), channel_values)
    }

    /// Create a checkpoint with an explicit id.
    ///
    /// The engine generates the id once per step and reuses it if the write
    /// has to be retried, so a replayed step overwrites instead of forking.
    pub fn with_id(id: CheckpointId, channel_values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values,
        }
    }

    /// Create an empty checkpoint
    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }
}

/// Run configuration: identifies a thread and optionally a specific
/// checkpoint within it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Thread ID grouping related checkpoints
    pub thread_id: String,

    /// Checkpoint namespace (empty for the root namespace)
    #[serde(default)]
    pub checkpoint_ns: String,

    /// Specific checkpoint to target; when absent, operations target the
    /// latest checkpoint in the thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}

impl CheckpointConfig {
    /// Create a configuration targeting the latest checkpoint of a thread
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: String::new(),
            checkpoint_id: None,
        }
    }

    /// Target a specific checkpoint
    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    /// Set the checkpoint namespace
    pub fn with_namespace(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = checkpoint_ns.into();
        self
    }
}

/// A buffered write produced by a node execution that has not yet been
/// folded into a finalized checkpoint.
///
/// Writes are replayed in `(task_id, idx)` order; re-submitting the same
/// `(checkpoint, task, idx)` overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingWrite {
    /// Task that produced the write, conventionally `"{checkpoint_id}:{node}"`
    pub task_id: String,

    /// Ordinal position of the write within its task
    pub idx: i64,

    /// State-field name being written
    pub channel: String,

    /// The written value
    pub value: serde_json::Value,
}

/// A checkpoint together with its metadata, resolved parent and pending
/// writes
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// Configuration pointing at this checkpoint
    pub config: CheckpointConfig,

    /// The checkpoint itself
    pub checkpoint: Checkpoint,

    /// Metadata associated with the checkpoint
    pub metadata: CheckpointMetadata,

    /// Parent configuration (absent for the initial checkpoint)
    pub parent_config: Option<CheckpointConfig>,

    /// Buffered writes recorded against this checkpoint, in replay order
    pub pending_writes: Vec<PendingWrite>,
}

impl CheckpointTuple {
    /// Create a tuple with no parent and no pending writes
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
            pending_writes: Vec::new(),
        }
    }

    /// Set the parent configuration
    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::empty();
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert!(checkpoint.channel_values.is_empty());
        assert!(!checkpoint.id.is_empty());
    }

    #[test]
    fn test_generated_ids_sort_in_generation_order() {
        let ids: Vec<_> = (0..64).map(|_| generate_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_checkpoint_metadata() {
        let metadata = CheckpointMetadata::new("classifyIntent", 2)
            .with_next("humanReview")
            .with_extra("interrupted", serde_json::json!(true));

        assert_eq!(metadata.source, "classifyIntent");
        assert_eq!(metadata.step, 2);
        assert_eq!(metadata.next.as_deref(), Some("humanReview"));
        assert_eq!(
            metadata.extra.get("interrupted"),
            Some(&serde_json::json!(true))
        );
    }

    #[test]
    fn test_checkpoint_config() {
        let config = CheckpointConfig::new("thread-1").with_checkpoint_id("cp-1");
        assert_eq!(config.thread_id, "thread-1");
        assert_eq!(config.checkpoint_ns, "");
        assert_eq!(config.checkpoint_id.as_deref(), Some("cp-1"));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = CheckpointMetadata::new("input", -1).with_next("readEmail");
        let json = serde_json::to_string(&metadata).unwrap();
        let back: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, "input");
        assert_eq!(back.step, -1);
        assert_eq!(back.next.as_deref(), Some("readEmail"));
    }
}
