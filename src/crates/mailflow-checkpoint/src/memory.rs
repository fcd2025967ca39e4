//! In-memory checkpoint storage for development and testing
//!
//! [`InMemorySaver`] is the reference implementation of the
//! [`CheckpointSaver`] trait. It keeps every thread's checkpoints in a
//! thread-safe map and implements the same upsert semantics as the durable
//! backends, so engine tests exercise the real idempotence contract without
//! a database. Data does not survive a restart; production deployments use
//! [`SqliteSaver`](crate::sqlite::SqliteSaver).

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple, PendingWrite},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream, ListOptions},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    parent_id: Option<String>,
    writes: Vec<PendingWrite>,
}

/// Keyed by (thread_id, checkpoint_ns), values in insertion order.
type Storage = Arc<RwLock<HashMap<(String, String), Vec<CheckpointEntry>>>>;

/// In-memory checkpoint saver
#[derive(Debug, Clone, Default)]
pub struct InMemorySaver {
    storage: Storage,
}

impl InMemorySaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct (thread, namespace) histories being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Drop everything (test isolation)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }

    fn entry_to_tuple(
        config: &CheckpointConfig,
        entry: &CheckpointEntry,
        pending_writes: Vec<PendingWrite>,
    ) -> CheckpointTuple {
        CheckpointTuple {
            config: CheckpointConfig {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: Some(entry.checkpoint.id.clone()),
            },
            checkpoint: entry.checkpoint.clone(),
            metadata: entry.metadata.clone(),
            parent_config: entry.parent_id.as_ref().map(|id| CheckpointConfig {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: Some(id.clone()),
            }),
            pending_writes,
        }
    }

    fn sorted_writes(entry: &CheckpointEntry) -> Vec<PendingWrite> {
        let mut writes = entry.writes.clone();
        writes.sort_by(|a, b| (&a.task_id, a.idx).cmp(&(&b.task_id, b.idx)));
        writes
    }

    fn key(config: &CheckpointConfig) -> (String, String) {
        (config.thread_id.clone(), config.checkpoint_ns.clone())
    }
}

#[async_trait]
impl CheckpointSaver for InMemorySaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let storage = self.storage.read().await;

        let Some(entries) = storage.get(&Self::key(config)) else {
            return Ok(None);
        };

        let entry = match &config.checkpoint_id {
            Some(checkpoint_id) => entries.iter().find(|e| &e.checkpoint.id == checkpoint_id),
            None => entries.iter().max_by(|a, b| a.checkpoint.id.cmp(&b.checkpoint.id)),
        };

        Ok(entry.map(|e| Self::entry_to_tuple(config, e, Self::sorted_writes(e))))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: &ListOptions,
    ) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;

        let mut entries: Vec<CheckpointEntry> = storage
            .get(&Self::key(config))
            .map(|e| e.to_vec())
            .unwrap_or_default();
        entries.sort_by(|a, b| b.checkpoint.id.cmp(&a.checkpoint.id));

        let mut results = Vec::new();
        for entry in &entries {
            if let Some(before) = &options.before {
                if entry.checkpoint.id >= *before {
                    continue;
                }
            }
            // listed tuples omit pending writes, matching every backend
            results.push(Ok(Self::entry_to_tuple(config, entry, Vec::new())));
            if let Some(limit) = options.limit {
                if results.len() >= limit {
                    break;
                }
            }
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(Self::key(config)).or_default();

        let stored_config = CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id.clone()),
        };

        let entry = CheckpointEntry {
            parent_id: config.checkpoint_id.clone(),
            checkpoint,
            metadata,
            writes: Vec::new(),
        };

        // Re-applying the same checkpoint id replaces in place; the chain
        // length must not change on replay.
        match entries
            .iter_mut()
            .find(|e| e.checkpoint.id == entry.checkpoint.id)
        {
            Some(existing) => {
                let writes = std::mem::take(&mut existing.writes);
                *existing = CheckpointEntry { writes, ..entry };
            }
            None => entries.push(entry),
        }

        Ok(stored_config)
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: &str,
    ) -> Result<()> {
        let checkpoint_id = config
            .checkpoint_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("checkpoint_id is required for put_writes".into()))?;

        let mut storage = self.storage.write().await;

        let entry = storage
            .get_mut(&Self::key(config))
            .and_then(|entries| entries.iter_mut().find(|e| &e.checkpoint.id == checkpoint_id))
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.clone()))?;

        for (idx, (channel, value)) in writes.into_iter().enumerate() {
            let write = PendingWrite {
                task_id: task_id.to_string(),
                idx: idx as i64,
                channel,
                value,
            };
            match entry
                .writes
                .iter_mut()
                .find(|w| w.task_id == task_id && w.idx == write.idx)
            {
                Some(existing) => *existing = write,
                None => entry.writes.push(write),
            }
        }

        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.retain(|(tid, _), _| tid != thread_id);
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut threads: Vec<String> = storage.keys().map(|(tid, _)| tid.clone()).collect();
        threads.sort();
        threads.dedup();
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashMap as Map;

    fn snapshot(field: &str, value: &str) -> Map<String, serde_json::Value> {
        let mut values = Map::new();
        values.insert(field.to_string(), serde_json::json!(value));
        values
    }

    #[tokio::test]
    async fn test_save_and_load_checkpoint() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::new("thread-1");
        let checkpoint = Checkpoint::new(snapshot("emailContent", "hello"));
        let id = checkpoint.id.clone();

        let stored = saver
            .put(&config, checkpoint, CheckpointMetadata::new("input", -1))
            .await
            .unwrap();
        assert_eq!(stored.checkpoint_id.as_ref(), Some(&id));

        let tuple = saver.get_tuple(&stored).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.id, id);
        assert_eq!(tuple.metadata.step, -1);
        assert!(tuple.parent_config.is_none());
    }

    #[tokio::test]
    async fn test_latest_lookup_without_checkpoint_id() {
        let saver = InMemorySaver::new();
        let mut config = CheckpointConfig::new("thread-1");

        let mut last_id = String::new();
        for step in 0..3 {
            let checkpoint = Checkpoint::empty();
            last_id = checkpoint.id.clone();
            config = saver
                .put(&config, checkpoint, CheckpointMetadata::new("node", step))
                .await
                .unwrap();
        }

        let latest = saver
            .get_tuple(&CheckpointConfig::new("thread-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.checkpoint.id, last_id);
        assert_eq!(latest.metadata.step, 2);
    }

    #[tokio::test]
    async fn test_missing_thread_is_absent_not_error() {
        let saver = InMemorySaver::new();
        let found = saver
            .get_tuple(&CheckpointConfig::new("no-such-thread"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_parent_chain() {
        let saver = InMemorySaver::new();
        let mut config = CheckpointConfig::new("thread-1");
        let mut ids = Vec::new();

        for step in 0..4 {
            let checkpoint = Checkpoint::empty();
            ids.push(checkpoint.id.clone());
            config = saver
                .put(&config, checkpoint, CheckpointMetadata::new("node", step))
                .await
                .unwrap();
        }

        let tuples: Vec<CheckpointTuple> = saver
            .list(&CheckpointConfig::new("thread-1"), &ListOptions::new())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        // Strictly decreasing id order, parent links back one step.
        assert_eq!(tuples.len(), 4);
        for pair in tuples.windows(2) {
            assert!(pair[0].checkpoint.id > pair[1].checkpoint.id);
            assert_eq!(
                pair[0].parent_config.as_ref().unwrap().checkpoint_id,
                Some(pair[1].checkpoint.id.clone())
            );
        }
        assert!(tuples.last().unwrap().parent_config.is_none());
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let saver = InMemorySaver::new();
        let mut config = CheckpointConfig::new("thread-1");
        let mut ids = Vec::new();

        for step in 0..5 {
            let checkpoint = Checkpoint::empty();
            ids.push(checkpoint.id.clone());
            config = saver
                .put(&config, checkpoint, CheckpointMetadata::new("node", step))
                .await
                .unwrap();
        }

        let page: Vec<_> = saver
            .list(
                &CheckpointConfig::new("thread-1"),
                &ListOptions::new().before(ids[3].clone()).limit(2),
            )
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].checkpoint.id, ids[2]);
        assert_eq!(page[1].checkpoint.id, ids[1]);
    }

    #[tokio::test]
    async fn test_put_is_idempotent_for_same_id() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::new("thread-1");
        let checkpoint = Checkpoint::new(snapshot("emailContent", "hi"));

        saver
            .put(&config, checkpoint.clone(), CheckpointMetadata::new("input", -1))
            .await
            .unwrap();
        saver
            .put(&config, checkpoint, CheckpointMetadata::new("input", -1))
            .await
            .unwrap();

        assert_eq!(saver.checkpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_put_writes_overwrites_same_index() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::new("thread-1");
        let stored = saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new("input", -1))
            .await
            .unwrap();

        saver
            .put_writes(
                &stored,
                vec![("thinking".into(), serde_json::json!("first"))],
                "task-1",
            )
            .await
            .unwrap();
        saver
            .put_writes(
                &stored,
                vec![("thinking".into(), serde_json::json!("second"))],
                "task-1",
            )
            .await
            .unwrap();

        let tuple = saver.get_tuple(&stored).await.unwrap().unwrap();
        assert_eq!(tuple.pending_writes.len(), 1);
        assert_eq!(tuple.pending_writes[0].value, serde_json::json!("second"));
    }

    #[tokio::test]
    async fn test_list_omits_pending_writes() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::new("thread-1");
        let stored = saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new("input", -1))
            .await
            .unwrap();
        saver
            .put_writes(
                &stored,
                vec![("thinking".into(), serde_json::json!("buffered"))],
                "task-1",
            )
            .await
            .unwrap();

        // writes surface on a targeted fetch, never in history listings
        let tuple = saver.get_tuple(&stored).await.unwrap().unwrap();
        assert_eq!(tuple.pending_writes.len(), 1);

        let listed: Vec<CheckpointTuple> = saver
            .list(&CheckpointConfig::new("thread-1"), &ListOptions::new())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(listed.len(), 1);
        assert!(listed[0].pending_writes.is_empty());
    }

    #[tokio::test]
    async fn test_delete_thread_cascades() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::new("thread-1");
        let stored = saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new("input", -1))
            .await
            .unwrap();
        saver
            .put_writes(&stored, vec![("x".into(), serde_json::json!(1))], "t")
            .await
            .unwrap();

        saver.delete_thread("thread-1").await.unwrap();

        assert_eq!(saver.thread_count().await, 0);
        assert!(saver.get_tuple(&stored).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_threads() {
        let saver = InMemorySaver::new();
        for thread in ["b-thread", "a-thread"] {
            saver
                .put(
                    &CheckpointConfig::new(thread),
                    Checkpoint::empty(),
                    CheckpointMetadata::new("input", -1),
                )
                .await
                .unwrap();
        }

        let threads = saver.list_threads().await.unwrap();
        assert_eq!(threads, vec!["a-thread".to_string(), "b-thread".to_string()]);
    }
}
