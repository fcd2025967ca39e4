//! SQLite-backed checkpoint storage
//!
//! [`SqliteSaver`] is the durable [`CheckpointSaver`] backend. State
//! survives process restarts, which is what makes long-lived interrupts and
//! time travel possible in production.
//!
//! ## Schema
//!
//! Two tables, created on connect:
//!
//! - `checkpoints(thread_id, checkpoint_ns, checkpoint_id,
//!   parent_checkpoint_id, checkpoint, metadata, created_at)` with primary
//!   key `(thread_id, checkpoint_ns, checkpoint_id)`, also the index
//!   behind "all checkpoints for thread, newest first".
//! - `checkpoint_writes(thread_id, checkpoint_ns, checkpoint_id, task_id,
//!   idx, channel, value)` with primary key extended by `(task_id, idx)`,
//!   the index behind "all pending writes for a checkpoint, in order".
//!
//! Both tables upsert on conflict, so replaying a write after a crash
//! overwrites instead of duplicating. Checkpoint payloads and metadata are
//! stored as JSON text.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple, PendingWrite},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream, ListOptions},
};
use async_trait::async_trait;
use futures::stream;
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id            TEXT NOT NULL,
    checkpoint_ns        TEXT NOT NULL DEFAULT '',
    checkpoint_id        TEXT NOT NULL,
    parent_checkpoint_id TEXT,
    checkpoint           TEXT NOT NULL,
    metadata             TEXT NOT NULL,
    created_at           TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id)
);
CREATE TABLE IF NOT EXISTS checkpoint_writes (
    thread_id     TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    checkpoint_id TEXT NOT NULL,
    task_id       TEXT NOT NULL,
    idx           INTEGER NOT NULL,
    channel       TEXT NOT NULL,
    value         TEXT NOT NULL,
    PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id, task_id, idx)
);
"#;

/// SQLite-backed checkpoint saver
#[derive(Debug, Clone)]
pub struct SqliteSaver {
    pool: SqlitePool,
}

impl SqliteSaver {
    /// Open (creating if missing) the database at `url` and ensure the
    /// schema exists.
    ///
    /// `url` follows sqlx conventions, e.g. `sqlite://mailflow.db` or
    /// `sqlite::memory:` for tests.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CheckpointError::Storage(format!("invalid database url: {e}")))?
            .create_if_missing(true);

        // A single long-lived connection: writes are serialized by the
        // engine's per-thread lock anyway, and `sqlite::memory:` databases
        // are per-connection, so the pool must never rotate.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!(url, "sqlite checkpoint store ready");

        Ok(Self { pool })
    }

    /// Wrap an existing pool; assumes the schema is already in place.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_writes(
        &self,
        config: &CheckpointConfig,
        checkpoint_id: &str,
    ) -> Result<Vec<PendingWrite>> {
        let rows = sqlx::query(
            "SELECT task_id, idx, channel, value FROM checkpoint_writes
             WHERE thread_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?
             ORDER BY task_id, idx",
        )
        .bind(&config.thread_id)
        .bind(&config.checkpoint_ns)
        .bind(checkpoint_id)
        .fetch_all(&self.pool)
        .await?;

        let mut writes = Vec::with_capacity(rows.len());
        for row in rows {
            let value: String = row.try_get("value")?;
            writes.push(PendingWrite {
                task_id: row.try_get("task_id")?,
                idx: row.try_get("idx")?,
                channel: row.try_get("channel")?,
                value: serde_json::from_str(&value)?,
            });
        }
        Ok(writes)
    }

    fn row_to_tuple(
        config: &CheckpointConfig,
        row: &sqlx::sqlite::SqliteRow,
        pending_writes: Vec<PendingWrite>,
    ) -> Result<CheckpointTuple> {
        let checkpoint_json: String = row.try_get("checkpoint")?;
        let metadata_json: String = row.try_get("metadata")?;
        let checkpoint: Checkpoint = serde_json::from_str(&checkpoint_json)?;
        let metadata: CheckpointMetadata = serde_json::from_str(&metadata_json)?;
        let parent_id: Option<String> = row.try_get("parent_checkpoint_id")?;

        Ok(CheckpointTuple {
            config: CheckpointConfig {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: Some(checkpoint.id.clone()),
            },
            checkpoint,
            metadata,
            parent_config: parent_id.map(|id| CheckpointConfig {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: Some(id),
            }),
            pending_writes,
        })
    }
}

#[async_trait]
impl CheckpointSaver for SqliteSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let row = if let Some(checkpoint_id) = &config.checkpoint_id {
            sqlx::query(
                "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata
                 FROM checkpoints
                 WHERE thread_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?",
            )
            .bind(&config.thread_id)
            .bind(&config.checkpoint_ns)
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata
                 FROM checkpoints
                 WHERE thread_id = ? AND checkpoint_ns = ?
                 ORDER BY checkpoint_id DESC LIMIT 1",
            )
            .bind(&config.thread_id)
            .bind(&config.checkpoint_ns)
            .fetch_optional(&self.pool)
            .await?
        };

        let Some(row) = row else {
            return Ok(None);
        };

        let checkpoint_id: String = row.try_get("checkpoint_id")?;
        let writes = self.load_writes(config, &checkpoint_id).await?;
        Ok(Some(Self::row_to_tuple(config, &row, writes)?))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: &ListOptions,
    ) -> Result<CheckpointStream> {
        let mut sql = String::from(
            "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata
             FROM checkpoints
             WHERE thread_id = ? AND checkpoint_ns = ?",
        );
        if options.before.is_some() {
            sql.push_str(" AND checkpoint_id < ?");
        }
        sql.push_str(" ORDER BY checkpoint_id DESC");
        if options.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql)
            .bind(&config.thread_id)
            .bind(&config.checkpoint_ns);
        if let Some(before) = &options.before {
            query = query.bind(before);
        }
        if let Some(limit) = options.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(Self::row_to_tuple(config, row, Vec::new()));
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let checkpoint_json = serde_json::to_string(&checkpoint)?;
        let metadata_json = serde_json::to_string(&metadata)?;

        sqlx::query(
            "INSERT INTO checkpoints
               (thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id, checkpoint, metadata)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id) DO UPDATE SET
               parent_checkpoint_id = excluded.parent_checkpoint_id,
               checkpoint = excluded.checkpoint,
               metadata = excluded.metadata",
        )
        .bind(&config.thread_id)
        .bind(&config.checkpoint_ns)
        .bind(&checkpoint.id)
        .bind(config.checkpoint_id.as_deref())
        .bind(&checkpoint_json)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id),
        })
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

        let mut tx = self.pool.begin().await?;
        for (idx, (channel, value)) in writes.into_iter().enumerate() {
            let value_json = serde_json::to_string(&value)?;
            sqlx::query(
                "INSERT INTO checkpoint_writes
                   (thread_id, checkpoint_ns, checkpoint_id, task_id, idx, channel, value)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id, task_id, idx) DO UPDATE SET
                   channel = excluded.channel,
                   value = excluded.value",
            )
            .bind(&config.thread_id)
            .bind(&config.checkpoint_ns)
            .bind(checkpoint_id)
            .bind(task_id)
            .bind(idx as i64)
            .bind(&channel)
            .bind(&value_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkpoint_writes WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await?;

        let mut threads = Vec::with_capacity(rows.len());
        for row in rows {
            threads.push(row.try_get("thread_id")?);
        }
        Ok(threads)
    }
}
