//! The relay service: the complete contract a transport layer implements
//! against
//!
//! [`TriageRelay`] pairs a workflow engine with read-only queries over its
//! checkpoint store. Run commands delegate to the engine and hand back its
//! event stream for forwarding in arrival order; history queries walk the
//! live parent chain, so a rewound thread shows only the chain its tip
//! belongs to, never the orphaned branches.

use crate::command::ClientCommand;
use crate::error::{RelayError, Result};
use chrono::{DateTime, Utc};
use mailflow_checkpoint::{CheckpointConfig, CheckpointSaver, CheckpointTuple};
use mailflow_engine::{EmailInput, ReviewDecision, WorkflowEngine, WorkflowEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// One checkpoint in a thread's history listing
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    /// Node that produced the checkpoint, `"input"` for the seed
    pub source: String,
    pub step: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_checkpoint_id: Option<String>,
}

impl CheckpointSummary {
    fn from_tuple(tuple: &CheckpointTuple) -> Self {
        Self {
            checkpoint_id: tuple.checkpoint.id.clone(),
            source: tuple.metadata.source.clone(),
            step: tuple.metadata.step,
            next: tuple.metadata.next.clone(),
            ts: tuple.checkpoint.ts,
            parent_checkpoint_id: tuple
                .parent_config
                .as_ref()
                .and_then(|c| c.checkpoint_id.clone()),
        }
    }
}

/// Engine plus read-only store queries, behind one service surface
pub struct TriageRelay {
    engine: Arc<WorkflowEngine>,
    saver: Arc<dyn CheckpointSaver>,
}

impl TriageRelay {
    pub fn new(engine: Arc<WorkflowEngine>, saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { engine, saver }
    }

    /// Route a parsed client command to the engine. The returned stream
    /// must be forwarded to observers in arrival order.
    pub fn dispatch(&self, command: ClientCommand) -> ReceiverStream<WorkflowEvent> {
        debug!(thread_id = command.thread_id(), "dispatching command");
        match command {
            ClientCommand::Start {
                thread_id,
                email_content,
                sender_email,
                email_id,
            } => self.engine.start(
                &thread_id,
                EmailInput {
                    email_content,
                    sender_email,
                    email_id,
                },
            ),
            ClientCommand::Resume {
                thread_id,
                approved,
                edited_response,
            } => self.engine.resume(
                &thread_id,
                ReviewDecision {
                    approved,
                    edited_response,
                },
            ),
            ClientCommand::Rewind {
                thread_id,
                checkpoint_id,
                new_input,
            } => self.engine.rewind(&thread_id, &checkpoint_id, new_input),
        }
    }

    /// All known thread ids, sorted
    pub async fn list_threads(&self) -> Result<Vec<String>> {
        Ok(self.saver.list_threads().await?)
    }

    /// The live history of a thread, newest first.
    ///
    /// Walks parent links back from the thread tip, so checkpoints
    /// orphaned by a rewind are excluded. They stay individually
    /// retrievable via [`TriageRelay::get_checkpoint`].
    pub async fn get_history(&self, thread_id: &str) -> Result<Vec<CheckpointSummary>> {
        let mut history = Vec::new();
        let mut cursor = self
            .saver
            .get_tuple(&CheckpointConfig::new(thread_id))
            .await?;

        while let Some(tuple) = cursor {
            history.push(CheckpointSummary::from_tuple(&tuple));
            cursor = match &tuple.parent_config {
                Some(parent) => self.saver.get_tuple(parent).await?,
                None => None,
            };
        }
        Ok(history)
    }

    /// The full snapshot of one checkpoint
    pub async fn get_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<CheckpointTuple> {
        let config = CheckpointConfig::new(thread_id).with_checkpoint_id(checkpoint_id);
        self.saver
            .get_tuple(&config)
            .await?
            .ok_or_else(|| RelayError::CheckpointNotFound {
                thread_id: thread_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            })
    }

    /// Remove a thread and all of its checkpoints. Irreversible.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        Ok(self.saver.delete_thread(thread_id).await?)
    }
}
