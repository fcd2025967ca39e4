//! The workflow engine: durable, resumable graph execution
//!
//! The engine drives the triage graph node by node over a shared
//! [`TriageState`], checkpointing after every step. The step discipline
//! is fixed:
//!
//! 1. execute the node (with retry where configured)
//! 2. buffer its update as pending writes against the current checkpoint
//! 3. merge the update into the state
//! 4. durably write the successor checkpoint (parent = current)
//! 5. only then emit the event - checkpoint-then-notify, never the reverse
//!
//! Execution is strictly serialized per thread: one async mutex per
//! `thread_id`, held for the whole driven run. Concurrent start/resume/
//! rewind calls on the same thread queue behind it; distinct threads run
//! independently.

use crate::error::{EngineError, Result};
use crate::event::WorkflowEvent;
use crate::inference::InferenceService;
use crate::interrupt::{ReviewDecision, INTERRUPT_CHANNEL};
use crate::node::{Command, Goto, Node};
use crate::nodes::{NodeOutcome, TriageNodes};
use crate::retry::RetryPolicy;
use crate::state::{StateUpdate, TriageState};
use chrono::Utc;
use mailflow_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bound on in-flight events per run; the driver awaits a slow consumer
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// The incoming email that seeds a new triage run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailInput {
    pub email_content: String,
    pub sender_email: String,

    /// Assigned by the engine when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
}

/// Durable workflow engine over a checkpoint store and an inference
/// service
pub struct WorkflowEngine {
    saver: Arc<dyn CheckpointSaver>,
    nodes: TriageNodes,
    retry: RetryPolicy,
    locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(saver: Arc<dyn CheckpointSaver>, inference: Arc<dyn InferenceService>) -> Self {
        Self {
            saver,
            nodes: TriageNodes::new(inference),
            retry: RetryPolicy::default(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Override the retry policy applied to externally-flaky nodes
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Start a fresh triage run on a thread. Seeds an input checkpoint
    /// (source `"input"`, step -1) and drives the graph from `readEmail`.
    pub fn start(&self, thread_id: &str, input: EmailInput) -> ReceiverStream<WorkflowEvent> {
        self.spawn_run(thread_id, RunMode::Start(input))
    }

    /// Resume a run suspended for human review. Fails with a user-visible
    /// error event when the thread has no pending interrupt.
    pub fn resume(
        &self,
        thread_id: &str,
        decision: ReviewDecision,
    ) -> ReceiverStream<WorkflowEvent> {
        self.spawn_run(thread_id, RunMode::Resume(decision))
    }

    /// Re-run from a historical checkpoint, extending a new chain rooted
    /// at it. Old checkpoints are never deleted or replayed.
    pub fn rewind(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        new_input: Option<StateUpdate>,
    ) -> ReceiverStream<WorkflowEvent> {
        self.spawn_run(
            thread_id,
            RunMode::Rewind {
                checkpoint_id: checkpoint_id.to_string(),
                new_input,
            },
        )
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop entries no run holds anymore, so the map tracks active
        // threads rather than every thread ever seen
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(thread_id.to_string()).or_default().clone()
    }

    fn spawn_run(&self, thread_id: &str, mode: RunMode) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let driver = Driver {
            saver: self.saver.clone(),
            nodes: self.nodes.clone(),
            retry: self.retry.clone(),
            thread_id: thread_id.to_string(),
        };
        let lock = self.thread_lock(thread_id);

        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            if let Err(err) = driver.run(mode, &tx).await {
                error!(thread_id = %driver.thread_id, error = %err, "workflow run failed");
                let _ = tx
                    .send(WorkflowEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        });

        ReceiverStream::new(rx)
    }
}

enum RunMode {
    Start(EmailInput),
    Resume(ReviewDecision),
    Rewind {
        checkpoint_id: String,
        new_input: Option<StateUpdate>,
    },
}

/// One driven run: owns clones of the engine internals so the spawned
/// task is self-contained
struct Driver {
    saver: Arc<dyn CheckpointSaver>,
    nodes: TriageNodes,
    retry: RetryPolicy,
    thread_id: String,
}

impl Driver {
    async fn run(&self, mode: RunMode, tx: &mpsc::Sender<WorkflowEvent>) -> Result<()> {
        match mode {
            RunMode::Start(input) => self.run_start(input, tx).await,
            RunMode::Resume(decision) => self.run_resume(decision, tx).await,
            RunMode::Rewind {
                checkpoint_id,
                new_input,
            } => self.run_rewind(checkpoint_id, new_input, tx).await,
        }
    }

    async fn run_start(&self, input: EmailInput, tx: &mpsc::Sender<WorkflowEvent>) -> Result<()> {
        let state = TriageState {
            email_content: input.email_content,
            sender_email: input.sender_email,
            email_id: input
                .email_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ..Default::default()
        };
        info!(thread_id = %self.thread_id, email_id = %state.email_id, "starting triage run");

        let config = CheckpointConfig::new(&self.thread_id);
        let seed = Checkpoint::new(state.to_channel_values());
        let metadata = CheckpointMetadata::new("input", -1).with_next(Node::ReadEmail.as_str());
        let config = self.saver.put(&config, seed, metadata).await?;

        self.drive(config, state, Node::ReadEmail, 0, tx).await
    }

    async fn run_resume(
        &self,
        decision: ReviewDecision,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        let latest = self
            .saver
            .get_tuple(&CheckpointConfig::new(&self.thread_id))
            .await?;
        let tuple = latest.ok_or_else(|| EngineError::InvalidResume(self.thread_id.clone()))?;
        if !tuple
            .checkpoint
            .channel_values
            .contains_key(INTERRUPT_CHANNEL)
        {
            return Err(EngineError::InvalidResume(self.thread_id.clone()));
        }

        info!(
            thread_id = %self.thread_id,
            checkpoint_id = %tuple.checkpoint.id,
            approved = decision.approved,
            "resuming after human review"
        );

        // The suspend phase already ran before the interrupt was recorded;
        // only the resume phase executes here. The successor checkpoint is
        // built from the restored state, which clears the marker channel.
        let mut state = TriageState::from_channel_values(&tuple.checkpoint.channel_values)?;
        let step = tuple.metadata.step + 1;
        let command = self.nodes.human_review_resume(&state, &decision);

        let (config, goto) = self
            .commit_step(&tuple.config, &mut state, Node::HumanReview, command, step, tx)
            .await?;

        match goto {
            Goto::Node(next) => self.drive(config, state, next, step + 1, tx).await,
            Goto::End => self.complete(&config, tx).await,
        }
    }

    async fn run_rewind(
        &self,
        checkpoint_id: String,
        new_input: Option<StateUpdate>,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        let config = CheckpointConfig::new(&self.thread_id).with_checkpoint_id(&checkpoint_id);
        let tuple = self.saver.get_tuple(&config).await?.ok_or_else(|| {
            EngineError::CheckpointNotFound {
                thread_id: self.thread_id.clone(),
                checkpoint_id: checkpoint_id.clone(),
            }
        })?;

        info!(
            thread_id = %self.thread_id,
            checkpoint_id = %checkpoint_id,
            "rewinding to historical checkpoint"
        );

        let mut state = TriageState::from_channel_values(&tuple.checkpoint.channel_values)?;
        if let Some(update) = &new_input {
            state.apply(update);
        }

        // The recorded routing decision tells us where execution was headed;
        // re-running from here extends a new chain whose first checkpoint is
        // parented on the historical one.
        let step = tuple.metadata.step + 1;
        match tuple.metadata.next.as_deref().and_then(Goto::parse) {
            Some(Goto::Node(node)) => self.drive(tuple.config, state, node, step, tx).await,
            _ => {
                // Terminal checkpoint: nothing left to re-run
                self.complete(&tuple.config, tx).await
            }
        }
    }

    /// The main step loop: execute, buffer, merge, checkpoint, notify
    async fn drive(
        &self,
        mut config: CheckpointConfig,
        mut state: TriageState,
        mut node: Node,
        mut step: i64,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        loop {
            match self.execute_with_retry(node, &state).await? {
                NodeOutcome::Suspend(payload) => {
                    // Durable interrupt: snapshot the state with the review
                    // payload in the reserved channel, so a resume after a
                    // restart finds everything it needs in the store.
                    let mut channels = state.to_channel_values();
                    channels.insert(
                        INTERRUPT_CHANNEL.to_string(),
                        serde_json::to_value(&payload)?,
                    );
                    let checkpoint = Checkpoint::new(channels);
                    let metadata = CheckpointMetadata::new(node.as_str(), step)
                        .with_next(node.as_str());
                    let stored = self.saver.put(&config, checkpoint, metadata).await?;
                    let checkpoint_id = stored.checkpoint_id.clone().unwrap_or_default();

                    info!(
                        thread_id = %self.thread_id,
                        checkpoint_id = %checkpoint_id,
                        "suspended for human review"
                    );
                    let _ = tx
                        .send(WorkflowEvent::Interrupt {
                            payload,
                            checkpoint_id,
                        })
                        .await;
                    return Ok(());
                }
                NodeOutcome::Command(command) => {
                    let (next_config, goto) = self
                        .commit_step(&config, &mut state, node, command, step, tx)
                        .await?;
                    config = next_config;
                    step += 1;

                    match goto {
                        Goto::Node(next) => node = next,
                        Goto::End => return self.complete(&config, tx).await,
                    }
                }
            }
        }
    }

    /// Commit one finished node: pending writes first, then the successor
    /// checkpoint, then the event.
    async fn commit_step(
        &self,
        config: &CheckpointConfig,
        state: &mut TriageState,
        node: Node,
        command: Command,
        step: i64,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<(CheckpointConfig, Goto)> {
        let Command { update, goto } = command;

        let parent_id = config.checkpoint_id.clone().unwrap_or_default();
        let task_id = format!("{}:{}", parent_id, node.as_str());
        self.saver
            .put_writes(config, update.channel_writes(), &task_id)
            .await?;

        state.apply(&update);

        let checkpoint = Checkpoint::new(state.to_channel_values());
        let metadata = CheckpointMetadata::new(node.as_str(), step).with_next(goto.as_str());
        let stored = self.saver.put(config, checkpoint, metadata).await?;
        let checkpoint_id = stored.checkpoint_id.clone().unwrap_or_default();

        debug!(
            thread_id = %self.thread_id,
            node = %node,
            step,
            next = goto.as_str(),
            checkpoint_id = %checkpoint_id,
            "committed step"
        );

        let _ = tx
            .send(WorkflowEvent::Node {
                node: node.as_str().to_string(),
                update,
                checkpoint_id,
                timestamp: Utc::now(),
            })
            .await;

        Ok((stored, goto))
    }

    async fn complete(
        &self,
        config: &CheckpointConfig,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        let checkpoint_id = config.checkpoint_id.clone().unwrap_or_default();
        info!(thread_id = %self.thread_id, checkpoint_id = %checkpoint_id, "run completed");
        let _ = tx.send(WorkflowEvent::Completed { checkpoint_id }).await;
        Ok(())
    }

    /// Execute a node; `searchDocumentation` gets the retry policy, every
    /// other node runs once.
    async fn execute_with_retry(&self, node: Node, state: &TriageState) -> Result<NodeOutcome> {
        if node != Node::SearchDocumentation {
            return self.nodes.execute(node, state).await;
        }

        let mut attempts = 0;
        loop {
            match self.nodes.execute(node, state).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    attempts += 1;
                    if !err.is_transient() || !self.retry.should_retry(attempts) {
                        return Err(err);
                    }
                    let delay = self.retry.calculate_delay(attempts - 1);
                    warn!(
                        node = %node,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ChatMessage, InferenceError, InferenceService};
    use async_trait::async_trait;
    use mailflow_checkpoint::InMemorySaver;

    struct UnusedInference;

    #[async_trait]
    impl InferenceService for UnusedInference {
        async fn invoke(
            &self,
            _messages: &[ChatMessage],
        ) -> std::result::Result<String, InferenceError> {
            Err(InferenceError::Provider("not wired".to_string()))
        }
    }

    fn lock_keys(engine: &WorkflowEngine) -> Vec<String> {
        let locks = engine.locks.lock().unwrap();
        let mut keys: Vec<String> = locks.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_idle_thread_locks_are_pruned() {
        let engine =
            WorkflowEngine::new(Arc::new(InMemorySaver::new()), Arc::new(UnusedInference));

        let held = engine.thread_lock("thread-a");
        let released = engine.thread_lock("thread-b");
        drop(released);
        assert_eq!(lock_keys(&engine), vec!["thread-a", "thread-b"]);

        // taking any lock sweeps out entries no run holds anymore
        let third = engine.thread_lock("thread-c");
        assert_eq!(lock_keys(&engine), vec!["thread-a", "thread-c"]);

        drop(held);
        drop(third);
        let _fourth = engine.thread_lock("thread-d");
        assert_eq!(lock_keys(&engine), vec!["thread-d"]);
    }
}
