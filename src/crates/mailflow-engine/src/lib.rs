//! # mailflow-engine - Durable Email-Triage Workflow
//!
//! A workflow engine that drives incoming customer emails through a fixed
//! triage graph: classify, gather context, draft a reply, optionally pause
//! for human approval, send. Execution is checkpointed after every node
//! through [`mailflow_checkpoint`], which buys three things at once:
//!
//! - **Durability** - a run survives process restarts; the latest
//!   checkpoint is always enough to continue
//! - **Human-in-the-loop** - `humanReview` suspends the run durably and a
//!   later `resume` call picks it up, minutes or days later
//! - **Time travel** - `rewind` re-runs from any historical checkpoint on
//!   a new chain without destroying old history
//!
//! ## The graph
//!
//! ```text
//! readEmail → classifyIntent ─┬─ billing/critical ──────→ humanReview
//!                             ├─ question/feature → searchDocumentation ─┐
//!                             ├─ bug → bugTracking ─────────────────────┤
//!                             └─ otherwise ─────────────→ draftResponse ←┘
//!                                                              │
//!                                      high/critical/complex ──┤── else
//!                                              ↓               ↓
//!                                         humanReview      sendReply → end
//! ```
//!
//! Routing is command-based: each branch point returns a [`Command`] with
//! its state update and an explicit goto, recorded in the checkpoint so
//! rewind never has to replay a routing decision.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use mailflow_engine::{EmailInput, WorkflowEngine};
//! use mailflow_checkpoint::InMemorySaver;
//! use tokio_stream::StreamExt;
//! use std::sync::Arc;
//!
//! let engine = WorkflowEngine::new(Arc::new(InMemorySaver::new()), inference);
//! let mut events = engine.start("thread-1", EmailInput {
//!     email_content: "How do I reset my password?".into(),
//!     sender_email: "user@example.com".into(),
//!     email_id: None,
//! });
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod engine;
pub mod error;
pub mod event;
pub mod inference;
pub mod interrupt;
pub mod node;
pub mod nodes;
pub mod retry;
pub mod state;

pub use engine::{EmailInput, WorkflowEngine};
pub use error::{EngineError, Result};
pub use event::WorkflowEvent;
pub use inference::{ChatMessage, InferenceError, InferenceService, Role};
pub use interrupt::{ReviewDecision, ReviewRequest, INTERRUPT_CHANNEL};
pub use node::{Command, Goto, Node};
pub use nodes::{NodeOutcome, TriageNodes};
pub use retry::RetryPolicy;
pub use state::{EmailClassification, Intent, StateUpdate, TriageState, Urgency};
