//! # mailflow-relay - Command Envelope and History Queries
//!
//! The relay is the seam between a transport layer (HTTP, SSE, WebSocket,
//! whatever the deployment uses) and the workflow engine. It owns three
//! responsibilities:
//!
//! - **Command parsing** - JSON envelopes tagged by a `command` field map
//!   to exactly three operations (start / resume / rewind); anything else
//!   is an explicit error
//! - **Dispatch** - routing a parsed command to the engine and handing the
//!   event stream back for forwarding in arrival order
//! - **Read-only queries** - thread listing, per-thread history (the live
//!   parent chain, newest first), individual checkpoint snapshots, thread
//!   deletion
//!
//! Configuration is environment-driven: [`RelayConfig::from_env`] reads
//! `MAILFLOW_DATABASE_URL` and fails loudly when persistence is requested
//! but unconfigured.

pub mod command;
pub mod config;
pub mod error;
pub mod service;

pub use command::{parse_command, ClientCommand};
pub use config::{RelayConfig, DATABASE_URL_ENV};
pub use error::{RelayError, Result};
pub use service::{CheckpointSummary, TriageRelay};
