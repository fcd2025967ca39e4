//! Events emitted over the course of a driven run
//!
//! Events flow through a bounded mpsc channel as the engine executes.
//! Ordering guarantee: an event is emitted only after its checkpoint is
//! durably written, never the reverse, so an observer that acts on an
//! event can always find the matching snapshot in the store.

use crate::interrupt::ReviewRequest;
use crate::state::StateUpdate;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One observable step of a workflow run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A node finished and its checkpoint is committed
    #[serde(rename_all = "camelCase")]
    Node {
        node: String,
        update: StateUpdate,
        checkpoint_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The run suspended for human review; no further nodes will execute
    /// until a resume
    #[serde(rename_all = "camelCase")]
    Interrupt {
        payload: ReviewRequest,
        checkpoint_id: String,
    },

    /// The run reached the end of the graph
    #[serde(rename_all = "camelCase")]
    Completed { checkpoint_id: String },

    /// The run terminated on a node error; the last good checkpoint is
    /// intact
    Error { message: String },
}

impl WorkflowEvent {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, WorkflowEvent::Interrupt { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::Interrupt { .. }
                | WorkflowEvent::Completed { .. }
                | WorkflowEvent::Error { .. }
        )
    }

    /// The node name for node events, `None` otherwise
    pub fn node_name(&self) -> Option<&str> {
        match self {
            WorkflowEvent::Node { node, .. } => Some(node),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WorkflowEvent::Completed {
            checkpoint_id: "cp-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["checkpointId"], "cp-1");
    }

    #[test]
    fn test_node_event_carries_update() {
        let event = WorkflowEvent::Node {
            node: "draftResponse".to_string(),
            update: StateUpdate {
                response_text: Some("hi".to_string()),
                ..Default::default()
            },
            checkpoint_id: "cp-2".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node");
        assert_eq!(json["update"]["responseText"], "hi");
        assert_eq!(event.node_name(), Some("draftResponse"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(WorkflowEvent::Error {
            message: "boom".to_string()
        }
        .is_terminal());
        assert!(WorkflowEvent::Completed {
            checkpoint_id: "c".to_string()
        }
        .is_terminal());
    }
}
