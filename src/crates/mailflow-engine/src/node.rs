//! The closed node set and command-based routing
//!
//! The triage graph has exactly seven nodes. Keeping them in one closed
//! enum means routing is an exhaustive match: adding a node without wiring
//! its dispatch is a compile error, and a checkpoint can never record a
//! successor the engine does not know.

use crate::state::StateUpdate;
use std::fmt;

/// Wire name of the terminal pseudo-node recorded in checkpoint metadata
pub const END: &str = "end";

/// The seven nodes of the triage graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    ReadEmail,
    ClassifyIntent,
    SearchDocumentation,
    BugTracking,
    DraftResponse,
    HumanReview,
    SendReply,
}

impl Node {
    /// Every node, in graph order
    pub const ALL: [Node; 7] = [
        Node::ReadEmail,
        Node::ClassifyIntent,
        Node::SearchDocumentation,
        Node::BugTracking,
        Node::DraftResponse,
        Node::HumanReview,
        Node::SendReply,
    ];

    /// The wire name of this node, as recorded in checkpoints and events
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::ReadEmail => "readEmail",
            Node::ClassifyIntent => "classifyIntent",
            Node::SearchDocumentation => "searchDocumentation",
            Node::BugTracking => "bugTracking",
            Node::DraftResponse => "draftResponse",
            Node::HumanReview => "humanReview",
            Node::SendReply => "sendReply",
        }
    }

    /// Parse a wire name back into a node
    pub fn parse(name: &str) -> Option<Node> {
        Node::ALL.iter().copied().find(|n| n.as_str() == name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where execution goes after a node finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goto {
    Node(Node),
    End,
}

impl Goto {
    /// The wire name recorded in checkpoint metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Goto::Node(node) => node.as_str(),
            Goto::End => END,
        }
    }

    /// Parse a recorded successor name
    pub fn parse(name: &str) -> Option<Goto> {
        if name == END {
            Some(Goto::End)
        } else {
            Node::parse(name).map(Goto::Node)
        }
    }
}

/// The output of a node: a partial state write plus an explicit routing
/// decision
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub update: StateUpdate,
    pub goto: Goto,
}

impl Command {
    /// Route somewhere with no state change
    pub fn goto(goto: Goto) -> Self {
        Self {
            update: StateUpdate::new(),
            goto,
        }
    }

    /// Attach a state update to this command
    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names_roundtrip() {
        for node in Node::ALL {
            assert_eq!(Node::parse(node.as_str()), Some(node));
        }
        assert_eq!(Node::parse("frobnicate"), None);
    }

    #[test]
    fn test_goto_parse() {
        assert_eq!(Goto::parse("end"), Some(Goto::End));
        assert_eq!(
            Goto::parse("humanReview"),
            Some(Goto::Node(Node::HumanReview))
        );
        assert_eq!(Goto::parse(""), None);
    }

    #[test]
    fn test_command_builder() {
        let cmd = Command::goto(Goto::Node(Node::SendReply)).with_update(StateUpdate {
            response_text: Some("ok".to_string()),
            ..Default::default()
        });
        assert_eq!(cmd.goto, Goto::Node(Node::SendReply));
        assert_eq!(cmd.update.response_text.as_deref(), Some("ok"));
    }
}
