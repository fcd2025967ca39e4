//! Boundary between the workflow and the AI provider
//!
//! Nodes talk to a [`InferenceService`] trait object, never a concrete
//! provider. Tests script it, production wires a real client; the graph
//! logic cannot tell the difference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in an inference request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Errors surfaced by an inference provider
#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    /// Timeout, rate limit, connection reset; worth retrying
    #[error("Transient inference failure: {0}")]
    Transient(String),

    /// The provider answered, but the content is unusable
    #[error("Malformed inference content: {0}")]
    MalformedContent(String),

    /// Authentication, quota, or any other definitive provider failure
    #[error("Inference provider error: {0}")]
    Provider(String),
}

impl InferenceError {
    /// Whether retrying the same request could reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, InferenceError::Transient(_))
    }
}

/// A chat-completion service the triage nodes call for classification,
/// documentation search and response drafting.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Run one completion over the given messages and return the reply text
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_detection() {
        assert!(InferenceError::Transient("timeout".to_string()).is_transient());
        assert!(!InferenceError::Provider("bad key".to_string()).is_transient());
        assert!(!InferenceError::MalformedContent("not json".to_string()).is_transient());
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
    }
}
