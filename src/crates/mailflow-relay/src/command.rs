//! The client command envelope
//!
//! Clients talk to the relay in JSON envelopes tagged by a `command`
//! field. Exactly three commands exist; anything else is an explicit
//! [`RelayError::UnknownCommand`] so a typo never becomes a silent no-op.

use crate::error::{RelayError, Result};
use mailflow_engine::StateUpdate;
use serde::{Deserialize, Serialize};

/// A parsed client command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Begin triaging a new email on a thread
    #[serde(rename_all = "camelCase")]
    Start {
        thread_id: String,
        email_content: String,
        sender_email: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email_id: Option<String>,
    },

    /// Answer a pending human review
    #[serde(rename_all = "camelCase")]
    Resume {
        thread_id: String,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edited_response: Option<String>,
    },

    /// Re-run from a historical checkpoint
    #[serde(rename_all = "camelCase")]
    Rewind {
        thread_id: String,
        checkpoint_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_input: Option<StateUpdate>,
    },
}

impl ClientCommand {
    /// The thread this command targets
    pub fn thread_id(&self) -> &str {
        match self {
            ClientCommand::Start { thread_id, .. }
            | ClientCommand::Resume { thread_id, .. }
            | ClientCommand::Rewind { thread_id, .. } => thread_id,
        }
    }
}

/// Parse a raw JSON envelope into a command.
///
/// An unrecognized `command` tag maps to [`RelayError::UnknownCommand`];
/// a known tag with a bad payload maps to [`RelayError::InvalidCommand`].
pub fn parse_command(value: serde_json::Value) -> Result<ClientCommand> {
    let tag = value
        .get("command")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    serde_json::from_value(value).map_err(|err| {
        if matches!(tag.as_str(), "start" | "resume" | "rewind") {
            RelayError::InvalidCommand(err.to_string())
        } else {
            RelayError::UnknownCommand(tag.clone())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start() {
        let command = parse_command(json!({
            "command": "start",
            "threadId": "t-1",
            "emailContent": "help",
            "senderEmail": "a@b.c",
        }))
        .unwrap();
        assert_eq!(
            command,
            ClientCommand::Start {
                thread_id: "t-1".to_string(),
                email_content: "help".to_string(),
                sender_email: "a@b.c".to_string(),
                email_id: None,
            }
        );
        assert_eq!(command.thread_id(), "t-1");
    }

    #[test]
    fn test_parse_resume_with_edit() {
        let command = parse_command(json!({
            "command": "resume",
            "threadId": "t-2",
            "approved": true,
            "editedResponse": "better",
        }))
        .unwrap();
        assert_eq!(
            command,
            ClientCommand::Resume {
                thread_id: "t-2".to_string(),
                approved: true,
                edited_response: Some("better".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_rewind() {
        let command = parse_command(json!({
            "command": "rewind",
            "threadId": "t-3",
            "checkpointId": "cp-9",
        }))
        .unwrap();
        assert_eq!(
            command,
            ClientCommand::Rewind {
                thread_id: "t-3".to_string(),
                checkpoint_id: "cp-9".to_string(),
                new_input: None,
            }
        );
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let err = parse_command(json!({"command": "cancel", "threadId": "t"})).unwrap_err();
        assert!(matches!(err, RelayError::UnknownCommand(tag) if tag == "cancel"));
    }

    #[test]
    fn test_missing_tag_is_unknown() {
        let err = parse_command(json!({"threadId": "t"})).unwrap_err();
        assert!(matches!(err, RelayError::UnknownCommand(tag) if tag.is_empty()));
    }

    #[test]
    fn test_known_tag_bad_payload_is_invalid() {
        let err = parse_command(json!({"command": "start", "threadId": "t"})).unwrap_err();
        assert!(matches!(err, RelayError::InvalidCommand(_)));
    }
}
