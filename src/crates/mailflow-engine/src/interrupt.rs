//! Durable human-in-the-loop interrupts
//!
//! A run that reaches `humanReview` does not block a task waiting for a
//! human. It records the review payload in a reserved checkpoint channel,
//! emits one interrupt event and ends its stream. Hours or days later a
//! `resume` call finds the marker in the latest checkpoint and picks the
//! run back up. Restart-safety falls out of the marker being part of the
//! durable snapshot, not process memory.

use crate::state::{Intent, TriageState, Urgency};
use serde::{Deserialize, Serialize};

/// Reserved channel name carrying the pending review payload inside the
/// suspend checkpoint. Never a real state field.
pub const INTERRUPT_CHANNEL: &str = "__interrupt__";

/// Payload handed to the human reviewer when a run suspends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub email_id: String,
    pub original_email: String,
    pub draft_response: String,
    pub urgency: Urgency,
    pub intent: Intent,
    /// What the reviewer is being asked to do
    pub action: String,
}

impl ReviewRequest {
    /// Build the review payload from the current state. Side-effect free.
    pub fn from_state(state: &TriageState) -> Self {
        let (urgency, intent) = match &state.classification {
            Some(c) => (c.urgency, c.intent.clone()),
            None => (Urgency::High, Intent::Complex),
        };
        Self {
            email_id: state.email_id.clone(),
            original_email: state.email_content.clone(),
            draft_response: state.response_text.clone().unwrap_or_default(),
            urgency,
            intent,
            action: "Please review and approve/edit this response".to_string(),
        }
    }
}

/// The human's decision supplied on resume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub approved: bool,

    /// Replacement response text; only honored when approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_response: Option<String>,
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            edited_response: None,
        }
    }

    pub fn approve_with_edit(edited_response: impl Into<String>) -> Self {
        Self {
            approved: true,
            edited_response: Some(edited_response.into()),
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            edited_response: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EmailClassification;

    #[test]
    fn test_review_request_carries_classification() {
        let state = TriageState {
            email_id: "e-7".to_string(),
            email_content: "I was double charged".to_string(),
            response_text: Some("We are sorry...".to_string()),
            classification: Some(EmailClassification {
                intent: Intent::Billing,
                urgency: Urgency::Critical,
                topic: "billing".to_string(),
                summary: "double charge".to_string(),
            }),
            ..Default::default()
        };
        let request = ReviewRequest::from_state(&state);
        assert_eq!(request.email_id, "e-7");
        assert_eq!(request.original_email, "I was double charged");
        assert_eq!(request.draft_response, "We are sorry...");
        assert_eq!(request.urgency, Urgency::Critical);
        assert_eq!(request.intent, Intent::Billing);
    }

    #[test]
    fn test_review_request_serializes_camel_case() {
        let state = TriageState {
            email_id: "e-1".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(ReviewRequest::from_state(&state)).unwrap();
        assert!(json.get("emailId").is_some());
        assert!(json.get("originalEmail").is_some());
        assert!(json.get("draftResponse").is_some());
    }

    #[test]
    fn test_decision_constructors() {
        assert!(ReviewDecision::approve().approved);
        assert!(!ReviewDecision::reject().approved);
        let edited = ReviewDecision::approve_with_edit("better text");
        assert_eq!(edited.edited_response.as_deref(), Some("better text"));
    }
}
