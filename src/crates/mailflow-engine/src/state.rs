//! Typed triage state and its merge semantics
//!
//! [`TriageState`] is the shared state every node reads and partially
//! writes. Nodes never mutate state directly: they return a [`StateUpdate`]
//! and the engine folds it in through [`TriageState::apply`], the single
//! merge function. A field present in the update wins; an absent field
//! retains its old value. Checkpoint restore goes through the same serde
//! representation, so engine-merge and store-restore cannot diverge.
//!
//! All fields serialize with camelCase names, matching the external wire
//! contract (`emailContent`, `responseText`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How the sender's email was classified
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Question,
    Bug,
    Billing,
    Feature,
    Complex,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Question => "question",
            Intent::Bug => "bug",
            Intent::Billing => "billing",
            Intent::Feature => "feature",
            Intent::Complex => "complex",
        };
        write!(f, "{}", s)
    }
}

/// How urgent the email is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Structured classification of an incoming email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailClassification {
    pub intent: Intent,
    pub urgency: Urgency,
    pub topic: String,
    pub summary: String,
}

impl EmailClassification {
    /// Conservative default used when the model reply cannot be parsed:
    /// route to a human rather than guess.
    pub fn fallback(email_content: &str) -> Self {
        Self {
            intent: Intent::Complex,
            urgency: Urgency::High,
            topic: "unknown".to_string(),
            summary: email_content.chars().take(100).collect(),
        }
    }
}

/// Shared workflow state for one email triage run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriageState {
    #[serde(default)]
    pub email_content: String,

    #[serde(default)]
    pub sender_email: String,

    #[serde(default)]
    pub email_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<EmailClassification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_history: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// A partial write to the triage state, returned by a node.
///
/// Only fields the node actually set are carried; everything else stays
/// untouched on merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<EmailClassification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_history: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The `(channel, value)` pairs this update writes, in field order.
    /// Used to buffer node output before its checkpoint commits.
    pub fn channel_writes(&self) -> Vec<(String, serde_json::Value)> {
        let mut writes = Vec::new();
        let mut push = |channel: &str, value: Option<serde_json::Value>| {
            if let Some(value) = value {
                writes.push((channel.to_string(), value));
            }
        };
        push("emailContent", self.email_content.as_ref().map(|v| v.clone().into()));
        push("senderEmail", self.sender_email.as_ref().map(|v| v.clone().into()));
        push("emailId", self.email_id.as_ref().map(|v| v.clone().into()));
        push(
            "classification",
            self.classification
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
        );
        push(
            "searchResults",
            self.search_results
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
        );
        push("customerHistory", self.customer_history.clone());
        push("responseText", self.response_text.as_ref().map(|v| v.clone().into()));
        push("thinking", self.thinking.as_ref().map(|v| v.clone().into()));
        writes
    }
}

impl TriageState {
    /// Merge an update into this state. A field present in the update
    /// replaces the old value; an absent field retains it.
    pub fn apply(&mut self, update: &StateUpdate) {
        if let Some(v) = &update.email_content {
            self.email_content = v.clone();
        }
        if let Some(v) = &update.sender_email {
            self.sender_email = v.clone();
        }
        if let Some(v) = &update.email_id {
            self.email_id = v.clone();
        }
        if let Some(v) = &update.classification {
            self.classification = Some(v.clone());
        }
        if let Some(v) = &update.search_results {
            self.search_results = Some(v.clone());
        }
        if let Some(v) = &update.customer_history {
            self.customer_history = Some(v.clone());
        }
        if let Some(v) = &update.response_text {
            self.response_text = Some(v.clone());
        }
        if let Some(v) = &update.thinking {
            self.thinking = Some(v.clone());
        }
    }

    /// Serialize this state to checkpoint channel values, one channel per
    /// populated field.
    pub fn to_channel_values(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Restore state from checkpoint channel values. Reserved channels
    /// (such as the interrupt marker) are ignored.
    pub fn from_channel_values(
        channel_values: &HashMap<String, serde_json::Value>,
    ) -> serde_json::Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = channel_values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_apply_present_field_wins() {
        let mut state = TriageState {
            email_content: "old".to_string(),
            response_text: Some("draft".to_string()),
            ..Default::default()
        };
        let update = StateUpdate {
            response_text: Some("edited".to_string()),
            ..Default::default()
        };
        state.apply(&update);
        assert_eq!(state.email_content, "old");
        assert_eq!(state.response_text.as_deref(), Some("edited"));
    }

    #[test]
    fn test_channel_roundtrip_ignores_reserved_channels() {
        let state = TriageState {
            email_content: "hello".to_string(),
            sender_email: "a@b.c".to_string(),
            email_id: "e-1".to_string(),
            classification: Some(EmailClassification {
                intent: Intent::Billing,
                urgency: Urgency::Critical,
                topic: "refund".to_string(),
                summary: "wants a refund".to_string(),
            }),
            ..Default::default()
        };
        let mut channels = state.to_channel_values();
        channels.insert("__interrupt__".to_string(), serde_json::json!({"x": 1}));
        let restored = TriageState::from_channel_values(&channels).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_channel_values_are_camel_case() {
        let state = TriageState {
            email_content: "hi".to_string(),
            response_text: Some("re: hi".to_string()),
            ..Default::default()
        };
        let channels = state.to_channel_values();
        assert!(channels.contains_key("emailContent"));
        assert!(channels.contains_key("responseText"));
        assert!(!channels.contains_key("email_content"));
    }

    #[test]
    fn test_channel_writes_in_field_order() {
        let update = StateUpdate {
            response_text: Some("text".to_string()),
            thinking: Some("trail".to_string()),
            search_results: Some(vec!["doc".to_string()]),
            ..Default::default()
        };
        let channels: Vec<_> = update
            .channel_writes()
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(channels, vec!["searchResults", "responseText", "thinking"]);
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Critical > Urgency::High);
        assert!(Urgency::High > Urgency::Medium);
        assert!(Urgency::Medium > Urgency::Low);
    }

    #[test]
    fn test_fallback_classification_truncates_summary() {
        let long = "x".repeat(250);
        let fb = EmailClassification::fallback(&long);
        assert_eq!(fb.intent, Intent::Complex);
        assert_eq!(fb.urgency, Urgency::High);
        assert_eq!(fb.summary.chars().count(), 100);
    }

    fn opt_string() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z]{0,12}")
    }

    proptest! {
        #[test]
        fn prop_merge_precedence(
            old_content in "[a-z]{0,12}",
            new_content in opt_string(),
            old_response in opt_string(),
            new_response in opt_string(),
            old_thinking in opt_string(),
            new_thinking in opt_string(),
        ) {
            let mut state = TriageState {
                email_content: old_content.clone(),
                response_text: old_response.clone(),
                thinking: old_thinking.clone(),
                ..Default::default()
            };
            let update = StateUpdate {
                email_content: new_content.clone(),
                response_text: new_response.clone(),
                thinking: new_thinking.clone(),
                ..Default::default()
            };
            state.apply(&update);

            prop_assert_eq!(state.email_content, new_content.unwrap_or(old_content));
            prop_assert_eq!(state.response_text, new_response.or(old_response));
            prop_assert_eq!(state.thinking, new_thinking.or(old_thinking));
        }
    }
}
