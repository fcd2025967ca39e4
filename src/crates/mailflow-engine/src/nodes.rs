//! The seven triage node implementations
//!
//! Each node is a pure-ish async function over the shared state: it reads
//! what it needs, calls the inference service where required, and returns
//! a [`Command`] with its partial update and routing decision. The one
//! exception is `humanReview`, which is split into a side-effect-free
//! suspend phase (build the review payload) and a resume phase (apply the
//! decision); the engine persists the run between the two.
//!
//! Every node also maintains a `thinking` trail describing what it did,
//! rewritten per node, so an observer can always see the latest reasoning.

use crate::error::Result;
use crate::inference::{ChatMessage, InferenceService};
use crate::interrupt::{ReviewDecision, ReviewRequest};
use crate::node::{Command, Goto, Node};
use crate::state::{EmailClassification, Intent, StateUpdate, TriageState, Urgency};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a node execution produced: either a routing command or a request
/// to suspend for human review
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Command(Command),
    Suspend(ReviewRequest),
}

/// The node set, bound to an inference service
#[derive(Clone)]
pub struct TriageNodes {
    inference: Arc<dyn InferenceService>,
}

impl TriageNodes {
    pub fn new(inference: Arc<dyn InferenceService>) -> Self {
        Self { inference }
    }

    /// Run one node against the current state.
    ///
    /// `humanReview` yields a suspend request here; its resume phase is
    /// invoked separately via [`TriageNodes::human_review_resume`].
    pub async fn execute(&self, node: Node, state: &TriageState) -> Result<NodeOutcome> {
        debug!(node = %node, "executing node");
        let command = match node {
            Node::ReadEmail => self.read_email(state).await?,
            Node::ClassifyIntent => self.classify_intent(state).await?,
            Node::SearchDocumentation => self.search_documentation(state).await?,
            Node::BugTracking => self.bug_tracking(state).await?,
            Node::DraftResponse => self.draft_response(state).await?,
            Node::HumanReview => {
                return Ok(NodeOutcome::Suspend(self.human_review_suspend(state)));
            }
            Node::SendReply => self.send_reply(state).await?,
        };
        Ok(NodeOutcome::Command(command))
    }

    /// Entry node: record the processing trail and continue to
    /// classification. The only static edge besides `sendReply -> end`.
    pub async fn read_email(&self, state: &TriageState) -> Result<Command> {
        let thinking = format!(
            "Processing incoming email\nFrom: {}\nEmail id: {}\nContent length: {} chars\nParsing email metadata and content...",
            state.sender_email,
            state.email_id,
            state.email_content.chars().count(),
        );
        let update = StateUpdate {
            thinking: Some(thinking),
            ..Default::default()
        };
        Ok(Command::goto(Goto::Node(Node::ClassifyIntent)).with_update(update))
    }

    /// Classify the email and pick the branch. Unparseable model output
    /// degrades to a conservative default instead of failing the run.
    pub async fn classify_intent(&self, state: &TriageState) -> Result<Command> {
        let prompt = classification_prompt(state);
        let mut thinking = String::from("Analyzing email intent...\n\n");

        let reply = self
            .inference
            .invoke(&[ChatMessage::user(prompt)])
            .await?;
        let reply = reply.trim();
        thinking.push_str(&format!("Raw model reply:\n{}\n\n", reply));

        let classification = match extract_json_object(reply)
            .and_then(|json| serde_json::from_str::<EmailClassification>(json).ok())
        {
            Some(classification) => classification,
            None => {
                warn!(reply, "failed to parse classification, using fallback");
                thinking.push_str("Could not parse the reply, falling back to manual triage\n\n");
                EmailClassification::fallback(&state.email_content)
            }
        };

        let next = if classification.intent == Intent::Billing
            || classification.urgency == Urgency::Critical
        {
            Node::HumanReview
        } else if classification.intent == Intent::Question
            || classification.intent == Intent::Feature
        {
            Node::SearchDocumentation
        } else if classification.intent == Intent::Bug {
            Node::BugTracking
        } else {
            Node::DraftResponse
        };

        thinking.push_str(&format!(
            "Parsed classification:\n  intent: {}\n  urgency: {}\n  topic: {}\n  summary: {}\n\n",
            classification.intent, classification.urgency, classification.topic, classification.summary,
        ));
        thinking.push_str(&format!(
            "Decision: intent \"{}\" with urgency \"{}\", next node is \"{}\"",
            classification.intent, classification.urgency, next,
        ));

        debug!(
            intent = %classification.intent,
            urgency = %classification.urgency,
            next = %next,
            "classified email"
        );

        let update = StateUpdate {
            classification: Some(classification),
            thinking: Some(thinking),
            ..Default::default()
        };
        Ok(Command::goto(Goto::Node(next)).with_update(update))
    }

    /// Query the knowledge base for relevant snippets. Transient failures
    /// bubble up for the engine's retry policy.
    pub async fn search_documentation(&self, state: &TriageState) -> Result<Command> {
        let classification = effective_classification(state);
        let query = format!("{} {}", classification.intent, classification.topic);

        let mut thinking = format!("Searching the knowledge base...\n\nQuery: \"{}\"\n\n", query);

        let prompt = format!(
            "List documentation snippets relevant to this customer support topic: \"{}\".\n\
             Return one snippet per line, plain text, no numbering.",
            query,
        );
        let reply = self.inference.invoke(&[ChatMessage::user(prompt)]).await?;

        let search_results: Vec<String> = reply
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        thinking.push_str(&format!("Found {} relevant documents:\n", search_results.len()));
        for (i, doc) in search_results.iter().enumerate() {
            thinking.push_str(&format!("  {}. {}\n", i + 1, doc));
        }
        thinking.push_str("\nNext: draftResponse");

        let update = StateUpdate {
            search_results: Some(search_results),
            thinking: Some(thinking),
            ..Default::default()
        };
        Ok(Command::goto(Goto::Node(Node::DraftResponse)).with_update(update))
    }

    /// File a stub bug ticket and record it as gathered context
    pub async fn bug_tracking(&self, state: &TriageState) -> Result<Command> {
        let id_segment = state
            .email_id
            .split('-')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("0000")
            .to_string();
        let ticket_id = format!("BUG-{}", id_segment);

        let thinking = format!(
            "Filing bug ticket...\n\nTicket id: {}\nLinked email: {}\n\nTicket created\nNext: draftResponse",
            ticket_id, state.email_id,
        );

        info!(ticket_id = %ticket_id, email_id = %state.email_id, "filed bug ticket");

        let update = StateUpdate {
            search_results: Some(vec![format!("Bug ticket {} created", ticket_id)]),
            thinking: Some(thinking),
            ..Default::default()
        };
        Ok(Command::goto(Goto::Node(Node::DraftResponse)).with_update(update))
    }

    /// Draft the reply; route to human review when the stakes warrant it
    pub async fn draft_response(&self, state: &TriageState) -> Result<Command> {
        let classification = effective_classification(state);
        let mut context_sections: Vec<String> = Vec::new();
        let mut thinking = String::from("Drafting a response...\n\n");

        if let Some(search_results) = &state.search_results {
            let formatted_docs = search_results
                .iter()
                .map(|doc| format!("- {}", doc))
                .collect::<Vec<_>>()
                .join("\n");
            context_sections.push(format!("Relevant documentation:\n{}", formatted_docs));
            thinking.push_str(&format!("Context documents:\n{}\n\n", formatted_docs));
        }

        if let Some(customer_history) = &state.customer_history {
            let tier = customer_history
                .get("tier")
                .and_then(|v| v.as_str())
                .unwrap_or("standard");
            context_sections.push(format!("Customer tier: {}", tier));
        }

        let prompt = format!(
            "Draft a response to this customer email:\n{}\n\n\
             Email intent: {}\nUrgency level: {}\n\n{}\n\n\
             Guidelines:\n\
             - Be professional and helpful\n\
             - Address their specific concern\n\
             - Use the provided documentation when relevant\n",
            state.email_content,
            classification.intent,
            classification.urgency,
            context_sections.join("\n\n"),
        );

        let response_text = self.inference.invoke(&[ChatMessage::user(prompt)]).await?;
        thinking.push_str(&format!(
            "Generated draft:\n{}\n\n",
            truncated(&response_text, 200),
        ));

        let needs_review = classification.urgency >= Urgency::High
            || classification.intent == Intent::Complex;
        let next = if needs_review {
            Node::HumanReview
        } else {
            Node::SendReply
        };

        thinking.push_str(&format!(
            "Decision: urgency is \"{}\", {}",
            classification.urgency,
            if needs_review {
                "routing to human review"
            } else {
                "sending directly"
            },
        ));

        let update = StateUpdate {
            response_text: Some(response_text),
            thinking: Some(thinking),
            ..Default::default()
        };
        Ok(Command::goto(Goto::Node(next)).with_update(update))
    }

    /// Suspend phase of `humanReview`: build the payload handed to the
    /// reviewer. Must stay side-effect free; the engine records the
    /// interrupt durably and this phase is never re-run on resume.
    pub fn human_review_suspend(&self, state: &TriageState) -> ReviewRequest {
        ReviewRequest::from_state(state)
    }

    /// Resume phase of `humanReview`: fold the reviewer's decision into
    /// the run. Runs exactly once per resume.
    pub fn human_review_resume(&self, state: &TriageState, decision: &ReviewDecision) -> Command {
        if decision.approved {
            let response_text = decision
                .edited_response
                .clone()
                .or_else(|| state.response_text.clone());
            let update = StateUpdate {
                response_text,
                ..Default::default()
            };
            Command::goto(Goto::Node(Node::SendReply)).with_update(update)
        } else {
            // Rejection means the human handles the email directly
            Command::goto(Goto::End)
        }
    }

    /// Terminal node: hand the reply to the outbound mail integration
    pub async fn send_reply(&self, state: &TriageState) -> Result<Command> {
        let preview = state
            .response_text
            .as_deref()
            .map(|text| truncated(text, 100))
            .unwrap_or_default();
        info!(email_id = %state.email_id, reply = %preview, "sending reply");
        Ok(Command::goto(Goto::End))
    }
}

/// A classification to act on even when the state somehow lacks one;
/// degrades to the conservative default rather than failing.
fn effective_classification(state: &TriageState) -> EmailClassification {
    state
        .classification
        .clone()
        .unwrap_or_else(|| EmailClassification::fallback(&state.email_content))
}

/// Extract the first `{...}` block from a model reply that may wrap its
/// JSON in prose or markdown fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn truncated(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

fn classification_prompt(state: &TriageState) -> String {
    format!(
        r#"Analyze this customer email and classify it.

Email: {}
From: {}

Classification guidelines:

INTENT:
- "question": General inquiry or how-to question
- "bug": Reporting a technical issue or error
- "billing": Payment, subscription, or refund related
- "feature": Feature request or suggestion
- "complex": Multiple issues or unclear intent

URGENCY (be careful to classify correctly):
- "low": General questions, feature suggestions, positive feedback, no time pressure
- "medium": Normal support requests, minor issues, standard inquiries
- "high": Customer frustrated, financial impact, repeated issues, time-sensitive
- "critical": System down, security breach, legal threat, VIP customer emergency

Examples:
- "How do I reset password?" -> urgency: "low" (simple question)
- "I can't log in, tried resetting password" -> urgency: "medium" (normal issue)
- "I was charged twice! Please fix immediately!" -> urgency: "high" (financial + frustrated)
- "Our entire system is down, losing $10k/hour" -> urgency: "critical" (major business impact)

You must respond with ONLY a valid JSON object (no markdown, no explanation), with these exact fields:
{{
  "intent": "question" | "bug" | "billing" | "feature" | "complex",
  "urgency": "low" | "medium" | "high" | "critical",
  "topic": "brief topic description",
  "summary": "brief summary of the email"
}}

Respond with the JSON only:"#,
        state.email_content, state.sender_email,
    )
}
