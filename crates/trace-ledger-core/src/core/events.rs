// crates/trace-ledger-core/src/core/events.rs
// ============================================================================
// Module: Agent Events
// Description: Append-only event log entries with global sequencing.
// Purpose: Model the high-volume event stream attached to runs.
// Dependencies: serde, time, serde_json
// ============================================================================

//! ## Overview
//! Events are never mutated after insert; only the deletion and retention
//! engines remove them. `sequence_num` values come from a single server-side
//! sequence, so they are globally unique and monotonic. Within one bulk
//! insert, numbers are assigned to the input slice in order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::EventId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Vocabulary of agent event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A run started.
    RunStarted,
    /// A run completed successfully.
    RunCompleted,
    /// A run failed.
    RunFailed,
    /// A decision was recorded.
    DecisionMade,
    /// A decision was revised.
    DecisionRevised,
    /// A tool invocation was issued.
    ToolCalled,
    /// A tool invocation returned.
    ToolResult,
    /// A model request was issued.
    LlmRequest,
    /// A model response arrived.
    LlmResponse,
    /// A retrieval over external context ran.
    Retrieval,
    /// The agent recorded an observation.
    Observation,
    /// A message was sent to another agent.
    MessageSent,
    /// A message was received from another agent.
    MessageReceived,
    /// An error occurred during execution.
    Error,
    /// Host-defined event type carried in the payload.
    Custom,
}

impl EventType {
    /// Returns the persisted label for this event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::RunCompleted => "run_completed",
            Self::RunFailed => "run_failed",
            Self::DecisionMade => "decision_made",
            Self::DecisionRevised => "decision_revised",
            Self::ToolCalled => "tool_called",
            Self::ToolResult => "tool_result",
            Self::LlmRequest => "llm_request",
            Self::LlmResponse => "llm_response",
            Self::Retrieval => "retrieval",
            Self::Observation => "observation",
            Self::MessageSent => "message_sent",
            Self::MessageReceived => "message_received",
            Self::Error => "error",
            Self::Custom => "custom",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "run_started" => Some(Self::RunStarted),
            "run_completed" => Some(Self::RunCompleted),
            "run_failed" => Some(Self::RunFailed),
            "decision_made" => Some(Self::DecisionMade),
            "decision_revised" => Some(Self::DecisionRevised),
            "tool_called" => Some(Self::ToolCalled),
            "tool_result" => Some(Self::ToolResult),
            "llm_request" => Some(Self::LlmRequest),
            "llm_response" => Some(Self::LlmResponse),
            "retrieval" => Some(Self::Retrieval),
            "observation" => Some(Self::Observation),
            "message_sent" => Some(Self::MessageSent),
            "message_received" => Some(Self::MessageReceived),
            "error" => Some(Self::Error),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// A persisted agent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event identifier.
    pub id: EventId,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Event type.
    pub event_type: EventType,
    /// Globally monotonic sequence number.
    pub sequence_num: i64,
    /// When the event occurred inside the run.
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    /// External agent identifier that emitted the event.
    pub agent_id: String,
    /// Free-form event payload (always a JSON object).
    pub payload: Value,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for appending one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgentEvent {
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Event type.
    pub event_type: EventType,
    /// When the event occurred inside the run.
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    /// External agent identifier that emitted the event.
    pub agent_id: String,
    /// Free-form event payload; non-object values are normalized to `{}`.
    pub payload: Value,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::EventType;

    #[test]
    fn event_type_labels_roundtrip() {
        let all = [
            EventType::RunStarted,
            EventType::RunCompleted,
            EventType::RunFailed,
            EventType::DecisionMade,
            EventType::DecisionRevised,
            EventType::ToolCalled,
            EventType::ToolResult,
            EventType::LlmRequest,
            EventType::LlmResponse,
            EventType::Retrieval,
            EventType::Observation,
            EventType::MessageSent,
            EventType::MessageReceived,
            EventType::Error,
            EventType::Custom,
        ];
        for event_type in all {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("unknown"), None);
    }

    #[test]
    fn event_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&EventType::ToolCalled).expect("serialize");
        assert_eq!(json, "\"tool_called\"");
    }
}
