// crates/trace-ledger-core/src/core/children.rs
// ============================================================================
// Module: Decision Children
// Description: Alternatives, evidence, and claims owned by a decision.
// Purpose: Model the immutable child rows recorded alongside a decision.
// Dependencies: serde, time, serde_json
// ============================================================================

//! ## Overview
//! Children are written once, in bulk, inside the same transaction as their
//! decision, and never mutated. Alternatives order by `score DESC NULLS
//! LAST`; evidence by `relevance_score DESC NULLS LAST`. Alternatives carry
//! no org column of their own; reads scope through the parent decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::identifiers::DecisionId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Alternatives
// ============================================================================

/// A considered-but-not-necessarily-chosen option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Row identifier.
    pub id: Uuid,
    /// Parent decision.
    pub decision_id: DecisionId,
    /// Human-readable option label.
    pub label: String,
    /// Optional comparative score.
    pub score: Option<f64>,
    /// Whether this option was the one chosen.
    pub selected: bool,
    /// Why the option was rejected, when it was.
    pub rejection_reason: Option<String>,
    /// Free-form metadata (always a JSON object).
    pub metadata: Value,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for recording one alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlternative {
    /// Human-readable option label.
    pub label: String,
    /// Optional comparative score.
    pub score: Option<f64>,
    /// Whether this option was the one chosen.
    pub selected: bool,
    /// Why the option was rejected, when it was.
    pub rejection_reason: Option<String>,
    /// Free-form metadata.
    pub metadata: Value,
}

impl NewAlternative {
    /// Creates a minimal alternative.
    #[must_use]
    pub fn new(label: impl Into<String>, score: Option<f64>, selected: bool) -> Self {
        Self {
            label: label.into(),
            score,
            selected,
            rejection_reason: None,
            metadata: Value::Null,
        }
    }
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSourceType {
    /// A document or file.
    Document,
    /// A web page.
    Web,
    /// Output of a tool invocation.
    ToolOutput,
    /// A prior decision in the ledger.
    PriorDecision,
    /// A human-provided note.
    HumanInput,
    /// Another agent's message.
    AgentMessage,
}

impl EvidenceSourceType {
    /// Returns the persisted label for this source type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Web => "web",
            Self::ToolOutput => "tool_output",
            Self::PriorDecision => "prior_decision",
            Self::HumanInput => "human_input",
            Self::AgentMessage => "agent_message",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "document" => Some(Self::Document),
            "web" => Some(Self::Web),
            "tool_output" => Some(Self::ToolOutput),
            "prior_decision" => Some(Self::PriorDecision),
            "human_input" => Some(Self::HumanInput),
            "agent_message" => Some(Self::AgentMessage),
            _ => None,
        }
    }
}

/// A piece of supporting evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Row identifier.
    pub id: Uuid,
    /// Parent decision.
    pub decision_id: DecisionId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Where the evidence came from.
    pub source_type: EvidenceSourceType,
    /// Optional validated source URI.
    pub source_uri: Option<String>,
    /// Evidence content.
    pub content: String,
    /// Optional relevance score.
    pub relevance_score: Option<f64>,
    /// Optional embedding over the content.
    pub embedding: Option<Vec<f32>>,
    /// Free-form metadata (always a JSON object).
    pub metadata: Value,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for recording one evidence row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvidence {
    /// Where the evidence came from.
    pub source_type: EvidenceSourceType,
    /// Optional validated source URI.
    pub source_uri: Option<String>,
    /// Evidence content.
    pub content: String,
    /// Optional relevance score.
    pub relevance_score: Option<f64>,
    /// Optional embedding over the content.
    pub embedding: Option<Vec<f32>>,
    /// Free-form metadata.
    pub metadata: Value,
}

impl NewEvidence {
    /// Creates a minimal evidence row.
    #[must_use]
    pub fn new(source_type: EvidenceSourceType, content: impl Into<String>) -> Self {
        Self {
            source_type,
            source_uri: None,
            content: content.into(),
            relevance_score: None,
            embedding: None,
            metadata: Value::Null,
        }
    }
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// A discrete claim extracted from a decision's reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionClaim {
    /// Row identifier.
    pub id: Uuid,
    /// Parent decision.
    pub decision_id: DecisionId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Claim text.
    pub claim_text: String,
    /// Host-defined claim category.
    pub claim_type: Option<String>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for recording one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecisionClaim {
    /// Claim text.
    pub claim_text: String,
    /// Host-defined claim category.
    pub claim_type: Option<String>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::EvidenceSourceType;
    use super::NewAlternative;

    #[test]
    fn evidence_source_labels_roundtrip() {
        let all = [
            EvidenceSourceType::Document,
            EvidenceSourceType::Web,
            EvidenceSourceType::ToolOutput,
            EvidenceSourceType::PriorDecision,
            EvidenceSourceType::HumanInput,
            EvidenceSourceType::AgentMessage,
        ];
        for source in all {
            assert_eq!(EvidenceSourceType::parse(source.as_str()), Some(source));
        }
        assert_eq!(EvidenceSourceType::parse("rumor"), None);
    }

    #[test]
    fn new_alternative_defaults() {
        let alt = NewAlternative::new("Postgres", Some(0.9), true);
        assert!(alt.rejection_reason.is_none());
        assert!(alt.metadata.is_null());
    }
}
