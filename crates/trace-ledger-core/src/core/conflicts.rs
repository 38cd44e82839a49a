// crates/trace-ledger-core/src/core/conflicts.rs
// ============================================================================
// Module: Decision Conflicts
// Description: Canonically ordered, scored conflict pairs with a lifecycle.
// Purpose: Model conflict detection output and the resolution workflow.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A conflict is a pair of decisions canonicalized so `decision_a_id <
//! decision_b_id` lexicographically; side-specific fields swap in lockstep
//! during canonicalization. The pair is unique; re-scoring refreshes the
//! metrics and bumps `detected_at` without duplicating the row. Lifecycle:
//! `open -> acknowledged -> resolved | wont_fix` (resolution may also come
//! straight from `open`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::ConflictId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Vocabulary
// ============================================================================

/// Kind of detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two different agents disagree.
    CrossAgent,
    /// One agent contradicts itself.
    SelfContradiction,
}

impl ConflictKind {
    /// Returns the persisted label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CrossAgent => "cross_agent",
            Self::SelfContradiction => "self_contradiction",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "cross_agent" => Some(Self::CrossAgent),
            "self_contradiction" => Some(Self::SelfContradiction),
            _ => None,
        }
    }
}

/// Conflict lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Newly detected, unreviewed.
    Open,
    /// Reviewed, pending resolution.
    Acknowledged,
    /// Resolved with an optional winner.
    Resolved,
    /// Closed without action.
    WontFix,
}

impl ConflictStatus {
    /// Returns the persisted label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::WontFix => "wont_fix",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "open" => Some(Self::Open),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            "wont_fix" => Some(Self::WontFix),
            _ => None,
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::WontFix)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// One side of a conflict as hydrated from the decisions join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSide {
    /// Decision on this side.
    pub decision_id: DecisionId,
    /// Agent that made the decision.
    pub agent_id: String,
    /// Run the decision was made in.
    pub run_id: Option<RunId>,
    /// Decision type as scored.
    pub decision_type: String,
    /// Outcome as scored.
    pub outcome: String,
    /// Confidence at scoring time.
    pub confidence: Option<f64>,
    /// Reasoning at scoring time.
    pub reasoning: Option<String>,
    /// When the decision was made (`valid_from`).
    #[serde(with = "time::serde::rfc3339::option")]
    pub decided_at: Option<OffsetDateTime>,
}

/// A persisted, scored conflict pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredConflict {
    /// Conflict identifier.
    pub id: ConflictId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Kind of conflict.
    pub conflict_kind: ConflictKind,
    /// Canonical side A (lexicographically smaller decision id).
    pub side_a: ConflictSide,
    /// Canonical side B.
    pub side_b: ConflictSide,
    /// When the conflict was (most recently) detected.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
    /// Topical similarity in `[0, 1]`.
    pub topic_similarity: f64,
    /// Outcome divergence in `[0, 1]`.
    pub outcome_divergence: f64,
    /// Overall significance in `[0, 1]`.
    pub significance: f64,
    /// Opaque classifier tag that produced the scores.
    pub scoring_method: String,
    /// Classifier explanation, when provided.
    pub explanation: Option<String>,
    /// Reviewed category, when assigned.
    pub category: Option<String>,
    /// Reviewed severity, when assigned.
    pub severity: Option<String>,
    /// Lifecycle status.
    pub status: ConflictStatus,
    /// Who resolved the conflict.
    pub resolved_by: Option<String>,
    /// When the conflict was resolved.
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    /// Free-form resolution note.
    pub resolution_note: Option<String>,
    /// Decision that concluded the conflict, if any.
    pub resolution_decision_id: Option<DecisionId>,
    /// Winning side's decision, if one won.
    pub winning_decision_id: Option<DecisionId>,
    /// Precision: relationship between the decisions.
    pub relationship: Option<String>,
    /// Precision: weight from the two confidences.
    pub confidence_weight: Option<f64>,
    /// Precision: decay from the time gap between the decisions.
    pub temporal_decay: Option<f64>,
}

/// Parameters for inserting or re-scoring a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScoredConflict {
    /// First decision of the pair (canonicalized on insert).
    pub decision_a_id: DecisionId,
    /// Second decision of the pair.
    pub decision_b_id: DecisionId,
    /// Kind of conflict.
    pub conflict_kind: ConflictKind,
    /// Agent behind side A.
    pub agent_a_id: String,
    /// Agent behind side B.
    pub agent_b_id: String,
    /// Decision type on side A.
    pub decision_type_a: String,
    /// Decision type on side B.
    pub decision_type_b: String,
    /// Outcome on side A.
    pub outcome_a: String,
    /// Outcome on side B.
    pub outcome_b: String,
    /// Topical similarity in `[0, 1]`.
    pub topic_similarity: f64,
    /// Outcome divergence in `[0, 1]`.
    pub outcome_divergence: f64,
    /// Overall significance in `[0, 1]`.
    pub significance: f64,
    /// Opaque classifier tag that produced the scores.
    pub scoring_method: String,
    /// Classifier explanation, when provided.
    pub explanation: Option<String>,
    /// Initial category, when known.
    pub category: Option<String>,
    /// Initial severity, when known.
    pub severity: Option<String>,
    /// Precision: relationship between the decisions.
    pub relationship: Option<String>,
    /// Precision: weight from the two confidences.
    pub confidence_weight: Option<f64>,
    /// Precision: decay from the time gap between the decisions.
    pub temporal_decay: Option<f64>,
}

impl NewScoredConflict {
    /// Canonicalizes the pair so `decision_a_id < decision_b_id`
    /// lexicographically, swapping every side-specific field in lockstep.
    #[must_use]
    pub fn canonicalized(mut self) -> Self {
        if self.decision_a_id.to_string() > self.decision_b_id.to_string() {
            std::mem::swap(&mut self.decision_a_id, &mut self.decision_b_id);
            std::mem::swap(&mut self.agent_a_id, &mut self.agent_b_id);
            std::mem::swap(&mut self.decision_type_a, &mut self.decision_type_b);
            std::mem::swap(&mut self.outcome_a, &mut self.outcome_b);
        }
        self
    }
}

// ============================================================================
// SECTION: Filters and Resolution
// ============================================================================

/// Composable conflict listing filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConflictFilter {
    /// Match either side's decision type, case-insensitively on trimmed
    /// values.
    pub decision_type: Option<String>,
    /// Match either side's agent.
    pub agent_id: Option<String>,
    /// Match the conflict kind.
    pub conflict_kind: Option<ConflictKind>,
    /// Match the lifecycle status.
    pub status: Option<ConflictStatus>,
    /// Match the reviewed severity.
    pub severity: Option<String>,
    /// Match the reviewed category.
    pub category: Option<String>,
}

/// Resolution parameters for closing a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Terminal status to apply (`resolved` or `wont_fix`).
    pub status: ConflictStatus,
    /// Who resolved the conflict.
    pub resolved_by: String,
    /// Free-form resolution note.
    pub resolution_note: Option<String>,
    /// Decision that concluded the conflict, if any.
    pub resolution_decision_id: Option<DecisionId>,
    /// Winning side's decision; must equal one of the pair when set.
    pub winning_decision_id: Option<DecisionId>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::ConflictKind;
    use super::ConflictStatus;
    use super::NewScoredConflict;
    use crate::core::identifiers::DecisionId;

    /// Builds a conflict over fixed ids for canonicalization tests.
    fn sample(a: u128, b: u128) -> NewScoredConflict {
        NewScoredConflict {
            decision_a_id: DecisionId::from_uuid(Uuid::from_u128(a)),
            decision_b_id: DecisionId::from_uuid(Uuid::from_u128(b)),
            conflict_kind: ConflictKind::CrossAgent,
            agent_a_id: "alpha".to_string(),
            agent_b_id: "beta".to_string(),
            decision_type_a: "type-a".to_string(),
            decision_type_b: "type-b".to_string(),
            outcome_a: "approve".to_string(),
            outcome_b: "deny".to_string(),
            topic_similarity: 0.8,
            outcome_divergence: 0.9,
            significance: 0.7,
            scoring_method: "classifier-v2".to_string(),
            explanation: None,
            category: None,
            severity: None,
            relationship: None,
            confidence_weight: None,
            temporal_decay: None,
        }
    }

    #[test]
    fn canonicalization_swaps_sides_in_lockstep() {
        let swapped = sample(9, 2).canonicalized();
        assert!(swapped.decision_a_id.to_string() < swapped.decision_b_id.to_string());
        assert_eq!(swapped.agent_a_id, "beta");
        assert_eq!(swapped.agent_b_id, "alpha");
        assert_eq!(swapped.decision_type_a, "type-b");
        assert_eq!(swapped.outcome_a, "deny");
        assert_eq!(swapped.outcome_b, "approve");
    }

    #[test]
    fn canonicalization_keeps_already_ordered_pairs() {
        let kept = sample(2, 9).canonicalized();
        assert_eq!(kept.agent_a_id, "alpha");
        assert_eq!(kept.outcome_b, "deny");
    }

    #[test]
    fn canonicalization_is_symmetric() {
        let forward = sample(2, 9).canonicalized();
        let reverse = {
            let mut conflict = sample(9, 2);
            conflict.agent_a_id = "beta".to_string();
            conflict.agent_b_id = "alpha".to_string();
            conflict.decision_type_a = "type-b".to_string();
            conflict.decision_type_b = "type-a".to_string();
            conflict.outcome_a = "deny".to_string();
            conflict.outcome_b = "approve".to_string();
            conflict.canonicalized()
        };
        assert_eq!(forward, reverse);
    }

    #[test]
    fn status_labels_roundtrip() {
        for status in [
            ConflictStatus::Open,
            ConflictStatus::Acknowledged,
            ConflictStatus::Resolved,
            ConflictStatus::WontFix,
        ] {
            assert_eq!(ConflictStatus::parse(status.as_str()), Some(status));
        }
        assert!(ConflictStatus::Resolved.is_terminal());
        assert!(!ConflictStatus::Acknowledged.is_terminal());
    }

    #[test]
    fn kind_labels_roundtrip() {
        for kind in [ConflictKind::CrossAgent, ConflictKind::SelfContradiction] {
            assert_eq!(ConflictKind::parse(kind.as_str()), Some(kind));
        }
    }
}
