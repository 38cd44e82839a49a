// crates/trace-ledger-core/src/core/decisions.rs
// ============================================================================
// Module: Decisions
// Description: Bi-temporal decision records, query filters, and signals.
// Purpose: Model the first-class decision and its query surface.
// Dependencies: serde, time, serde_json
// ============================================================================

//! ## Overview
//! A decision is an atomic, hashed, bi-temporally versioned record of an
//! agent's choice. `valid_from`/`valid_to` span domain validity;
//! `transaction_time` records when the row became visible. A decision whose
//! `valid_to` is null is *current*. Revising closes the original and inserts
//! a fresh row whose `supersedes_id` points back, forming an acyclic chain
//! traversed at most 100 hops per direction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Records
// ============================================================================

/// A persisted decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Decision identifier.
    pub id: DecisionId,
    /// Run during which the decision was made.
    pub run_id: RunId,
    /// Owning organization.
    pub org_id: OrgId,
    /// External agent identifier.
    pub agent_id: String,
    /// Decision category (at most 200 bytes).
    pub decision_type: String,
    /// Chosen outcome (at most 32 KiB).
    pub outcome: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Optional reasoning (at most 64 KiB).
    pub reasoning: Option<String>,
    /// Optional embedding over the full decision text.
    pub embedding: Option<Vec<f32>>,
    /// Optional embedding over the outcome alone.
    pub outcome_embedding: Option<Vec<f32>>,
    /// Free-form metadata (always a JSON object).
    pub metadata: Value,
    /// Completeness score in `[0, 1]`.
    pub completeness_score: f64,
    /// Decision that influenced this one, if any.
    pub precedent_ref: Option<DecisionId>,
    /// Decision this one supersedes, if it is a revision.
    pub supersedes_id: Option<DecisionId>,
    /// Canonical content hash (lowercase hex SHA-256).
    pub content_hash: String,
    /// Start of domain validity.
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    /// End of domain validity; null while the decision is current.
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
    /// When the row became visible.
    #[serde(with = "time::serde::rfc3339")]
    pub transaction_time: OffsetDateTime,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Optional session identifier.
    pub session_id: Option<String>,
    /// Execution context snapshot (always a JSON object).
    pub agent_context: Value,
    /// Tool name derived from `agent_context`.
    pub tool: Option<String>,
    /// Model name derived from `agent_context`.
    pub model: Option<String>,
    /// Project name derived from `agent_context`.
    pub project: Option<String>,
    /// API key that authenticated the write, if any.
    pub api_key_id: Option<ApiKeyId>,
}

/// Parameters for recording a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecision {
    /// Run during which the decision was made.
    pub run_id: RunId,
    /// External agent identifier.
    pub agent_id: String,
    /// Decision category.
    pub decision_type: String,
    /// Chosen outcome.
    pub outcome: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Optional reasoning.
    pub reasoning: Option<String>,
    /// Optional embedding over the full decision text.
    pub embedding: Option<Vec<f32>>,
    /// Optional embedding over the outcome alone.
    pub outcome_embedding: Option<Vec<f32>>,
    /// Free-form metadata.
    pub metadata: Value,
    /// Completeness score in `[0, 1]`.
    pub completeness_score: f64,
    /// Decision that influenced this one, if any.
    pub precedent_ref: Option<DecisionId>,
    /// Optional session identifier.
    pub session_id: Option<String>,
    /// Execution context snapshot; `tool` / `model` / `project` columns are
    /// derived from its string fields of the same names.
    pub agent_context: Value,
    /// API key that authenticated the write, if any.
    pub api_key_id: Option<ApiKeyId>,
    /// Explicit start of domain validity; defaults to now when absent.
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
}

impl NewDecision {
    /// Creates minimal decision parameters.
    #[must_use]
    pub fn new(
        run_id: RunId,
        agent_id: impl Into<String>,
        decision_type: impl Into<String>,
        outcome: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            run_id,
            agent_id: agent_id.into(),
            decision_type: decision_type.into(),
            outcome: outcome.into(),
            confidence,
            reasoning: None,
            embedding: None,
            outcome_embedding: None,
            metadata: Value::Null,
            completeness_score: 0.0,
            precedent_ref: None,
            session_id: None,
            agent_context: Value::Null,
            api_key_id: None,
            valid_from: None,
        }
    }

    /// Extracts a string field from the agent context.
    #[must_use]
    pub fn context_str(&self, key: &str) -> Option<String> {
        self.agent_context.get(key).and_then(Value::as_str).map(str::to_owned)
    }
}

/// Replacement content for revising a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRevision {
    /// Revised decision category.
    pub decision_type: String,
    /// Revised outcome.
    pub outcome: String,
    /// Revised confidence in `[0, 1]`.
    pub confidence: f64,
    /// Revised reasoning.
    pub reasoning: Option<String>,
    /// Revised embedding, if recomputed.
    pub embedding: Option<Vec<f32>>,
    /// Revised outcome embedding, if recomputed.
    pub outcome_embedding: Option<Vec<f32>>,
    /// Revised metadata.
    pub metadata: Value,
    /// Revised completeness score in `[0, 1]`.
    pub completeness_score: f64,
}

// ============================================================================
// SECTION: Query Surface
// ============================================================================

/// Inclusive time range over `valid_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Lower bound, inclusive.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    /// Upper bound, inclusive.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
}

/// Structured decision query filter.
///
/// # Invariants
/// - The organization scope is supplied separately by the caller; a filter
///   alone can never widen a query across tenants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionFilter {
    /// Restrict to these external agent identifiers.
    pub agent_ids: Vec<String>,
    /// Restrict to one run.
    pub run_id: Option<RunId>,
    /// Restrict to one decision type.
    pub decision_type: Option<String>,
    /// Minimum confidence, inclusive.
    pub confidence_min: Option<f64>,
    /// Exact outcome match.
    pub outcome: Option<String>,
    /// Restrict `valid_from` to a range.
    pub time_range: Option<TimeRange>,
    /// Restrict to one session.
    pub session_id: Option<String>,
    /// Restrict to decisions made with this tool.
    pub tool: Option<String>,
    /// Restrict to decisions made by this model.
    pub model: Option<String>,
    /// Restrict to decisions made in this project.
    pub project: Option<String>,
    /// Restrict to runs carrying this external trace identifier (routed via
    /// a subquery on runs).
    pub trace_id: Option<String>,
    /// Include superseded (historical) decisions; defaults to current-only.
    pub include_superseded: bool,
}

/// Sortable decision columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrder {
    /// Order by confidence.
    Confidence,
    /// Order by start of validity.
    ValidFrom,
    /// Order by decision type.
    DecisionType,
    /// Order by outcome text.
    Outcome,
    /// Order by completeness score.
    CompletenessScore,
    /// Deprecated alias for [`DecisionOrder::CompletenessScore`]; accepted
    /// for one deprecation cycle and remapped silently.
    QualityScore,
}

impl DecisionOrder {
    /// Returns the SQL column this ordering maps to.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Confidence => "confidence",
            Self::ValidFrom => "valid_from",
            Self::DecisionType => "decision_type",
            Self::Outcome => "outcome",
            Self::CompletenessScore | Self::QualityScore => "completeness_score",
        }
    }

    /// Parses an ordering label, honoring the deprecated alias.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "confidence" => Some(Self::Confidence),
            "valid_from" => Some(Self::ValidFrom),
            "decision_type" => Some(Self::DecisionType),
            "outcome" => Some(Self::Outcome),
            "completeness_score" => Some(Self::CompletenessScore),
            "quality_score" => Some(Self::QualityScore),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl OrderDirection {
    /// Returns the SQL keyword for this direction.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Child records to hydrate alongside query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionInclude {
    /// Fetch alternatives in one batch query.
    pub alternatives: bool,
    /// Fetch evidence in one batch query.
    pub evidence: bool,
}

// ============================================================================
// SECTION: Outcome Signals
// ============================================================================

/// How a decision's conflicts concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictFate {
    /// Conflicts this decision won.
    pub won: i64,
    /// Conflicts the other side won.
    pub lost: i64,
    /// Conflicts resolved without a winner.
    pub resolved_no_winner: i64,
}

/// Derived outcome signals for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSignals {
    /// Subject decision.
    pub decision_id: DecisionId,
    /// Hours between this decision's `valid_from` and its superseder's;
    /// null while never superseded.
    pub supersession_velocity_hours: Option<f64>,
    /// Count of current decisions citing this one as precedent.
    pub precedent_citation_count: i64,
    /// Aggregated conflict outcomes.
    pub conflict_fate: ConflictFate,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::DecisionOrder;
    use super::NewDecision;
    use super::OrderDirection;
    use crate::core::identifiers::RunId;

    #[test]
    fn order_columns_are_whitelisted() {
        assert_eq!(DecisionOrder::Confidence.column(), "confidence");
        assert_eq!(DecisionOrder::ValidFrom.column(), "valid_from");
        assert_eq!(DecisionOrder::DecisionType.column(), "decision_type");
        assert_eq!(DecisionOrder::Outcome.column(), "outcome");
        assert_eq!(DecisionOrder::CompletenessScore.column(), "completeness_score");
    }

    #[test]
    fn quality_score_alias_maps_to_completeness() {
        let parsed = DecisionOrder::parse("quality_score").expect("alias accepted");
        assert_eq!(parsed.column(), "completeness_score");
        assert_eq!(DecisionOrder::parse("relevance"), None);
    }

    #[test]
    fn direction_sql_keywords() {
        assert_eq!(OrderDirection::Asc.as_sql(), "ASC");
        assert_eq!(OrderDirection::Desc.as_sql(), "DESC");
    }

    #[test]
    fn context_fields_are_extracted_as_strings() {
        let mut decision = NewDecision::new(RunId::generate(), "planner", "t", "o", 0.5);
        decision.agent_context = json!({"tool": "editor", "model": 7, "project": "api"});
        assert_eq!(decision.context_str("tool").as_deref(), Some("editor"));
        assert_eq!(decision.context_str("model"), None);
        assert_eq!(decision.context_str("project").as_deref(), Some("api"));
        assert_eq!(decision.context_str("absent"), None);
    }
}
