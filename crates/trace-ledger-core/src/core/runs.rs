// crates/trace-ledger-core/src/core/runs.rs
// ============================================================================
// Module: Agent Runs
// Description: Top-level execution records with a terminal-once lifecycle.
// Purpose: Model run creation, completion, and listing payloads.
// Dependencies: serde, time, serde_json
// ============================================================================

//! ## Overview
//! A run is created in `running` and transitions exactly once to `completed`
//! or `failed`. Completion is idempotent on retry: re-completing an already
//! terminal run succeeds without modifying it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - `Running` is the only non-terminal state; transitions out of a terminal
///   state never happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Execution in progress.
    Running,
    /// Execution finished successfully.
    Completed,
    /// Execution finished with an error.
    Failed,
}

impl RunStatus {
    /// Returns the persisted label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// A persisted agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    /// Run identifier.
    pub id: RunId,
    /// External agent identifier that executed the run.
    pub agent_id: String,
    /// Owning organization.
    pub org_id: OrgId,
    /// Optional external trace correlation identifier.
    pub trace_id: Option<String>,
    /// Optional parent run for nested executions.
    pub parent_run_id: Option<RunId>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// When execution started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When execution reached a terminal state, if it has.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Free-form run metadata (always a JSON object).
    pub metadata: Value,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for creating a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    /// External agent identifier.
    pub agent_id: String,
    /// Optional external trace correlation identifier.
    pub trace_id: Option<String>,
    /// Optional parent run.
    pub parent_run_id: Option<RunId>,
    /// Free-form metadata; non-object values are normalized to `{}`.
    pub metadata: Value,
}

impl NewRun {
    /// Creates run parameters with empty metadata.
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            trace_id: None,
            parent_run_id: None,
            metadata: Value::Null,
        }
    }
}

/// Normalizes free-form metadata to a JSON object.
#[must_use]
pub fn normalized_metadata(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        _ => Value::Object(serde_json::Map::new()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::NewRun;
    use super::RunStatus;
    use super::normalized_metadata;

    #[test]
    fn status_labels_roundtrip() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("paused"), None);
    }

    #[test]
    fn terminal_states_are_completed_and_failed() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn metadata_normalizes_non_objects_to_empty() {
        assert_eq!(normalized_metadata(&json!({"k": 1})), json!({"k": 1}));
        assert_eq!(normalized_metadata(&json!(null)), json!({}));
        assert_eq!(normalized_metadata(&json!([1, 2])), json!({}));
    }

    #[test]
    fn new_run_defaults_are_empty() {
        let run = NewRun::new("planner");
        assert_eq!(run.agent_id, "planner");
        assert!(run.trace_id.is_none());
        assert!(run.parent_run_id.is_none());
    }
}
