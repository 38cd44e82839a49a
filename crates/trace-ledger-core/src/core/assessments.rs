// crates/trace-ledger-core/src/core/assessments.rs
// ============================================================================
// Module: Decision Assessments
// Description: Append-only per-assessor outcome feedback.
// Purpose: Model assessment history and latest-per-assessor summaries.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Assessments are never updated; an assessor changing their mind appends a
//! new row. Summaries therefore count only the newest row per assessor while
//! the listing surface returns the full history newest-first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::AssessmentId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Vocabulary
// ============================================================================

/// An assessor's verdict on how a decision turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentOutcome {
    /// The decision turned out correct.
    Correct,
    /// The decision turned out incorrect.
    Incorrect,
    /// The decision was partially correct.
    PartiallyCorrect,
}

impl AssessmentOutcome {
    /// Returns the persisted label for this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::PartiallyCorrect => "partially_correct",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "correct" => Some(Self::Correct),
            "incorrect" => Some(Self::Incorrect),
            "partially_correct" => Some(Self::PartiallyCorrect),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// A persisted assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAssessment {
    /// Assessment identifier.
    pub id: AssessmentId,
    /// Assessed decision.
    pub decision_id: DecisionId,
    /// Owning organization.
    pub org_id: OrgId,
    /// External identifier of the assessing agent.
    pub assessor_agent_id: String,
    /// The verdict.
    pub outcome: AssessmentOutcome,
    /// Optional free-form notes.
    pub notes: Option<String>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for appending an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssessment {
    /// Assessed decision; must exist and be current in the org.
    pub decision_id: DecisionId,
    /// External identifier of the assessing agent.
    pub assessor_agent_id: String,
    /// The verdict.
    pub outcome: AssessmentOutcome,
    /// Optional free-form notes.
    pub notes: Option<String>,
}

/// Latest-per-assessor outcome counts for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssessmentSummary {
    /// Assessors whose latest verdict is `correct`.
    pub correct: i64,
    /// Assessors whose latest verdict is `incorrect`.
    pub incorrect: i64,
    /// Assessors whose latest verdict is `partially_correct`.
    pub partially_correct: i64,
}

impl AssessmentSummary {
    /// Total distinct assessors counted in the summary.
    #[must_use]
    pub const fn total(self) -> i64 {
        self.correct + self.incorrect + self.partially_correct
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::AssessmentOutcome;
    use super::AssessmentSummary;

    #[test]
    fn outcome_labels_roundtrip() {
        for outcome in [
            AssessmentOutcome::Correct,
            AssessmentOutcome::Incorrect,
            AssessmentOutcome::PartiallyCorrect,
        ] {
            assert_eq!(AssessmentOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(AssessmentOutcome::parse("maybe"), None);
    }

    #[test]
    fn summary_total_sums_buckets() {
        let summary = AssessmentSummary {
            correct: 2,
            incorrect: 1,
            partially_correct: 3,
        };
        assert_eq!(summary.total(), 6);
        assert_eq!(AssessmentSummary::default().total(), 0);
    }
}
