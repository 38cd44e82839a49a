// crates/trace-ledger-store-postgres/src/assessments.rs
// ============================================================================
// Module: Assessment Store
// Description: Append-only outcome assessments and per-assessor summaries.
// Purpose: Record verdicts on decisions and summarize the newest per
//          assessor.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Creation verifies the referenced decision exists and is current in the
//! org. History is append-only and listed newest-first; summaries count only
//! each assessor's latest row via `DISTINCT ON`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use postgres::Row;
use time::OffsetDateTime;
use trace_ledger_core::AssessmentId;
use trace_ledger_core::AssessmentOutcome;
use trace_ledger_core::AssessmentSummary;
use trace_ledger_core::DecisionAssessment;
use trace_ledger_core::DecisionId;
use trace_ledger_core::NewAssessment;
use trace_ledger_core::OrgId;

use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for assessment selects.
const ASSESSMENT_COLUMNS: &str =
    "id, decision_id, org_id, assessor_agent_id, outcome, notes, created_at";

/// Maps an assessment row to the domain record.
fn row_to_assessment(row: &Row) -> Result<DecisionAssessment, StoreError> {
    let label: String = row.get(4);
    let outcome = AssessmentOutcome::parse(&label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown assessment outcome {label}")))?;
    Ok(DecisionAssessment {
        id: AssessmentId::from_uuid(row.get(0)),
        decision_id: DecisionId::from_uuid(row.get(1)),
        org_id: OrgId::from_uuid(row.get(2)),
        assessor_agent_id: row.get(3),
        outcome,
        notes: row.get(5),
        created_at: row.get(6),
    })
}

/// Folds latest-per-assessor outcome labels into a summary.
fn fold_summary(outcomes: impl Iterator<Item = AssessmentOutcome>) -> AssessmentSummary {
    let mut summary = AssessmentSummary::default();
    for outcome in outcomes {
        match outcome {
            AssessmentOutcome::Correct => summary.correct += 1,
            AssessmentOutcome::Incorrect => summary.incorrect += 1,
            AssessmentOutcome::PartiallyCorrect => summary.partially_correct += 1,
        }
    }
    summary
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Appends an assessment after verifying the decision exists and is
    /// current in the org.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the decision is absent or
    /// superseded, or [`StoreError`] on driver failure.
    pub fn create_assessment(
        &self,
        org_id: OrgId,
        new: &NewAssessment,
    ) -> Result<DecisionAssessment, StoreError> {
        let mut conn = self.conn("create_assessment")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("create_assessment", &err))?;
        let current = tx
            .query_opt(
                "SELECT 1 FROM decisions WHERE org_id = $1 AND id = $2 AND valid_to IS NULL",
                &[&org_id.as_uuid(), &new.decision_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("create_assessment", &err))?;
        if current.is_none() {
            return Err(StoreError::NotFound);
        }
        let id = AssessmentId::generate();
        let now = OffsetDateTime::now_utc();
        tx.execute(
            "INSERT INTO decision_assessments (id, decision_id, org_id, assessor_agent_id, \
             outcome, notes, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &id.as_uuid(),
                &new.decision_id.as_uuid(),
                &org_id.as_uuid(),
                &new.assessor_agent_id,
                &new.outcome.as_str(),
                &new.notes,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_assessment", &err))?;
        tx.commit().map_err(|err| StoreError::db("create_assessment", &err))?;
        Ok(DecisionAssessment {
            id,
            decision_id: new.decision_id,
            org_id,
            assessor_agent_id: new.assessor_agent_id.clone(),
            outcome: new.outcome,
            notes: new.notes.clone(),
            created_at: now,
        })
    }

    /// Lists a decision's assessment history, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_assessments(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
        limit: Option<i64>,
    ) -> Result<Vec<DecisionAssessment>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let mut conn = self.conn("list_assessments")?;
        let sql = format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM decision_assessments WHERE org_id = $1 AND \
             decision_id = $2 ORDER BY created_at DESC LIMIT $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &decision_id.as_uuid(), &limit])
            .map_err(|err| StoreError::db("list_assessments", &err))?;
        rows.iter().map(row_to_assessment).collect()
    }

    /// Summarizes a decision's assessments, counting only the newest row
    /// per assessor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_assessment_summary(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
    ) -> Result<AssessmentSummary, StoreError> {
        let mut conn = self.conn("get_assessment_summary")?;
        let rows = conn
            .query(
                "SELECT DISTINCT ON (assessor_agent_id) outcome FROM decision_assessments \
                 WHERE org_id = $1 AND decision_id = $2 ORDER BY assessor_agent_id, created_at \
                 DESC",
                &[&org_id.as_uuid(), &decision_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("get_assessment_summary", &err))?;
        let outcomes = rows.iter().filter_map(|row| {
            let label: String = row.get(0);
            AssessmentOutcome::parse(&label)
        });
        Ok(fold_summary(outcomes))
    }

    /// Batch variant of the summary, keyed by decision id. Decisions with
    /// no assessments are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_assessment_summaries(
        &self,
        org_id: OrgId,
        decision_ids: &[DecisionId],
    ) -> Result<BTreeMap<DecisionId, AssessmentSummary>, StoreError> {
        if decision_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let raw_ids: Vec<uuid::Uuid> = decision_ids.iter().map(|id| id.as_uuid()).collect();
        let mut conn = self.conn("get_assessment_summaries")?;
        let rows = conn
            .query(
                "SELECT DISTINCT ON (decision_id, assessor_agent_id) decision_id, outcome FROM \
                 decision_assessments WHERE org_id = $1 AND decision_id = ANY($2) ORDER BY \
                 decision_id, assessor_agent_id, created_at DESC",
                &[&org_id.as_uuid(), &raw_ids],
            )
            .map_err(|err| StoreError::db("get_assessment_summaries", &err))?;
        let mut grouped: BTreeMap<DecisionId, Vec<AssessmentOutcome>> = BTreeMap::new();
        for row in &rows {
            let decision_id = DecisionId::from_uuid(row.get(0));
            let label: String = row.get(1);
            if let Some(outcome) = AssessmentOutcome::parse(&label) {
                grouped.entry(decision_id).or_default().push(outcome);
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(decision_id, outcomes)| (decision_id, fold_summary(outcomes.into_iter())))
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use trace_ledger_core::AssessmentOutcome;

    use super::fold_summary;

    #[test]
    fn fold_counts_each_bucket() {
        let summary = fold_summary(
            [
                AssessmentOutcome::Correct,
                AssessmentOutcome::Incorrect,
                AssessmentOutcome::Incorrect,
                AssessmentOutcome::PartiallyCorrect,
            ]
            .into_iter(),
        );
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.incorrect, 2);
        assert_eq!(summary.partially_correct, 1);
        assert_eq!(summary.total(), 4);
    }
}
