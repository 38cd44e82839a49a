// crates/trace-ledger-store-postgres/src/conflicts.rs
// ============================================================================
// Module: Conflict Store
// Description: Pairwise conflict rows, scoring refresh, and lifecycle.
// Purpose: Persist detected conflicts and drive them to resolution.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Conflicts are canonicalized before insert so the pair is unique on
//! `(decision_a_id, decision_b_id)`; re-scoring the same pair refreshes the
//! metrics and bumps `detected_at`. Listing joins the decisions table once
//! per side for run, confidence, reasoning, and decided-at. Lifecycle
//! updates signal not-found through the affected row count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use serde_json::json;
use time::OffsetDateTime;
use trace_ledger_core::ConflictFilter;
use trace_ledger_core::ConflictId;
use trace_ledger_core::ConflictKind;
use trace_ledger_core::ConflictResolution;
use trace_ledger_core::ConflictSide;
use trace_ledger_core::ConflictStatus;
use trace_ledger_core::DecisionId;
use trace_ledger_core::NewScoredConflict;
use trace_ledger_core::OrgId;
use trace_ledger_core::RunId;
use trace_ledger_core::ScoredConflict;

use crate::decision_query::SqlFilter;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Select List
// ============================================================================

/// Joined select list; order is load-bearing for [`row_to_conflict`].
const CONFLICT_SELECT: &str = "SELECT c.id, c.org_id, c.conflict_kind, c.decision_a_id, \
                               c.agent_a_id, c.decision_type_a, c.outcome_a, da.run_id, \
                               da.confidence, da.reasoning, da.valid_from, c.decision_b_id, \
                               c.agent_b_id, c.decision_type_b, c.outcome_b, db.run_id, \
                               db.confidence, db.reasoning, db.valid_from, c.detected_at, \
                               c.topic_similarity, c.outcome_divergence, c.significance, \
                               c.scoring_method, c.explanation, c.category, c.severity, \
                               c.status, c.resolved_by, c.resolved_at, c.resolution_note, \
                               c.resolution_decision_id, c.winning_decision_id, \
                               c.relationship, c.confidence_weight, c.temporal_decay FROM \
                               scored_conflicts c LEFT JOIN decisions da ON da.org_id = \
                               c.org_id AND da.id = c.decision_a_id LEFT JOIN decisions db ON \
                               db.org_id = c.org_id AND db.id = c.decision_b_id";

/// Maps a joined conflict row to the domain record.
fn row_to_conflict(row: &Row) -> Result<ScoredConflict, StoreError> {
    let kind_label: String = row.get(2);
    let conflict_kind = ConflictKind::parse(&kind_label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown conflict kind {kind_label}")))?;
    let status_label: String = row.get(27);
    let status = ConflictStatus::parse(&status_label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown conflict status {status_label}")))?;
    Ok(ScoredConflict {
        id: ConflictId::from_uuid(row.get(0)),
        org_id: OrgId::from_uuid(row.get(1)),
        conflict_kind,
        side_a: ConflictSide {
            decision_id: DecisionId::from_uuid(row.get(3)),
            agent_id: row.get(4),
            decision_type: row.get(5),
            outcome: row.get(6),
            run_id: row.get::<_, Option<uuid::Uuid>>(7).map(RunId::from_uuid),
            confidence: row.get(8),
            reasoning: row.get(9),
            decided_at: row.get(10),
        },
        side_b: ConflictSide {
            decision_id: DecisionId::from_uuid(row.get(11)),
            agent_id: row.get(12),
            decision_type: row.get(13),
            outcome: row.get(14),
            run_id: row.get::<_, Option<uuid::Uuid>>(15).map(RunId::from_uuid),
            confidence: row.get(16),
            reasoning: row.get(17),
            decided_at: row.get(18),
        },
        detected_at: row.get(19),
        topic_similarity: row.get(20),
        outcome_divergence: row.get(21),
        significance: row.get(22),
        scoring_method: row.get(23),
        explanation: row.get(24),
        category: row.get(25),
        severity: row.get(26),
        status,
        resolved_by: row.get(28),
        resolved_at: row.get(29),
        resolution_note: row.get(30),
        resolution_decision_id: row.get::<_, Option<uuid::Uuid>>(31).map(DecisionId::from_uuid),
        winning_decision_id: row.get::<_, Option<uuid::Uuid>>(32).map(DecisionId::from_uuid),
        relationship: row.get(33),
        confidence_weight: row.get(34),
        temporal_decay: row.get(35),
    })
}

// ============================================================================
// SECTION: Filter Compiler
// ============================================================================

/// Compiles a conflict filter into a scoped WHERE clause over alias `c`.
fn compile_conflict_filter(org_id: OrgId, filter: &ConflictFilter) -> SqlFilter {
    let mut sql = SqlFilter::scoped_column(org_id, "c.org_id");
    if let Some(decision_type) = &filter.decision_type {
        sql.push(
            "(lower(trim(c.decision_type_a)) = lower(trim($?)) OR lower(trim(\
             c.decision_type_b)) = lower(trim($?)))",
            decision_type.clone(),
        );
    }
    if let Some(agent_id) = &filter.agent_id {
        sql.push("(c.agent_a_id = $? OR c.agent_b_id = $?)", agent_id.clone());
    }
    if let Some(kind) = filter.conflict_kind {
        sql.push("c.conflict_kind = $?", kind.as_str());
    }
    if let Some(status) = filter.status {
        sql.push("c.status = $?", status.as_str());
    }
    if let Some(severity) = &filter.severity {
        sql.push("c.severity = $?", severity.clone());
    }
    if let Some(category) = &filter.category {
        sql.push("c.category = $?", category.clone());
    }
    sql
}

// ============================================================================
// SECTION: Insert and Re-Score
// ============================================================================

impl TraceStore {
    /// Inserts or re-scores a conflict. The pair is canonicalized so the
    /// lexicographically smaller decision id is side A; on conflict the
    /// scoring fields refresh and `detected_at` bumps.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn insert_scored_conflict(
        &self,
        org_id: OrgId,
        conflict: NewScoredConflict,
    ) -> Result<ConflictId, StoreError> {
        let canonical = conflict.canonicalized();
        let mut conn = self.conn("insert_scored_conflict")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("insert_scored_conflict", &err))?;
        let id = ConflictId::generate();
        let row = tx
            .query_one(
                "INSERT INTO scored_conflicts (id, org_id, conflict_kind, decision_a_id, \
                 decision_b_id, agent_a_id, agent_b_id, decision_type_a, decision_type_b, \
                 outcome_a, outcome_b, detected_at, topic_similarity, outcome_divergence, \
                 significance, scoring_method, explanation, category, severity, status, \
                 relationship, confidence_weight, temporal_decay) VALUES ($1, $2, $3, $4, $5, \
                 $6, $7, $8, $9, $10, $11, now(), $12, $13, $14, $15, $16, $17, $18, 'open', \
                 $19, $20, $21) ON CONFLICT (decision_a_id, decision_b_id) DO UPDATE SET \
                 conflict_kind = EXCLUDED.conflict_kind, topic_similarity = \
                 EXCLUDED.topic_similarity, outcome_divergence = EXCLUDED.outcome_divergence, \
                 significance = EXCLUDED.significance, scoring_method = \
                 EXCLUDED.scoring_method, explanation = EXCLUDED.explanation, relationship = \
                 EXCLUDED.relationship, confidence_weight = EXCLUDED.confidence_weight, \
                 temporal_decay = EXCLUDED.temporal_decay, detected_at = now() RETURNING id",
                &[
                    &id.as_uuid(),
                    &org_id.as_uuid(),
                    &canonical.conflict_kind.as_str(),
                    &canonical.decision_a_id.as_uuid(),
                    &canonical.decision_b_id.as_uuid(),
                    &canonical.agent_a_id,
                    &canonical.agent_b_id,
                    &canonical.decision_type_a,
                    &canonical.decision_type_b,
                    &canonical.outcome_a,
                    &canonical.outcome_b,
                    &canonical.topic_similarity,
                    &canonical.outcome_divergence,
                    &canonical.significance,
                    &canonical.scoring_method,
                    &canonical.explanation,
                    &canonical.category,
                    &canonical.severity,
                    &canonical.relationship,
                    &canonical.confidence_weight,
                    &canonical.temporal_decay,
                ],
            )
            .map_err(|err| StoreError::db("insert_scored_conflict", &err))?;
        let stored_id = ConflictId::from_uuid(row.get(0));
        let payload = json!({ "conflict_id": stored_id, "org_id": org_id }).to_string();
        tx.execute("SELECT pg_notify('conflicts', $1)", &[&payload])
            .map_err(|err| StoreError::db("insert_scored_conflict", &err))?;
        tx.commit().map_err(|err| StoreError::db("insert_scored_conflict", &err))?;
        Ok(stored_id)
    }
}

// ============================================================================
// SECTION: Listing and Counting
// ============================================================================

impl TraceStore {
    /// Lists conflicts matching the filter, newest detection first. The
    /// limit clamps into `[1, 1000]` with a default of 50.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_conflicts(
        &self,
        org_id: OrgId,
        filter: &ConflictFilter,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let mut sql = compile_conflict_filter(org_id, filter);
        let limit_slot = sql.push_trailing(clamp_limit(limit, 50, 1_000));
        let offset_slot = sql.push_trailing(offset.max(0));
        let statement = format!(
            "{CONFLICT_SELECT} WHERE {} ORDER BY c.detected_at DESC LIMIT {limit_slot} OFFSET \
             {offset_slot}",
            sql.where_sql()
        );
        let mut conn = self.conn("list_conflicts")?;
        let rows = conn
            .query(statement.as_str(), &sql.params())
            .map_err(|err| StoreError::db("list_conflicts", &err))?;
        rows.iter().map(row_to_conflict).collect()
    }

    /// Counts conflicts matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn count_conflicts(
        &self,
        org_id: OrgId,
        filter: &ConflictFilter,
    ) -> Result<i64, StoreError> {
        let sql = compile_conflict_filter(org_id, filter);
        let statement =
            format!("SELECT count(*) FROM scored_conflicts c WHERE {}", sql.where_sql());
        let mut conn = self.conn("count_conflicts")?;
        let row = conn
            .query_one(statement.as_str(), &sql.params())
            .map_err(|err| StoreError::db("count_conflicts", &err))?;
        Ok(row.get(0))
    }

    /// Lists conflicts detected after `since`, oldest first, feeding the
    /// change-stream consumers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn new_conflicts_since(
        &self,
        org_id: OrgId,
        since: OffsetDateTime,
        limit: Option<i64>,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let statement = format!(
            "{CONFLICT_SELECT} WHERE c.org_id = $1 AND c.detected_at > $2 ORDER BY \
             c.detected_at ASC LIMIT $3"
        );
        let mut conn = self.conn("new_conflicts_since")?;
        let rows = conn
            .query(statement.as_str(), &[&org_id.as_uuid(), &since, &limit])
            .map_err(|err| StoreError::db("new_conflicts_since", &err))?;
        rows.iter().map(row_to_conflict).collect()
    }

    /// Lists every conflict involving one decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_conflicts_by_decision(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let statement = format!(
            "{CONFLICT_SELECT} WHERE c.org_id = $1 AND (c.decision_a_id = $2 OR c.decision_b_id \
             = $2) ORDER BY c.detected_at DESC"
        );
        let mut conn = self.conn("get_conflicts_by_decision")?;
        let rows = conn
            .query(statement.as_str(), &[&org_id.as_uuid(), &decision_id.as_uuid()])
            .map_err(|err| StoreError::db("get_conflicts_by_decision", &err))?;
        rows.iter().map(row_to_conflict).collect()
    }
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

impl TraceStore {
    /// Acknowledges an open conflict (status-only update).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no open conflict matches, or
    /// [`StoreError`] on driver failure.
    pub fn acknowledge_conflict(
        &self,
        org_id: OrgId,
        conflict_id: ConflictId,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("acknowledge_conflict")?;
        let updated = conn
            .execute(
                "UPDATE scored_conflicts SET status = 'acknowledged' WHERE org_id = $1 AND id = \
                 $2 AND status = 'open'",
                &[&org_id.as_uuid(), &conflict_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("acknowledge_conflict", &err))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Resolves a conflict to `resolved` or `wont_fix`. A winning decision,
    /// when named, must be one of the pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a non-terminal target status or a
    /// winner outside the pair, [`StoreError::NotFound`] when no open or
    /// acknowledged conflict matches, or [`StoreError`] on driver failure.
    pub fn resolve_conflict(
        &self,
        org_id: OrgId,
        conflict_id: ConflictId,
        resolution: &ConflictResolution,
    ) -> Result<(), StoreError> {
        if !resolution.status.is_terminal() {
            return Err(StoreError::Invalid("resolution status must be terminal".to_string()));
        }
        let mut conn = self.conn("resolve_conflict")?;
        if let Some(winner) = resolution.winning_decision_id {
            let pair = conn
                .query_opt(
                    "SELECT decision_a_id, decision_b_id FROM scored_conflicts WHERE org_id = \
                     $1 AND id = $2",
                    &[&org_id.as_uuid(), &conflict_id.as_uuid()],
                )
                .map_err(|err| StoreError::db("resolve_conflict", &err))?
                .ok_or(StoreError::NotFound)?;
            let side_a: uuid::Uuid = pair.get(0);
            let side_b: uuid::Uuid = pair.get(1);
            if winner.as_uuid() != side_a && winner.as_uuid() != side_b {
                return Err(StoreError::Invalid(
                    "winning decision must be one of the conflict pair".to_string(),
                ));
            }
        }
        let updated = conn
            .execute(
                "UPDATE scored_conflicts SET status = $3, resolved_by = $4, resolved_at = \
                 now(), resolution_note = $5, resolution_decision_id = $6, winning_decision_id \
                 = $7 WHERE org_id = $1 AND id = $2 AND status IN ('open', 'acknowledged')",
                &[
                    &org_id.as_uuid(),
                    &conflict_id.as_uuid(),
                    &resolution.status.as_str(),
                    &resolution.resolved_by,
                    &resolution.resolution_note,
                    &resolution.resolution_decision_id.map(DecisionId::as_uuid),
                    &resolution.winning_decision_id.map(DecisionId::as_uuid),
                ],
            )
            .map_err(|err| StoreError::db("resolve_conflict", &err))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use trace_ledger_core::ConflictFilter;
    use trace_ledger_core::ConflictKind;
    use trace_ledger_core::ConflictStatus;
    use trace_ledger_core::OrgId;

    use super::compile_conflict_filter;

    #[test]
    fn empty_filter_scopes_org_only() {
        let sql = compile_conflict_filter(OrgId::generate(), &ConflictFilter::default());
        assert_eq!(sql.where_sql(), "c.org_id = $1");
    }

    #[test]
    fn decision_type_match_is_case_insensitive_on_both_sides() {
        let filter = ConflictFilter {
            decision_type: Some("Architecture".to_string()),
            ..ConflictFilter::default()
        };
        let sql = compile_conflict_filter(OrgId::generate(), &filter);
        let body = sql.where_sql();
        assert!(body.contains("lower(trim(c.decision_type_a)) = lower(trim($2))"));
        assert!(body.contains("lower(trim(c.decision_type_b)) = lower(trim($2))"));
        assert_eq!(sql.param_count(), 2);
    }

    #[test]
    fn composed_filters_share_sequential_slots() {
        let filter = ConflictFilter {
            agent_id: Some("planner".to_string()),
            conflict_kind: Some(ConflictKind::CrossAgent),
            status: Some(ConflictStatus::Open),
            ..ConflictFilter::default()
        };
        let sql = compile_conflict_filter(OrgId::generate(), &filter);
        let body = sql.where_sql();
        assert!(body.contains("(c.agent_a_id = $2 OR c.agent_b_id = $2)"));
        assert!(body.contains("c.conflict_kind = $3"));
        assert!(body.contains("c.status = $4"));
    }
}
