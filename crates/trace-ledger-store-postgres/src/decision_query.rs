// crates/trace-ledger-store-postgres/src/decision_query.rs
// ============================================================================
// Module: Decision Queries
// Description: Structured and temporal decision queries.
// Purpose: Compile filter objects to scoped WHERE clauses and hydrate
//          children in batch.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! The filter compiler always anchors `org_id = $1` as the first predicate
//! and first positional argument; filters can narrow a query but never widen
//! it across tenants. Default results are current-only (`valid_to IS
//! NULL`). Orderings are restricted to a whitelist, with `quality_score`
//! accepted as a deprecated alias of `completeness_score`. When children are
//! requested they are fetched in one batch query per kind, never per row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::types::ToSql;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use trace_ledger_core::Alternative;
use trace_ledger_core::Decision;
use trace_ledger_core::DecisionFilter;
use trace_ledger_core::DecisionInclude;
use trace_ledger_core::DecisionOrder;
use trace_ledger_core::Evidence;
use trace_ledger_core::OrderDirection;
use trace_ledger_core::OrgId;
use trace_ledger_core::RunId;

use crate::children::batch_alternatives;
use crate::children::batch_evidence;
use crate::decisions::DECISION_COLUMNS;
use crate::decisions::row_to_decision;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Filter Compiler
// ============================================================================

/// A compiled WHERE clause with its owned positional parameters.
///
/// # Invariants
/// - The org scope is always the first clause and the first parameter.
pub(crate) struct SqlFilter {
    /// AND-joined predicate fragments.
    clauses: Vec<String>,
    /// Owned parameter values, positionally matching `$1..$n`.
    params: Vec<Box<dyn ToSql + Sync>>,
}

impl SqlFilter {
    /// Starts a filter scoped to one org.
    pub(crate) fn scoped(org_id: OrgId) -> Self {
        Self::scoped_column(org_id, "org_id")
    }

    /// Starts a filter scoped to one org via a qualified column reference.
    pub(crate) fn scoped_column(org_id: OrgId, column: &str) -> Self {
        Self {
            clauses: vec![format!("{column} = $1")],
            params: vec![Box::new(org_id.as_uuid())],
        }
    }

    /// Appends a parameterized clause; `$?` marks the parameter slot.
    pub(crate) fn push<T: ToSql + Sync + 'static>(&mut self, template: &str, value: T) {
        self.params.push(Box::new(value));
        let placeholder = format!("${}", self.params.len());
        self.clauses.push(template.replace("$?", &placeholder));
    }

    /// Appends a literal clause without parameters.
    pub(crate) fn push_literal(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    /// Returns the AND-joined WHERE body.
    pub(crate) fn where_sql(&self) -> String {
        self.clauses.join(" AND ")
    }

    /// Returns the parameter count allocated so far.
    #[cfg(test)]
    pub(crate) fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Appends a trailing parameter (LIMIT/OFFSET) and returns its
    /// placeholder.
    pub(crate) fn push_trailing<T: ToSql + Sync + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    /// Borrows the parameters for statement execution.
    pub(crate) fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(AsRef::as_ref).collect()
    }
}

/// Compiles a decision filter into a scoped WHERE clause.
pub(crate) fn compile_decision_filter(org_id: OrgId, filter: &DecisionFilter) -> SqlFilter {
    let mut sql = SqlFilter::scoped(org_id);
    if !filter.include_superseded {
        sql.push_literal("valid_to IS NULL");
    }
    if !filter.agent_ids.is_empty() {
        sql.push("agent_id = ANY($?)", filter.agent_ids.clone());
    }
    if let Some(run_id) = filter.run_id {
        sql.push("run_id = $?", run_id.as_uuid());
    }
    if let Some(decision_type) = &filter.decision_type {
        sql.push("decision_type = $?", decision_type.clone());
    }
    if let Some(confidence_min) = filter.confidence_min {
        sql.push("confidence >= $?", confidence_min);
    }
    if let Some(outcome) = &filter.outcome {
        sql.push("outcome = $?", outcome.clone());
    }
    if let Some(range) = &filter.time_range {
        if let Some(start) = range.start {
            sql.push("valid_from >= $?", start);
        }
        if let Some(end) = range.end {
            sql.push("valid_from <= $?", end);
        }
    }
    if let Some(session_id) = &filter.session_id {
        sql.push("session_id = $?", session_id.clone());
    }
    if let Some(tool) = &filter.tool {
        sql.push("tool = $?", tool.clone());
    }
    if let Some(model) = &filter.model {
        sql.push("model = $?", model.clone());
    }
    if let Some(project) = &filter.project {
        sql.push("project = $?", project.clone());
    }
    if let Some(trace_id) = &filter.trace_id {
        sql.push(
            "run_id IN (SELECT id FROM agent_runs WHERE org_id = $1 AND trace_id = $?)",
            trace_id.clone(),
        );
    }
    sql
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// A query hit with optionally hydrated children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueriedDecision {
    /// The decision row.
    pub decision: Decision,
    /// Alternatives, when requested via include.
    pub alternatives: Vec<Alternative>,
    /// Evidence, when requested via include.
    pub evidence: Vec<Evidence>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Runs a structured decision query. The limit clamps into `[1, 1000]`
    /// with a default of 50; default ordering is `valid_from DESC`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn query_decisions(
        &self,
        org_id: OrgId,
        filter: &DecisionFilter,
        order: Option<DecisionOrder>,
        direction: Option<OrderDirection>,
        limit: Option<i64>,
        offset: i64,
        include: DecisionInclude,
    ) -> Result<Vec<QueriedDecision>, StoreError> {
        let mut sql = compile_decision_filter(org_id, filter);
        let order_column = order.unwrap_or(DecisionOrder::ValidFrom).column();
        let order_direction = direction.unwrap_or(OrderDirection::Desc).as_sql();
        let limit_slot = sql.push_trailing(clamp_limit(limit, 50, 1_000));
        let offset_slot = sql.push_trailing(offset.max(0));
        let statement = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE {} ORDER BY {order_column} \
             {order_direction} LIMIT {limit_slot} OFFSET {offset_slot}",
            sql.where_sql()
        );
        let mut conn = self.conn("query_decisions")?;
        let rows = conn
            .query(statement.as_str(), &sql.params())
            .map_err(|err| StoreError::db("query_decisions", &err))?;
        let decisions: Vec<Decision> = rows.iter().map(row_to_decision).collect();
        let ids: Vec<uuid::Uuid> = decisions.iter().map(|d| d.id.as_uuid()).collect();
        let mut alternatives = if include.alternatives && !ids.is_empty() {
            batch_alternatives(&mut conn, &ids)?
        } else {
            Default::default()
        };
        let mut evidence = if include.evidence && !ids.is_empty() {
            batch_evidence(&mut conn, org_id, &ids)?
        } else {
            Default::default()
        };
        Ok(decisions
            .into_iter()
            .map(|decision| {
                let raw = decision.id.as_uuid();
                QueriedDecision {
                    alternatives: alternatives.remove(&raw).unwrap_or_default(),
                    evidence: evidence.remove(&raw).unwrap_or_default(),
                    decision,
                }
            })
            .collect())
    }

    /// Runs a temporal query: rows visible at `as_of` and domain-valid then
    /// (`transaction_time <= T` and `valid_to` null or after `T`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn query_decisions_as_of(
        &self,
        org_id: OrgId,
        as_of: OffsetDateTime,
        limit: Option<i64>,
    ) -> Result<Vec<Decision>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let mut conn = self.conn("query_decisions_as_of")?;
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = $1 AND transaction_time <= \
             $2 AND (valid_to IS NULL OR valid_to > $2) ORDER BY valid_from DESC LIMIT $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &as_of, &limit])
            .map_err(|err| StoreError::db("query_decisions_as_of", &err))?;
        Ok(rows.iter().map(row_to_decision).collect())
    }

    /// Lists the decisions of one run, current-only, ordered by
    /// `valid_from` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_decisions_by_run(
        &self,
        org_id: OrgId,
        run_id: RunId,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut conn = self.conn("get_decisions_by_run")?;
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = $1 AND run_id = $2 AND \
             valid_to IS NULL ORDER BY valid_from ASC"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &run_id.as_uuid()])
            .map_err(|err| StoreError::db("get_decisions_by_run", &err))?;
        Ok(rows.iter().map(row_to_decision).collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use trace_ledger_core::DecisionFilter;
    use trace_ledger_core::OrgId;
    use trace_ledger_core::RunId;
    use trace_ledger_core::TimeRange;

    use super::compile_decision_filter;

    #[test]
    fn empty_filter_scopes_org_and_currency() {
        let sql = compile_decision_filter(OrgId::generate(), &DecisionFilter::default());
        assert_eq!(sql.where_sql(), "org_id = $1 AND valid_to IS NULL");
        assert_eq!(sql.param_count(), 1);
    }

    #[test]
    fn include_superseded_drops_the_currency_clause() {
        let filter = DecisionFilter {
            include_superseded: true,
            ..DecisionFilter::default()
        };
        let sql = compile_decision_filter(OrgId::generate(), &filter);
        assert_eq!(sql.where_sql(), "org_id = $1");
    }

    #[test]
    fn filters_allocate_sequential_placeholders() {
        let filter = DecisionFilter {
            agent_ids: vec!["planner".to_string()],
            run_id: Some(RunId::generate()),
            decision_type: Some("architecture".to_string()),
            confidence_min: Some(0.5),
            ..DecisionFilter::default()
        };
        let sql = compile_decision_filter(OrgId::generate(), &filter);
        let body = sql.where_sql();
        assert!(body.contains("agent_id = ANY($2)"));
        assert!(body.contains("run_id = $3"));
        assert!(body.contains("decision_type = $4"));
        assert!(body.contains("confidence >= $5"));
        assert_eq!(sql.param_count(), 5);
    }

    #[test]
    fn trace_id_routes_through_runs_subquery_with_org_scope() {
        let filter = DecisionFilter {
            trace_id: Some("ext-123".to_string()),
            ..DecisionFilter::default()
        };
        let sql = compile_decision_filter(OrgId::generate(), &filter);
        assert!(sql.where_sql().contains(
            "run_id IN (SELECT id FROM agent_runs WHERE org_id = $1 AND trace_id = $2)"
        ));
    }

    #[test]
    fn time_range_adds_bound_clauses() {
        let now = time::OffsetDateTime::now_utc();
        let filter = DecisionFilter {
            time_range: Some(TimeRange {
                start: Some(now),
                end: Some(now),
            }),
            ..DecisionFilter::default()
        };
        let sql = compile_decision_filter(OrgId::generate(), &filter);
        assert!(sql.where_sql().contains("valid_from >= $2"));
        assert!(sql.where_sql().contains("valid_from <= $3"));
    }
}
