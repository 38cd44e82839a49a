// crates/trace-ledger-store-postgres/src/deletion.rs
// ============================================================================
// Module: Deletion Engine
// Description: FK-ordered agent data removal with archival logging.
// Purpose: Remove everything an agent owns in one transaction, leaving an
//          audit trail and outbox delete intents behind.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Deletion walks the foreign-key order: evidence, alternatives, claims,
//! conflicts, then decisions (after nulling out cross-references and
//! emitting outbox delete intents), events, runs, grants, API keys, and
//! finally the agent row. Each table first gets a `deletion_audit_log` row
//! with a JSON snapshot, then the delete runs. Partial failure rolls the
//! whole transaction back; nothing is deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use postgres::Transaction;
use serde_json::json;
use time::OffsetDateTime;
use trace_ledger_core::DecisionId;
use trace_ledger_core::OrgId;
use trace_ledger_core::OutboxOperation;
use uuid::Uuid;

use crate::error::StoreError;
use crate::outbox::upsert_outbox_tx;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Audit Snapshot
// ============================================================================

/// Writes one archival row before a table's delete runs.
///
/// The snapshot stores the affected row ids; bulk tables would make full
/// row copies unbounded.
fn log_table_deletion(
    tx: &mut Transaction<'_>,
    org_id: OrgId,
    agent_id: &str,
    table_name: &str,
    ids: &[Uuid],
) -> Result<(), StoreError> {
    let count = i64::try_from(ids.len()).unwrap_or(i64::MAX);
    let snapshot = json!({ "table": table_name, "ids": ids, "row_count": count });
    tx.execute(
        "INSERT INTO deletion_audit_log (id, org_id, agent_id, table_name, row_count, snapshot, \
         deleted_at) VALUES ($1, $2, $3, $4, $5, $6, now())",
        &[&Uuid::new_v4(), &org_id.as_uuid(), &agent_id, &table_name, &count, &snapshot],
    )
    .map_err(|err| StoreError::db("delete_agent_data", &err))?;
    Ok(())
}

/// Collects ids returned by a single-column query.
fn collect_ids(
    tx: &mut Transaction<'_>,
    sql: &str,
    params: &[&(dyn postgres::types::ToSql + Sync)],
) -> Result<Vec<Uuid>, StoreError> {
    let rows = tx.query(sql, params).map_err(|err| StoreError::db("delete_agent_data", &err))?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

// ============================================================================
// SECTION: Operation
// ============================================================================

impl TraceStore {
    /// Deletes everything an agent owns within one transaction, returning
    /// per-table deletion counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown agent, or
    /// [`StoreError`] on driver failure; on error nothing is deleted.
    #[allow(
        clippy::too_many_lines,
        reason = "The FK-ordered walk is kept together so the order stays auditable."
    )]
    pub fn delete_agent_data(
        &self,
        org_id: OrgId,
        agent_id: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let mut conn = self.conn("delete_agent_data")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("delete_agent_data", &err))?;
        let agent_row = tx
            .query_opt(
                "SELECT id FROM agents WHERE org_id = $1 AND agent_id = $2",
                &[&org_id.as_uuid(), &agent_id],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?
            .ok_or(StoreError::NotFound)?;
        let agent_uid: Uuid = agent_row.get(0);
        let started_at = OffsetDateTime::now_utc();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();

        let decision_ids = collect_ids(
            &mut tx,
            "SELECT id FROM decisions WHERE org_id = $1 AND agent_id = $2",
            &[&org_id.as_uuid(), &agent_id],
        )?;

        // Children first: evidence, alternatives, claims.
        let evidence_ids = collect_ids(
            &mut tx,
            "SELECT id FROM evidence WHERE org_id = $1 AND decision_id = ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "evidence", &evidence_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM evidence WHERE org_id = $1 AND decision_id = ANY($2)",
                &[&org_id.as_uuid(), &decision_ids],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("evidence".to_string(), deleted);

        let alternative_ids = collect_ids(
            &mut tx,
            "SELECT a.id FROM alternatives a JOIN decisions d ON d.id = a.decision_id WHERE \
             d.org_id = $1 AND a.decision_id = ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "alternatives", &alternative_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM alternatives WHERE decision_id = ANY($1)",
                &[&decision_ids],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("alternatives".to_string(), deleted);

        let claim_ids = collect_ids(
            &mut tx,
            "SELECT id FROM decision_claims WHERE org_id = $1 AND decision_id = ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "decision_claims", &claim_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM decision_claims WHERE org_id = $1 AND decision_id = ANY($2)",
                &[&org_id.as_uuid(), &decision_ids],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("decision_claims".to_string(), deleted);

        // Conflicts touching any of the agent's decisions or naming the
        // agent on either side.
        let conflict_ids = collect_ids(
            &mut tx,
            "SELECT id FROM scored_conflicts WHERE org_id = $1 AND (decision_a_id = ANY($2) OR \
             decision_b_id = ANY($2) OR agent_a_id = $3 OR agent_b_id = $3)",
            &[&org_id.as_uuid(), &decision_ids, &agent_id],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "scored_conflicts", &conflict_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM scored_conflicts WHERE org_id = $1 AND id = ANY($2)",
                &[&org_id.as_uuid(), &conflict_ids],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("scored_conflicts".to_string(), deleted);

        // Null out references to the doomed decisions, on the agent's own
        // rows and on other agents' rows alike.
        tx.execute(
            "UPDATE decisions SET precedent_ref = NULL WHERE org_id = $1 AND precedent_ref = \
             ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        tx.execute(
            "UPDATE decisions SET supersedes_id = NULL WHERE org_id = $1 AND supersedes_id = \
             ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("delete_agent_data", &err))?;

        // Outbox delete intents so the external index forgets the decisions.
        for decision_id in &decision_ids {
            upsert_outbox_tx(
                &mut tx,
                DecisionId::from_uuid(*decision_id),
                org_id,
                OutboxOperation::Delete,
            )?;
        }
        tx.execute(
            "DELETE FROM search_outbox WHERE org_id = $1 AND decision_id = ANY($2) AND \
             operation = 'upsert'",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("delete_agent_data", &err))?;

        log_table_deletion(&mut tx, org_id, agent_id, "decisions", &decision_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM decisions WHERE org_id = $1 AND id = ANY($2)",
                &[&org_id.as_uuid(), &decision_ids],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("decisions".to_string(), deleted);

        let event_ids = collect_ids(
            &mut tx,
            "SELECT id FROM agent_events WHERE org_id = $1 AND agent_id = $2",
            &[&org_id.as_uuid(), &agent_id],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "agent_events", &event_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM agent_events WHERE org_id = $1 AND agent_id = $2",
                &[&org_id.as_uuid(), &agent_id],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("agent_events".to_string(), deleted);

        let run_ids = collect_ids(
            &mut tx,
            "SELECT id FROM agent_runs WHERE org_id = $1 AND agent_id = $2",
            &[&org_id.as_uuid(), &agent_id],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "agent_runs", &run_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM agent_runs WHERE org_id = $1 AND agent_id = $2",
                &[&org_id.as_uuid(), &agent_id],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("agent_runs".to_string(), deleted);

        let grant_ids = collect_ids(
            &mut tx,
            "SELECT id FROM access_grants WHERE org_id = $1 AND (grantor_agent_id = $2 OR \
             grantee_agent_id = $2)",
            &[&org_id.as_uuid(), &agent_id],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "access_grants", &grant_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM access_grants WHERE org_id = $1 AND (grantor_agent_id = $2 OR \
                 grantee_agent_id = $2)",
                &[&org_id.as_uuid(), &agent_id],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("access_grants".to_string(), deleted);

        let key_ids = collect_ids(
            &mut tx,
            "SELECT id FROM api_keys WHERE org_id = $1 AND agent_uid = $2",
            &[&org_id.as_uuid(), &agent_uid],
        )?;
        log_table_deletion(&mut tx, org_id, agent_id, "api_keys", &key_ids)?;
        let deleted = tx
            .execute(
                "DELETE FROM api_keys WHERE org_id = $1 AND agent_uid = $2",
                &[&org_id.as_uuid(), &agent_uid],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("api_keys".to_string(), deleted);

        log_table_deletion(&mut tx, org_id, agent_id, "agents", &[agent_uid])?;
        let deleted = tx
            .execute(
                "DELETE FROM agents WHERE org_id = $1 AND id = $2",
                &[&org_id.as_uuid(), &agent_uid],
            )
            .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        counts.insert("agents".to_string(), deleted);

        let counts_json = serde_json::to_value(&counts)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        tx.execute(
            "INSERT INTO deletion_log (id, org_id, trigger, initiated_by, criteria, \
             deleted_counts, started_at, completed_at) VALUES ($1, $2, 'agent_delete', $3, $4, \
             $5, $6, now())",
            &[
                &Uuid::new_v4(),
                &org_id.as_uuid(),
                &agent_id,
                &json!({ "agent_id": agent_id }),
                &counts_json,
                &started_at,
            ],
        )
        .map_err(|err| StoreError::db("delete_agent_data", &err))?;
        tx.commit().map_err(|err| StoreError::db("delete_agent_data", &err))?;
        Ok(counts)
    }
}
