// crates/trace-ledger-store-postgres/src/retention.rs
// ============================================================================
// Module: Retention Engine
// Description: Age-based purge honoring legal holds and type exclusions.
// Purpose: Remove expired decisions in batches and drop aged event
//          partitions, with a deletion-log record per run.
// Dependencies: postgres, time
// ============================================================================

//! ## Overview
//! A run computes `cutoff = now - retention_days` and repeatedly selects up
//! to `batch_size` eligible decision ids: created before the cutoff, not of
//! an excluded type, and not covered by any active legal hold. Each batch
//! deletes children, nulls cross-references, emits outbox delete intents,
//! removes conflicts, and finally the decisions, in its own transaction.
//! After the batches, event partitions wholly older than the cutoff are
//! dropped, and a `deletion_log` row documents the run. Legal holds also
//! have their own create/release/list surface here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;
use trace_ledger_core::DecisionId;
use trace_ledger_core::DeletionLogEntry;
use trace_ledger_core::HoldId;
use trace_ledger_core::LegalHold;
use trace_ledger_core::NewLegalHold;
use trace_ledger_core::OrgId;
use trace_ledger_core::OutboxOperation;
use trace_ledger_core::RetentionOutcome;
use uuid::Uuid;

use crate::error::StoreError;
use crate::events::partition_name;
use crate::outbox::upsert_outbox_tx;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default purge batch size.
const DEFAULT_BATCH_SIZE: i64 = 1_000;

/// Eligible-decision select shared by the batch loop.
const ELIGIBLE_SQL: &str = "SELECT d.id FROM decisions d WHERE d.org_id = $1 AND d.created_at < \
                            $2 AND NOT (d.decision_type = ANY($3)) AND NOT EXISTS (SELECT 1 \
                            FROM retention_holds h WHERE h.org_id = $1 AND h.released_at IS \
                            NULL AND d.created_at >= h.hold_start AND d.created_at <= \
                            h.hold_end AND (h.decision_types IS NULL OR d.decision_type = \
                            ANY(h.decision_types)) AND (h.agent_ids IS NULL OR d.agent_id = \
                            ANY(h.agent_ids))) ORDER BY d.created_at ASC LIMIT $4";

// ============================================================================
// SECTION: Batch Delete
// ============================================================================

/// Deletes one batch of decisions and their dependents.
fn purge_batch(
    tx: &mut Transaction<'_>,
    org_id: OrgId,
    decision_ids: &[Uuid],
    outcome: &mut RetentionOutcome,
) -> Result<(), StoreError> {
    let mut bump = |table: &str, rows: u64| {
        *outcome.deleted.entry(table.to_string()).or_insert(0) += rows;
    };
    let deleted = tx
        .execute(
            "DELETE FROM evidence WHERE org_id = $1 AND decision_id = ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("run_retention", &err))?;
    bump("evidence", deleted);
    let deleted = tx
        .execute(
            "DELETE FROM alternatives WHERE decision_id = ANY($1)",
            &[&decision_ids],
        )
        .map_err(|err| StoreError::db("run_retention", &err))?;
    bump("alternatives", deleted);
    let deleted = tx
        .execute(
            "DELETE FROM decision_claims WHERE org_id = $1 AND decision_id = ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("run_retention", &err))?;
    bump("decision_claims", deleted);
    tx.execute(
        "UPDATE decisions SET precedent_ref = NULL WHERE org_id = $1 AND precedent_ref = ANY($2)",
        &[&org_id.as_uuid(), &decision_ids],
    )
    .map_err(|err| StoreError::db("run_retention", &err))?;
    tx.execute(
        "UPDATE decisions SET supersedes_id = NULL WHERE org_id = $1 AND supersedes_id = ANY($2)",
        &[&org_id.as_uuid(), &decision_ids],
    )
    .map_err(|err| StoreError::db("run_retention", &err))?;
    for decision_id in decision_ids {
        upsert_outbox_tx(tx, DecisionId::from_uuid(*decision_id), org_id, OutboxOperation::Delete)?;
    }
    tx.execute(
        "DELETE FROM search_outbox WHERE org_id = $1 AND decision_id = ANY($2) AND operation = \
         'upsert'",
        &[&org_id.as_uuid(), &decision_ids],
    )
    .map_err(|err| StoreError::db("run_retention", &err))?;
    let deleted = tx
        .execute(
            "DELETE FROM scored_conflicts WHERE org_id = $1 AND (decision_a_id = ANY($2) OR \
             decision_b_id = ANY($2))",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("run_retention", &err))?;
    bump("scored_conflicts", deleted);
    let deleted = tx
        .execute(
            "DELETE FROM decisions WHERE org_id = $1 AND id = ANY($2)",
            &[&org_id.as_uuid(), &decision_ids],
        )
        .map_err(|err| StoreError::db("run_retention", &err))?;
    bump("decisions", deleted);
    Ok(())
}

// ============================================================================
// SECTION: Engine
// ============================================================================

impl TraceStore {
    /// Runs one retention pass for an org. A null `retention_days` on the
    /// org means keep forever and the run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown org, or
    /// [`StoreError`] on driver failure. A failed batch leaves earlier
    /// batches committed.
    pub fn run_retention(
        &self,
        org_id: OrgId,
        initiated_by: &str,
        batch_size: Option<i64>,
    ) -> Result<RetentionOutcome, StoreError> {
        let org = self.get_organization(org_id)?;
        let Some(retention_days) = org.retention_days else {
            return Ok(RetentionOutcome::empty());
        };
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).clamp(1, 10_000);
        let started_at = OffsetDateTime::now_utc();
        let cutoff = started_at - Duration::days(i64::from(retention_days));
        let mut outcome = RetentionOutcome::empty();
        outcome.cutoff = Some(cutoff);
        loop {
            let mut conn = self.conn("run_retention")?;
            let mut tx =
                conn.transaction().map_err(|err| StoreError::db("run_retention", &err))?;
            let rows = tx
                .query(
                    ELIGIBLE_SQL,
                    &[
                        &org_id.as_uuid(),
                        &cutoff,
                        &org.retention_exclude_types,
                        &batch_size,
                    ],
                )
                .map_err(|err| StoreError::db("run_retention", &err))?;
            if rows.is_empty() {
                break;
            }
            let decision_ids: Vec<Uuid> = rows.iter().map(|row| row.get(0)).collect();
            purge_batch(&mut tx, org_id, &decision_ids, &mut outcome)?;
            tx.commit().map_err(|err| StoreError::db("run_retention", &err))?;
            outcome.batches += 1;
        }
        let dropped = self.drop_event_partitions_before(cutoff)?;
        if dropped > 0 {
            outcome.deleted.insert("agent_events_partitions".to_string(), dropped);
        }
        let counts_json = serde_json::to_value(&outcome.deleted)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let mut conn = self.conn("run_retention")?;
        conn.execute(
            "INSERT INTO deletion_log (id, org_id, trigger, initiated_by, criteria, \
             deleted_counts, started_at, completed_at) VALUES ($1, $2, 'retention', $3, $4, $5, \
             $6, now())",
            &[
                &Uuid::new_v4(),
                &org_id.as_uuid(),
                &initiated_by,
                &json!({
                    "retention_days": retention_days,
                    "exclude_types": org.retention_exclude_types,
                    "batch_size": batch_size,
                }),
                &counts_json,
                &started_at,
            ],
        )
        .map_err(|err| StoreError::db("run_retention", &err))?;
        Ok(outcome)
    }

    /// Drops monthly event partitions whose whole range is older than the
    /// cutoff. Returns the number of partitions dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    fn drop_event_partitions_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut conn = self.conn("drop_event_partitions")?;
        let rows = conn
            .query(
                "SELECT c.relname FROM pg_inherits i JOIN pg_class c ON c.oid = i.inhrelid JOIN \
                 pg_class p ON p.oid = i.inhparent WHERE p.relname = 'agent_events'",
                &[],
            )
            .map_err(|err| StoreError::db("drop_event_partitions", &err))?;
        // A partition named agent_events_YYYYMM is droppable when its month
        // strictly precedes the cutoff's month.
        let cutoff_tag = partition_name(cutoff);
        let mut dropped = 0_u64;
        for row in &rows {
            let name: String = row.get(0);
            if name.len() == cutoff_tag.len()
                && name.starts_with("agent_events_")
                && name < cutoff_tag
            {
                let ddl = format!("DROP TABLE IF EXISTS {name}");
                conn.batch_execute(&ddl)
                    .map_err(|err| StoreError::db("drop_event_partitions", &err))?;
                dropped += 1;
            }
        }
        Ok(dropped)
    }
}

// ============================================================================
// SECTION: Legal Holds
// ============================================================================

/// Column list for hold selects.
const HOLD_COLUMNS: &str = "id, org_id, reason, hold_start, hold_end, decision_types, \
                            agent_ids, created_at, released_at";

/// Maps a hold row to the domain record.
fn row_to_hold(row: &Row) -> LegalHold {
    LegalHold {
        id: HoldId::from_uuid(row.get(0)),
        org_id: OrgId::from_uuid(row.get(1)),
        reason: row.get(2),
        hold_start: row.get(3),
        hold_end: row.get(4),
        decision_types: row.get(5),
        agent_ids: row.get(6),
        created_at: row.get(7),
        released_at: row.get(8),
    }
}

impl TraceStore {
    /// Places a legal hold.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn create_legal_hold(
        &self,
        org_id: OrgId,
        new: &NewLegalHold,
    ) -> Result<LegalHold, StoreError> {
        let mut conn = self.conn("create_legal_hold")?;
        let id = HoldId::generate();
        let now = OffsetDateTime::now_utc();
        conn.execute(
            "INSERT INTO retention_holds (id, org_id, reason, hold_start, hold_end, \
             decision_types, agent_ids, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &id.as_uuid(),
                &org_id.as_uuid(),
                &new.reason,
                &new.hold_start,
                &new.hold_end,
                &new.decision_types,
                &new.agent_ids,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_legal_hold", &err))?;
        Ok(LegalHold {
            id,
            org_id,
            reason: new.reason.clone(),
            hold_start: new.hold_start,
            hold_end: new.hold_end,
            decision_types: new.decision_types.clone(),
            agent_ids: new.agent_ids.clone(),
            created_at: now,
            released_at: None,
        })
    }

    /// Releases a hold; its covered rows become purgeable again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no active hold matches, or
    /// [`StoreError`] on driver failure.
    pub fn release_legal_hold(&self, org_id: OrgId, hold_id: HoldId) -> Result<(), StoreError> {
        let mut conn = self.conn("release_legal_hold")?;
        let updated = conn
            .execute(
                "UPDATE retention_holds SET released_at = now() WHERE org_id = $1 AND id = $2 \
                 AND released_at IS NULL",
                &[&org_id.as_uuid(), &hold_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("release_legal_hold", &err))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Lists an org's deletion log, newest run first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_deletion_log(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
    ) -> Result<Vec<DeletionLogEntry>, StoreError> {
        let limit = limit.unwrap_or(50).clamp(1, 1_000);
        let mut conn = self.conn("list_deletion_log")?;
        let rows = conn
            .query(
                "SELECT id, org_id, trigger, initiated_by, criteria, deleted_counts, \
                 started_at, completed_at FROM deletion_log WHERE org_id = $1 ORDER BY \
                 completed_at DESC LIMIT $2",
                &[&org_id.as_uuid(), &limit],
            )
            .map_err(|err| StoreError::db("list_deletion_log", &err))?;
        Ok(rows
            .iter()
            .map(|row| DeletionLogEntry {
                id: row.get(0),
                org_id: OrgId::from_uuid(row.get(1)),
                trigger: row.get(2),
                initiated_by: row.get(3),
                criteria: row.get(4),
                deleted_counts: row.get(5),
                started_at: row.get(6),
                completed_at: row.get(7),
            })
            .collect())
    }

    /// Lists an org's holds, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_legal_holds(&self, org_id: OrgId) -> Result<Vec<LegalHold>, StoreError> {
        let mut conn = self.conn("list_legal_holds")?;
        let sql = format!(
            "SELECT {HOLD_COLUMNS} FROM retention_holds WHERE org_id = $1 ORDER BY created_at \
             DESC"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid()])
            .map_err(|err| StoreError::db("list_legal_holds", &err))?;
        Ok(rows.iter().map(row_to_hold).collect())
    }
}
