// crates/trace-ledger-store-postgres/src/outbox.rs
// ============================================================================
// Module: Search Outbox
// Description: Transactional-outbox rows feeding the external vector index.
// Purpose: Persist replication intents atomically with their mutations.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Producers (decision create, revise, embedding backfill, deletion and
//! retention engines) upsert rows inside their own transactions; a row only
//! becomes visible when the mutation commits. On conflict the row is
//! refreshed: `created_at = now()`, `attempts = 0`, `locked_until = NULL`,
//! so a re-emitted intent is picked up again by the external indexer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use trace_ledger_core::DecisionId;
use trace_ledger_core::OrgId;
use trace_ledger_core::OutboxOperation;
use trace_ledger_core::SearchOutboxRow;

use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Producer
// ============================================================================

/// Upserts one outbox intent inside an open transaction.
///
/// # Errors
///
/// Returns [`StoreError`] on driver failure; callers must roll back.
pub(crate) fn upsert_outbox_tx(
    tx: &mut Transaction<'_>,
    decision_id: DecisionId,
    org_id: OrgId,
    operation: OutboxOperation,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO search_outbox (decision_id, org_id, operation, attempts, locked_until, \
         created_at) VALUES ($1, $2, $3, 0, NULL, now()) ON CONFLICT (decision_id, operation) DO \
         UPDATE SET created_at = now(), attempts = 0, locked_until = NULL",
        &[&decision_id.as_uuid(), &org_id.as_uuid(), &operation.as_str()],
    )
    .map_err(|err| StoreError::db("upsert_outbox", &err))?;
    Ok(())
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps an outbox row to the domain record.
fn row_to_outbox(row: &Row) -> Result<SearchOutboxRow, StoreError> {
    let label: String = row.get(2);
    let operation = OutboxOperation::parse(&label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown outbox operation {label}")))?;
    Ok(SearchOutboxRow {
        decision_id: DecisionId::from_uuid(row.get(0)),
        org_id: OrgId::from_uuid(row.get(1)),
        operation,
        attempts: row.get(3),
        locked_until: row.get(4),
        created_at: row.get(5),
    })
}

// ============================================================================
// SECTION: Reads
// ============================================================================

impl TraceStore {
    /// Lists pending outbox rows for an org, oldest first. Intended for
    /// observability; the external indexer leases rows with its own SQL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_outbox(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
    ) -> Result<Vec<SearchOutboxRow>, StoreError> {
        let limit = clamp_limit(limit, 100, 1_000);
        let mut conn = self.conn("list_outbox")?;
        let rows = conn
            .query(
                "SELECT decision_id, org_id, operation, attempts, locked_until, created_at FROM \
                 search_outbox WHERE org_id = $1 ORDER BY created_at ASC LIMIT $2",
                &[&org_id.as_uuid(), &limit],
            )
            .map_err(|err| StoreError::db("list_outbox", &err))?;
        rows.iter().map(row_to_outbox).collect()
    }

    /// Fetches a specific outbox intent, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_outbox_row(
        &self,
        decision_id: DecisionId,
        operation: OutboxOperation,
    ) -> Result<Option<SearchOutboxRow>, StoreError> {
        let mut conn = self.conn("get_outbox_row")?;
        let row = conn
            .query_opt(
                "SELECT decision_id, org_id, operation, attempts, locked_until, created_at FROM \
                 search_outbox WHERE decision_id = $1 AND operation = $2",
                &[&decision_id.as_uuid(), &operation.as_str()],
            )
            .map_err(|err| StoreError::db("get_outbox_row", &err))?;
        row.as_ref().map(row_to_outbox).transpose()
    }
}
