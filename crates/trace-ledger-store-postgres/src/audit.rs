// crates/trace-ledger-store-postgres/src/audit.rs
// ============================================================================
// Module: Mutation Audit Sink
// Description: Append-only audit rows recorded with every mutation.
// Purpose: Guarantee no mutation commits without its audit record.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Two variants: the pool-bound sink for standalone writes and the
//! transaction-bound sink for writes that must be atomic with a mutation.
//! When the transaction-bound insert fails, the caller propagates the error
//! and the enclosing transaction rolls back, so the mutation never outlives
//! a missing audit row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Transaction;
use trace_ledger_core::MutationAuditEntry;
use trace_ledger_core::normalized_metadata;

use crate::error::StoreError;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Statement
// ============================================================================

/// Shared insert statement for audit rows.
const INSERT_AUDIT: &str = "INSERT INTO mutation_audit_log (request_id, org_id, actor, method, \
                            endpoint, operation, resource_type, resource_id, before, after, \
                            metadata) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

/// Inserts an audit entry inside an open transaction.
///
/// # Errors
///
/// Returns [`StoreError`] on driver failure; callers must roll back.
pub(crate) fn insert_audit_tx(
    tx: &mut Transaction<'_>,
    entry: &MutationAuditEntry,
) -> Result<(), StoreError> {
    tx.execute(
        INSERT_AUDIT,
        &[
            &entry.request_id,
            &entry.org_id.as_uuid(),
            &entry.actor,
            &entry.method,
            &entry.endpoint,
            &entry.operation,
            &entry.resource_type,
            &entry.resource_id,
            &entry.before,
            &entry.after,
            &normalized_metadata(&entry.metadata),
        ],
    )
    .map_err(|err| StoreError::db("insert_audit", &err))?;
    Ok(())
}

// ============================================================================
// SECTION: Pool-Bound Sink
// ============================================================================

impl TraceStore {
    /// Records a standalone audit entry outside any mutation transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn record_audit(&self, entry: &MutationAuditEntry) -> Result<(), StoreError> {
        let mut conn = self.conn("record_audit")?;
        conn.execute(
            INSERT_AUDIT,
            &[
                &entry.request_id,
                &entry.org_id.as_uuid(),
                &entry.actor,
                &entry.method,
                &entry.endpoint,
                &entry.operation,
                &entry.resource_type,
                &entry.resource_id,
                &entry.before,
                &entry.after,
                &normalized_metadata(&entry.metadata),
            ],
        )
        .map_err(|err| StoreError::db("record_audit", &err))?;
        Ok(())
    }
}
