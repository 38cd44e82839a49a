// crates/trace-ledger-store-postgres/src/proofs.rs
// ============================================================================
// Module: Integrity Proofs
// Description: Periodic Merkle roots chained over decision content hashes.
// Purpose: Anchor batches of content hashes so history cannot be rewritten
//          unnoticed.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! A proof run covers the decisions created in `(batch_start, batch_end]`,
//! where `batch_start` is the previous proof's `batch_end` (or the epoch for
//! the first proof). Content hashes sort lexicographically before the
//! Merkle fold, so the root is independent of insert order, and
//! `previous_root` chains each proof to its predecessor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use time::OffsetDateTime;
use trace_ledger_core::IntegrityProof;
use trace_ledger_core::OrgId;
use trace_ledger_core::merkle_root;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for proof selects.
const PROOF_COLUMNS: &str =
    "id, org_id, batch_start, batch_end, decision_count, root_hash, previous_root, created_at";

/// Maps a proof row to the domain record.
fn row_to_proof(row: &Row) -> IntegrityProof {
    IntegrityProof {
        id: row.get(0),
        org_id: OrgId::from_uuid(row.get(1)),
        batch_start: row.get(2),
        batch_end: row.get(3),
        decision_count: row.get(4),
        root_hash: row.get(5),
        previous_root: row.get(6),
        created_at: row.get(7),
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Builds and appends the next integrity proof for an org, covering
    /// decisions created since the previous proof. Returns `None` when the
    /// window holds no decisions (no empty proofs are written).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn run_integrity_proof(
        &self,
        org_id: OrgId,
    ) -> Result<Option<IntegrityProof>, StoreError> {
        let mut conn = self.conn("run_integrity_proof")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("run_integrity_proof", &err))?;
        let previous = tx
            .query_opt(
                "SELECT batch_end, root_hash FROM integrity_proofs WHERE org_id = $1 ORDER BY \
                 batch_end DESC LIMIT 1",
                &[&org_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("run_integrity_proof", &err))?;
        let (batch_start, previous_root) = match &previous {
            Some(row) => (row.get::<_, OffsetDateTime>(0), Some(row.get::<_, String>(1))),
            None => (OffsetDateTime::UNIX_EPOCH, None),
        };
        let batch_end = OffsetDateTime::now_utc();
        let rows = tx
            .query(
                "SELECT content_hash FROM decisions WHERE org_id = $1 AND created_at > $2 AND \
                 created_at <= $3",
                &[&org_id.as_uuid(), &batch_start, &batch_end],
            )
            .map_err(|err| StoreError::db("run_integrity_proof", &err))?;
        let mut hashes: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
        hashes.sort();
        let Some(root_hash) = merkle_root(&hashes) else {
            return Ok(None);
        };
        let decision_count = i64::try_from(hashes.len()).unwrap_or(i64::MAX);
        let id = Uuid::new_v4();
        let created_at = OffsetDateTime::now_utc();
        tx.execute(
            "INSERT INTO integrity_proofs (id, org_id, batch_start, batch_end, decision_count, \
             root_hash, previous_root, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &id,
                &org_id.as_uuid(),
                &batch_start,
                &batch_end,
                &decision_count,
                &root_hash,
                &previous_root,
                &created_at,
            ],
        )
        .map_err(|err| StoreError::db("run_integrity_proof", &err))?;
        tx.commit().map_err(|err| StoreError::db("run_integrity_proof", &err))?;
        Ok(Some(IntegrityProof {
            id,
            org_id,
            batch_start,
            batch_end,
            decision_count,
            root_hash,
            previous_root,
            created_at,
        }))
    }

    /// Fetches the latest proof for an org, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn latest_proof(&self, org_id: OrgId) -> Result<Option<IntegrityProof>, StoreError> {
        let mut conn = self.conn("latest_proof")?;
        let sql = format!(
            "SELECT {PROOF_COLUMNS} FROM integrity_proofs WHERE org_id = $1 ORDER BY batch_end \
             DESC LIMIT 1"
        );
        let row = conn
            .query_opt(sql.as_str(), &[&org_id.as_uuid()])
            .map_err(|err| StoreError::db("latest_proof", &err))?;
        Ok(row.as_ref().map(row_to_proof))
    }

    /// Lists an org's proofs, newest first. The limit clamps into
    /// `[1, 1000]` with a default of 50.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_proofs(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
    ) -> Result<Vec<IntegrityProof>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let mut conn = self.conn("list_proofs")?;
        let sql = format!(
            "SELECT {PROOF_COLUMNS} FROM integrity_proofs WHERE org_id = $1 ORDER BY batch_end \
             DESC LIMIT $2"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &limit])
            .map_err(|err| StoreError::db("list_proofs", &err))?;
        Ok(rows.iter().map(row_to_proof).collect())
    }
}
