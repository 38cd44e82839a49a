// crates/trace-ledger-store-postgres/src/idempotency.rs
// ============================================================================
// Module: Idempotency Store
// Description: Reservation/replay protocol for non-idempotent mutations.
// Purpose: Let clients retry writes safely behind an idempotency key.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! `begin` races an insert; the first writer wins the reservation. Losers
//! observe the existing row: a differing request hash is a payload mismatch,
//! a completed row replays the stored response, and a live reservation
//! reports in-progress. Stale `in_progress` rows are never taken over; the
//! cleanup job removes them after their TTL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use trace_ledger_core::IdempotencyLookup;
use trace_ledger_core::IdempotencyStatus;
use trace_ledger_core::OrgId;

use crate::error::StoreError;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Begins idempotent processing for `(org, actor, endpoint, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PayloadMismatch`] when the key was first used
    /// with a different request hash, [`StoreError::InProgress`] while
    /// another request holds the reservation, or [`StoreError`] on driver
    /// failure.
    pub fn begin_idempotency(
        &self,
        org_id: OrgId,
        actor: &str,
        endpoint: &str,
        key: &str,
        request_hash: &str,
    ) -> Result<IdempotencyLookup, StoreError> {
        let mut conn = self.conn("begin_idempotency")?;
        let inserted = conn
            .execute(
                "INSERT INTO idempotency_keys (org_id, agent_id, endpoint, idempotency_key, \
                 request_hash, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, \
                 'in_progress', now(), now()) ON CONFLICT (org_id, agent_id, endpoint, \
                 idempotency_key) DO NOTHING",
                &[&org_id.as_uuid(), &actor, &endpoint, &key, &request_hash],
            )
            .map_err(|err| StoreError::db("begin_idempotency", &err))?;
        if inserted == 1 {
            return Ok(IdempotencyLookup::fresh());
        }
        let row = conn
            .query_opt(
                "SELECT request_hash, status, status_code, response_data FROM idempotency_keys \
                 WHERE org_id = $1 AND agent_id = $2 AND endpoint = $3 AND idempotency_key = $4",
                &[&org_id.as_uuid(), &actor, &endpoint, &key],
            )
            .map_err(|err| StoreError::db("begin_idempotency", &err))?
            .ok_or(StoreError::NotFound)?;
        let stored_hash: String = row.get(0);
        if stored_hash != request_hash {
            return Err(StoreError::PayloadMismatch);
        }
        let status_label: String = row.get(1);
        match IdempotencyStatus::parse(&status_label) {
            Some(IdempotencyStatus::Completed) => Ok(IdempotencyLookup {
                completed: true,
                status_code: row.get(2),
                response_data: row.get(3),
            }),
            Some(IdempotencyStatus::InProgress) => Err(StoreError::InProgress),
            None => Err(StoreError::Invalid(format!(
                "unknown idempotency status {status_label}"
            ))),
        }
    }

    /// Marks a reservation completed, storing the response for replay.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no live reservation matches, or
    /// [`StoreError`] on driver failure.
    pub fn complete_idempotency(
        &self,
        org_id: OrgId,
        actor: &str,
        endpoint: &str,
        key: &str,
        status_code: i32,
        response_data: &Value,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("complete_idempotency")?;
        let updated = conn
            .execute(
                "UPDATE idempotency_keys SET status = 'completed', status_code = $5, \
                 response_data = $6, updated_at = now() WHERE org_id = $1 AND agent_id = $2 AND \
                 endpoint = $3 AND idempotency_key = $4 AND status = 'in_progress'",
                &[&org_id.as_uuid(), &actor, &endpoint, &key, &status_code, &response_data],
            )
            .map_err(|err| StoreError::db("complete_idempotency", &err))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Removes a live reservation so the client can retry after a failure.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn clear_in_progress_idempotency(
        &self,
        org_id: OrgId,
        actor: &str,
        endpoint: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("clear_in_progress_idempotency")?;
        conn.execute(
            "DELETE FROM idempotency_keys WHERE org_id = $1 AND agent_id = $2 AND endpoint = $3 \
             AND idempotency_key = $4 AND status = 'in_progress'",
            &[&org_id.as_uuid(), &actor, &endpoint, &key],
        )
        .map_err(|err| StoreError::db("clear_in_progress_idempotency", &err))?;
        Ok(())
    }

    /// Deletes keys older than their per-status TTL. Runs periodically from
    /// a host scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn cleanup_idempotency_keys(
        &self,
        completed_ttl: Duration,
        in_progress_ttl: Duration,
    ) -> Result<u64, StoreError> {
        let completed_secs = i64::try_from(completed_ttl.as_secs()).unwrap_or(i64::MAX);
        let in_progress_secs = i64::try_from(in_progress_ttl.as_secs()).unwrap_or(i64::MAX);
        let mut conn = self.conn("cleanup_idempotency_keys")?;
        let deleted = conn
            .execute(
                "DELETE FROM idempotency_keys WHERE (status = 'completed' AND updated_at < \
                 now() - make_interval(secs => $1::double precision)) OR (status = \
                 'in_progress' AND updated_at < now() - make_interval(secs => $2::double \
                 precision))",
                &[&completed_secs, &in_progress_secs],
            )
            .map_err(|err| StoreError::db("cleanup_idempotency_keys", &err))?;
        Ok(deleted)
    }
}
