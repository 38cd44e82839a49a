// crates/trace-ledger-store-postgres/src/trace.rs
// ============================================================================
// Module: Trace Transaction
// Description: One atomic write for a complete trace.
// Purpose: Persist run + decision + children + outbox and complete the run
//          in a single transaction.
// Dependencies: postgres, time
// ============================================================================

//! ## Overview
//! The trace transaction is the hot write path: it opens one transaction
//! that inserts a `running` run, the hashed decision, its alternatives and
//! evidence over COPY (each under the dedicated 30-second budget), the
//! outbox intent when an embedding is present, and finally flips the run to
//! `completed`. Any step failing leaves no trace at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use time::OffsetDateTime;
use trace_ledger_core::AgentRun;
use trace_ledger_core::Alternative;
use trace_ledger_core::Decision;
use trace_ledger_core::Evidence;
use trace_ledger_core::MutationAuditEntry;
use trace_ledger_core::NewAlternative;
use trace_ledger_core::NewDecision;
use trace_ledger_core::NewEvidence;
use trace_ledger_core::OrgId;
use trace_ledger_core::OutboxOperation;
use trace_ledger_core::RunId;
use trace_ledger_core::RunStatus;
use trace_ledger_core::normalized_metadata;

use crate::audit::insert_audit_tx;
use crate::children::insert_alternatives_tx;
use crate::children::insert_evidence_tx;
use crate::decisions::insert_decision_tx;
use crate::decisions::notify_decision_tx;
use crate::error::StoreError;
use crate::outbox::upsert_outbox_tx;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Everything one trace write carries.
#[derive(Debug, Clone)]
pub struct CreateTraceParams {
    /// External agent identifier.
    pub agent_id: String,
    /// Optional external trace correlation identifier.
    pub trace_id: Option<String>,
    /// Optional parent run.
    pub parent_run_id: Option<RunId>,
    /// Run metadata.
    pub run_metadata: Value,
    /// The decision content; its `run_id` field is ignored and replaced by
    /// the run created inside the transaction.
    pub decision: NewDecision,
    /// Alternatives considered.
    pub alternatives: Vec<NewAlternative>,
    /// Supporting evidence.
    pub evidence: Vec<NewEvidence>,
    /// Optional audit entry recorded in the same transaction.
    pub audit: Option<MutationAuditEntry>,
}

/// The persisted result of a trace write.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    /// The completed run.
    pub run: AgentRun,
    /// The recorded decision.
    pub decision: Decision,
    /// Recorded alternatives, insertion order.
    pub alternatives: Vec<Alternative>,
    /// Recorded evidence, insertion order.
    pub evidence: Vec<Evidence>,
}

// ============================================================================
// SECTION: Operation
// ============================================================================

impl TraceStore {
    /// Writes a complete trace atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any step's failure; the entire trace is
    /// then absent.
    pub fn create_trace_tx(
        &self,
        org_id: OrgId,
        params: &CreateTraceParams,
    ) -> Result<TraceRecord, StoreError> {
        let mut conn = self.conn("create_trace_tx")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("create_trace_tx", &err))?;
        let now = OffsetDateTime::now_utc();
        let run_id = RunId::generate();
        let run_metadata = normalized_metadata(&params.run_metadata);
        tx.execute(
            "INSERT INTO agent_runs (id, agent_id, org_id, trace_id, parent_run_id, status, \
             started_at, metadata, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &run_id.as_uuid(),
                &params.agent_id,
                &org_id.as_uuid(),
                &params.trace_id,
                &params.parent_run_id.map(RunId::as_uuid),
                &RunStatus::Running.as_str(),
                &now,
                &run_metadata,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_trace_tx", &err))?;
        let mut new_decision = params.decision.clone();
        new_decision.run_id = run_id;
        if new_decision.agent_id.is_empty() {
            new_decision.agent_id.clone_from(&params.agent_id);
        }
        let decision = insert_decision_tx(&mut tx, org_id, &new_decision, now)?;
        let alternatives = insert_alternatives_tx(
            &mut tx,
            decision.id,
            &params.alternatives,
            now,
            self.copy_timeout_ms(),
        )?;
        let evidence = insert_evidence_tx(
            &mut tx,
            decision.id,
            org_id,
            &params.evidence,
            now,
            self.copy_timeout_ms(),
        )?;
        if decision.embedding.is_some() {
            upsert_outbox_tx(&mut tx, decision.id, org_id, OutboxOperation::Upsert)?;
        }
        let completed_at = OffsetDateTime::now_utc();
        tx.execute(
            "UPDATE agent_runs SET status = $3, completed_at = $4 WHERE org_id = $1 AND id = $2",
            &[
                &org_id.as_uuid(),
                &run_id.as_uuid(),
                &RunStatus::Completed.as_str(),
                &completed_at,
            ],
        )
        .map_err(|err| StoreError::db("create_trace_tx", &err))?;
        if let Some(entry) = &params.audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        notify_decision_tx(&mut tx, decision.id, org_id, "create")?;
        tx.commit().map_err(|err| StoreError::db("create_trace_tx", &err))?;
        Ok(TraceRecord {
            run: AgentRun {
                id: run_id,
                agent_id: params.agent_id.clone(),
                org_id,
                trace_id: params.trace_id.clone(),
                parent_run_id: params.parent_run_id,
                status: RunStatus::Completed,
                started_at: now,
                completed_at: Some(completed_at),
                metadata: run_metadata,
                created_at: now,
            },
            decision,
            alternatives,
            evidence,
        })
    }
}
