// crates/trace-ledger-store-postgres/src/runs.rs
// ============================================================================
// Module: Run Store
// Description: Run lifecycle with idempotent completion.
// Purpose: Create, complete, and list agent runs.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Runs are created in `running` and transition to a terminal state exactly
//! once. Completion is idempotent on retry: when the optimistic update
//! matches zero rows because the run is already terminal, the call reports
//! success without touching the row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use time::OffsetDateTime;
use trace_ledger_core::AgentRun;
use trace_ledger_core::MutationAuditEntry;
use trace_ledger_core::NewRun;
use trace_ledger_core::OrgId;
use trace_ledger_core::RunId;
use trace_ledger_core::RunStatus;
use trace_ledger_core::normalized_metadata;

use crate::audit::insert_audit_tx;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for run selects.
pub(crate) const RUN_COLUMNS: &str = "id, agent_id, org_id, trace_id, parent_run_id, status, \
                                      started_at, completed_at, metadata, created_at";

/// Maps a run row to the domain record.
pub(crate) fn row_to_run(row: &Row) -> Result<AgentRun, StoreError> {
    let status_label: String = row.get(5);
    let status = RunStatus::parse(&status_label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown run status {status_label}")))?;
    Ok(AgentRun {
        id: RunId::from_uuid(row.get(0)),
        agent_id: row.get(1),
        org_id: OrgId::from_uuid(row.get(2)),
        trace_id: row.get(3),
        parent_run_id: row.get::<_, Option<uuid::Uuid>>(4).map(RunId::from_uuid),
        status,
        started_at: row.get(6),
        completed_at: row.get(7),
        metadata: row.get(8),
        created_at: row.get(9),
    })
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Creates a run in `running`, optionally with an in-transaction audit
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure; with audit, a failed audit
    /// insert rolls the creation back.
    pub fn create_run(
        &self,
        org_id: OrgId,
        req: &NewRun,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<AgentRun, StoreError> {
        let mut conn = self.conn("create_run")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("create_run", &err))?;
        let id = RunId::generate();
        let now = OffsetDateTime::now_utc();
        let metadata = normalized_metadata(&req.metadata);
        tx.execute(
            "INSERT INTO agent_runs (id, agent_id, org_id, trace_id, parent_run_id, status, \
             started_at, metadata, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &id.as_uuid(),
                &req.agent_id,
                &org_id.as_uuid(),
                &req.trace_id,
                &req.parent_run_id.map(RunId::as_uuid),
                &RunStatus::Running.as_str(),
                &now,
                &metadata,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_run", &err))?;
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("create_run", &err))?;
        Ok(AgentRun {
            id,
            agent_id: req.agent_id.clone(),
            org_id,
            trace_id: req.trace_id.clone(),
            parent_run_id: req.parent_run_id,
            status: RunStatus::Running,
            started_at: now,
            completed_at: None,
            metadata,
            created_at: now,
        })
    }

    /// Transitions a run from `running` to a terminal state, merging
    /// metadata. Re-completing an already terminal run succeeds without
    /// modification.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a non-terminal target status,
    /// [`StoreError::NotFound`] when the run does not exist in the org, and
    /// [`StoreError`] on driver failure.
    pub fn complete_run(
        &self,
        org_id: OrgId,
        run_id: RunId,
        status: RunStatus,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Invalid("completion status must be terminal".to_string()));
        }
        let mut conn = self.conn("complete_run")?;
        let updated = conn
            .execute(
                "UPDATE agent_runs SET status = $3, completed_at = now(), metadata = metadata || \
                 $4 WHERE org_id = $1 AND id = $2 AND status = 'running'",
                &[
                    &org_id.as_uuid(),
                    &run_id.as_uuid(),
                    &status.as_str(),
                    &normalized_metadata(metadata),
                ],
            )
            .map_err(|err| StoreError::db("complete_run", &err))?;
        if updated == 1 {
            return Ok(());
        }
        // Zero rows: distinguish an idempotent retry from a missing run.
        let row = conn
            .query_opt(
                "SELECT status FROM agent_runs WHERE org_id = $1 AND id = $2",
                &[&org_id.as_uuid(), &run_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("complete_run", &err))?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => {
                let label: String = row.get(0);
                if RunStatus::parse(&label).is_some_and(RunStatus::is_terminal) {
                    Ok(())
                } else {
                    Err(StoreError::Invalid("run transition rejected".to_string()))
                }
            }
        }
    }

    /// Fetches one run scoped by org.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn get_run(&self, org_id: OrgId, run_id: RunId) -> Result<AgentRun, StoreError> {
        let mut conn = self.conn("get_run")?;
        let sql = format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE org_id = $1 AND id = $2");
        let row = conn
            .query_opt(sql.as_str(), &[&org_id.as_uuid(), &run_id.as_uuid()])
            .map_err(|err| StoreError::db("get_run", &err))?
            .ok_or(StoreError::NotFound)?;
        row_to_run(&row)
    }

    /// Lists an agent's runs, newest first. The limit clamps into
    /// `[1, 1000]` with a default of 50.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_runs_by_agent(
        &self,
        org_id: OrgId,
        agent_id: &str,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<AgentRun>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let offset = offset.max(0);
        let mut conn = self.conn("list_runs_by_agent")?;
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM agent_runs WHERE org_id = $1 AND agent_id = $2 ORDER BY \
             started_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &agent_id, &limit, &offset])
            .map_err(|err| StoreError::db("list_runs_by_agent", &err))?;
        rows.iter().map(row_to_run).collect()
    }
}
