// system-tests/tests/helpers/seed.rs
// ============================================================================
// Module: Test Seed Data
// Description: Small builders for orgs, runs, and decisions.
// Purpose: Keep suites focused on the behavior under test.
// ============================================================================

use std::error::Error;

use trace_ledger_core::NewDecision;
use trace_ledger_core::NewOrganization;
use trace_ledger_core::NewRun;
use trace_ledger_core::OrgId;
use trace_ledger_core::RunId;
use trace_ledger_store_postgres::TraceStore;

/// Creates an organization with no retention window.
pub fn org(store: &TraceStore, name: &str) -> Result<OrgId, Box<dyn Error>> {
    Ok(store.create_organization(&NewOrganization::new(name))?.id)
}

/// Creates a running run for an agent.
pub fn run(store: &TraceStore, org_id: OrgId, agent: &str) -> Result<RunId, Box<dyn Error>> {
    Ok(store.create_run(org_id, &NewRun::new(agent), None)?.id)
}

/// Builds decision parameters with sensible defaults.
pub fn decision(run_id: RunId, agent: &str, decision_type: &str, outcome: &str) -> NewDecision {
    NewDecision::new(run_id, agent, decision_type, outcome, 0.8)
}
