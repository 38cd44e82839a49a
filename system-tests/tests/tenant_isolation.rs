// system-tests/tests/tenant_isolation.rs
// ============================================================================
// Module: Tenant Isolation Tests
// Description: Validate that org scoping holds even with valid foreign ids.
// Purpose: Ensure no read or mutation crosses organizations.
// ============================================================================

//! Tenant isolation system tests.

mod helpers;

use serde_json::json;
use trace_ledger_core::DecisionFilter;
use trace_ledger_core::DecisionInclude;
use trace_ledger_core::RunStatus;
use trace_ledger_store_postgres::StoreError;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

#[test]
fn reads_and_mutations_stay_inside_the_org() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_a = seed::org(&store, "org-a")?;
    let org_b = seed::org(&store, "org-b")?;
    let run_a = seed::run(&store, org_a, "planner")?;
    let decision_a = store.create_decision(
        org_a,
        &seed::decision(run_a, "planner", "architecture", "chose Postgres"),
        None,
    )?;

    // Valid ids from another org must behave as missing.
    assert!(matches!(store.get_run(org_b, run_a), Err(StoreError::NotFound)));
    assert!(matches!(store.get_decision(org_b, decision_a.id), Err(StoreError::NotFound)));
    assert!(matches!(
        store.complete_run(org_b, run_a, RunStatus::Completed, &json!({})),
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.revise_decision(
            org_b,
            decision_a.id,
            &trace_ledger_core::DecisionRevision {
                decision_type: "architecture".to_string(),
                outcome: "hijack".to_string(),
                confidence: 0.5,
                reasoning: None,
                embedding: None,
                outcome_embedding: None,
                metadata: serde_json::Value::Null,
                completeness_score: 0.0,
            },
            None,
        ),
        Err(StoreError::NotFound)
    ));

    // The cross-org revise attempt must not have closed the decision.
    let untouched = store.get_decision(org_a, decision_a.id)?;
    assert!(untouched.valid_to.is_none());

    let foreign_query = store.query_decisions(
        org_b,
        &DecisionFilter::default(),
        None,
        None,
        None,
        0,
        DecisionInclude::default(),
    )?;
    assert!(foreign_query.is_empty());

    assert!(store.get_events_by_run(org_b, run_a, None)?.is_empty());
    assert!(store.search_decisions(org_b, "Postgres", None)?.is_empty());
    Ok(())
}

#[test]
fn deletion_cannot_reach_across_orgs() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_a = seed::org(&store, "org-a")?;
    let org_b = seed::org(&store, "org-b")?;
    store.create_agent(org_a, &trace_ledger_core::NewAgent::new("planner"), None)?;

    // The same external agent_id in another org is a different agent.
    assert!(matches!(
        store.delete_agent_data(org_b, "planner"),
        Err(StoreError::NotFound)
    ));
    assert!(store.get_agent(org_a, "planner").is_ok());
    Ok(())
}
