// system-tests/tests/retention_deletion.rs
// ============================================================================
// Module: Retention and Deletion Tests
// Description: Validate the purge engine, legal holds, and agent deletion.
// Purpose: Ensure removal respects holds, exclusions, and FK order.
// ============================================================================

//! Retention engine and deletion engine system tests.

mod helpers;

use time::Duration;
use time::OffsetDateTime;
use trace_ledger_core::NewAgent;
use trace_ledger_core::NewLegalHold;
use trace_ledger_core::OutboxOperation;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

/// Ages a decision's created_at so retention sees it as expired.
fn age_decision(
    url: &str,
    id: trace_ledger_core::DecisionId,
    days: i32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = postgres::Client::connect(url, postgres::NoTls)?;
    client.execute(
        "UPDATE decisions SET created_at = now() - make_interval(days => $2) WHERE id = $1",
        &[&id.as_uuid(), &days],
    )?;
    Ok(())
}

#[test]
fn retention_purges_expired_decisions_only() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    store.update_retention_policy(org_id, Some(30), &["keep-forever".to_string()])?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let expired = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "routine", "old choice"),
        None,
    )?;
    let excluded = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "keep-forever", "pinned choice"),
        None,
    )?;
    let fresh = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "routine", "new choice"),
        None,
    )?;
    age_decision(&fixture.url, expired.id, 60)?;
    age_decision(&fixture.url, excluded.id, 60)?;

    let outcome = store.run_retention(org_id, "scheduler", None)?;
    assert_eq!(outcome.deleted.get("decisions"), Some(&1));

    assert!(store.get_decision(org_id, expired.id).is_err());
    assert!(store.get_decision(org_id, excluded.id).is_ok());
    assert!(store.get_decision(org_id, fresh.id).is_ok());
    // The purge leaves a delete intent for the external index.
    assert!(store.get_outbox_row(expired.id, OutboxOperation::Delete)?.is_some());
    Ok(())
}

#[test]
fn active_legal_holds_block_purging() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    store.update_retention_policy(org_id, Some(30), &[])?;
    let run_id = seed::run(&store, org_id, "planner")?;
    let held = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "routine", "held choice"),
        None,
    )?;
    age_decision(&fixture.url, held.id, 60)?;

    let now = OffsetDateTime::now_utc();
    let hold = store.create_legal_hold(
        org_id,
        &NewLegalHold {
            reason: "litigation".to_string(),
            hold_start: now - Duration::days(365),
            hold_end: now + Duration::days(365),
            decision_types: None,
            agent_ids: None,
        },
    )?;

    let outcome = store.run_retention(org_id, "scheduler", None)?;
    assert_eq!(outcome.deleted.get("decisions"), None);
    assert!(store.get_decision(org_id, held.id).is_ok());

    store.release_legal_hold(org_id, hold.id)?;
    let outcome = store.run_retention(org_id, "scheduler", None)?;
    assert_eq!(outcome.deleted.get("decisions"), Some(&1));
    Ok(())
}

#[test]
fn agent_deletion_is_complete_and_counted() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    store.create_agent(org_id, &NewAgent::new("planner"), None)?;
    store.create_agent(org_id, &NewAgent::new("citer"), None)?;

    let run_id = seed::run(&store, org_id, "planner")?;
    let doomed = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "chose Postgres"),
        None,
    )?;
    // Another agent's decision cites the doomed one as precedent.
    let citing_run = seed::run(&store, org_id, "citer")?;
    let mut citing = seed::decision(citing_run, "citer", "architecture", "followed planner");
    citing.precedent_ref = Some(doomed.id);
    let citing = store.create_decision(org_id, &citing, None)?;

    let counts = store.delete_agent_data(org_id, "planner")?;
    assert_eq!(counts.get("decisions"), Some(&1));
    assert_eq!(counts.get("agent_runs"), Some(&1));
    assert_eq!(counts.get("agents"), Some(&1));

    // The survivor's back-reference was nulled, not cascaded away.
    let survivor = store.get_decision(org_id, citing.id)?;
    assert_eq!(survivor.precedent_ref, None);
    // The external index is told to forget the deleted decision.
    assert!(store.get_outbox_row(doomed.id, OutboxOperation::Delete)?.is_some());
    assert!(matches!(
        store.get_agent(org_id, "planner"),
        Err(trace_ledger_store_postgres::StoreError::NotFound)
    ));
    Ok(())
}
