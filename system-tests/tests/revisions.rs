// system-tests/tests/revisions.rs
// ============================================================================
// Module: Revision Chain Tests
// Description: Validate bi-temporal revision semantics and the chain walk.
// Purpose: Ensure revision atomicity, chain traversal, and race behavior.
// ============================================================================

//! Decision revision system tests.

mod helpers;

use std::sync::Arc;
use std::thread;

use trace_ledger_core::DecisionRevision;
use trace_ledger_core::OutboxOperation;
use trace_ledger_store_postgres::StoreError;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

/// Replacement content used across revision tests.
fn revision(outcome: &str) -> DecisionRevision {
    DecisionRevision {
        decision_type: "architecture".to_string(),
        outcome: outcome.to_string(),
        confidence: 0.9,
        reasoning: None,
        embedding: Some(vec![0.5, 0.5]),
        outcome_embedding: None,
        metadata: serde_json::Value::Null,
        completeness_score: 0.6,
    }
}

#[test]
fn revision_chain_walks_both_directions() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let a = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "v1"),
        None,
    )?;
    let b = store.revise_decision(org_id, a.id, &revision("v2"), None)?;
    let c = store.revise_decision(org_id, b.id, &revision("v3"), None)?;

    let chain = store.get_decision_revisions(org_id, c.id)?;
    let outcomes: Vec<&str> = chain.iter().map(|d| d.outcome.as_str()).collect();
    assert_eq!(outcomes, vec!["v1", "v2", "v3"]);

    let ids = store.get_revision_chain_ids(org_id, b.id)?;
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a.id));
    assert!(ids.contains(&c.id));
    Ok(())
}

#[test]
fn revision_closes_original_and_emits_both_intents() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let original = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "v1"),
        None,
    )?;
    let successor = store.revise_decision(org_id, original.id, &revision("v2"), None)?;

    let closed = store.get_decision(org_id, original.id)?;
    let closed_at = closed.valid_to.ok_or("original still current")?;
    assert_eq!(successor.supersedes_id, Some(original.id));
    assert_eq!(successor.valid_from, closed_at);
    assert!(successor.valid_to.is_none());

    assert!(store.get_outbox_row(original.id, OutboxOperation::Delete)?.is_some());
    assert!(store.get_outbox_row(successor.id, OutboxOperation::Upsert)?.is_some());
    Ok(())
}

#[test]
fn concurrent_revisions_have_exactly_one_winner() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = Arc::new(migrated_store(&fixture)?);
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;
    let original = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "v1"),
        None,
    )?;

    let mut handles = Vec::new();
    for n in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            store.revise_decision(org_id, original.id, &revision(&format!("rev-{n}")), None)
        }));
    }
    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.join().map_err(|_| "revision thread panicked")? {
            Ok(_) => winners += 1,
            Err(StoreError::AlreadyRevised) => losers += 1,
            Err(err) => return Err(Box::new(err)),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, 3);
    Ok(())
}

#[test]
fn revising_missing_or_revised_decisions_fails_cleanly()
-> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let missing = trace_ledger_core::DecisionId::generate();
    assert!(matches!(
        store.revise_decision(org_id, missing, &revision("x"), None),
        Err(StoreError::NotFound)
    ));

    let original = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "v1"),
        None,
    )?;
    store.revise_decision(org_id, original.id, &revision("v2"), None)?;
    assert!(matches!(
        store.revise_decision(org_id, original.id, &revision("v3"), None),
        Err(StoreError::AlreadyRevised)
    ));
    Ok(())
}
