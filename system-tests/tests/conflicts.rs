// system-tests/tests/conflicts.rs
// ============================================================================
// Module: Conflict Lifecycle Tests
// Description: Validate canonicalization, re-scoring, and resolution.
// Purpose: Ensure the conflict store matches the detection contract.
// ============================================================================

//! Conflict store system tests.

mod helpers;

use trace_ledger_core::ConflictFilter;
use trace_ledger_core::ConflictKind;
use trace_ledger_core::ConflictResolution;
use trace_ledger_core::ConflictStatus;
use trace_ledger_core::Decision;
use trace_ledger_core::NewScoredConflict;
use trace_ledger_core::OrgId;
use trace_ledger_store_postgres::StoreError;
use trace_ledger_store_postgres::TraceStore;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

/// Creates the standard approve/deny pair used across conflict tests.
fn seed_pair(
    store: &TraceStore,
    org_id: OrgId,
) -> Result<(Decision, Decision), Box<dyn std::error::Error>> {
    let run_a = seed::run(store, org_id, "alpha")?;
    let run_b = seed::run(store, org_id, "beta")?;
    let a = store.create_decision(
        org_id,
        &seed::decision(run_a, "alpha", "access-review", "approve"),
        None,
    )?;
    let b = store.create_decision(
        org_id,
        &seed::decision(run_b, "beta", "access-review", "deny"),
        None,
    )?;
    Ok((a, b))
}

/// Builds a scored conflict between two decisions.
fn scored(a: &Decision, b: &Decision) -> NewScoredConflict {
    NewScoredConflict {
        decision_a_id: a.id,
        decision_b_id: b.id,
        conflict_kind: ConflictKind::CrossAgent,
        agent_a_id: a.agent_id.clone(),
        agent_b_id: b.agent_id.clone(),
        decision_type_a: a.decision_type.clone(),
        decision_type_b: b.decision_type.clone(),
        outcome_a: a.outcome.clone(),
        outcome_b: b.outcome.clone(),
        topic_similarity: 0.92,
        outcome_divergence: 0.95,
        significance: 0.8,
        scoring_method: "classifier-v2".to_string(),
        explanation: Some("same subject, opposite outcomes".to_string()),
        category: None,
        severity: Some("high".to_string()),
        relationship: Some("contradicts".to_string()),
        confidence_weight: Some(0.7),
        temporal_decay: Some(0.9),
    }
}

#[test]
fn insert_is_symmetric_and_rescore_refreshes() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let (a, b) = seed_pair(&store, org_id)?;

    let first = store.insert_scored_conflict(org_id, scored(&a, &b))?;
    let second = store.insert_scored_conflict(org_id, scored(&b, &a))?;
    assert_eq!(first, second);

    let mut rescored = scored(&a, &b);
    rescored.topic_similarity = 0.99;
    store.insert_scored_conflict(org_id, rescored)?;

    let listed = store.list_conflicts(org_id, &ConflictFilter::default(), None, 0)?;
    assert_eq!(listed.len(), 1);
    let conflict = &listed[0];
    assert!((conflict.topic_similarity - 0.99).abs() < f64::EPSILON);
    assert!(conflict.side_a.decision_id.to_string() < conflict.side_b.decision_id.to_string());
    // The listing joins decisions for each side's run and confidence.
    assert!(conflict.side_a.run_id.is_some());
    assert!(conflict.side_a.confidence.is_some());
    Ok(())
}

#[test]
fn lifecycle_and_conflict_fate() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let (a, b) = seed_pair(&store, org_id)?;
    let conflict_id = store.insert_scored_conflict(org_id, scored(&a, &b))?;

    let by_agent = store.list_conflicts(
        org_id,
        &ConflictFilter {
            agent_id: Some("alpha".to_string()),
            ..ConflictFilter::default()
        },
        None,
        0,
    )?;
    assert_eq!(by_agent.len(), 1);

    store.acknowledge_conflict(org_id, conflict_id)?;
    // The canonical side A is whichever decision id sorts first.
    let winner = if a.id.to_string() < b.id.to_string() { a.id } else { b.id };
    let loser = if winner == a.id { b.id } else { a.id };
    store.resolve_conflict(
        org_id,
        conflict_id,
        &ConflictResolution {
            status: ConflictStatus::Resolved,
            resolved_by: "admin".to_string(),
            resolution_note: Some("side A had the fresher evidence".to_string()),
            resolution_decision_id: None,
            winning_decision_id: Some(winner),
        },
    )?;

    let winner_signals = store.get_outcome_signals(org_id, winner)?;
    assert_eq!(winner_signals.conflict_fate.won, 1);
    assert_eq!(winner_signals.conflict_fate.lost, 0);
    assert_eq!(winner_signals.conflict_fate.resolved_no_winner, 0);

    let loser_signals = store.get_outcome_signals(org_id, loser)?;
    assert_eq!(loser_signals.conflict_fate.won, 0);
    assert_eq!(loser_signals.conflict_fate.lost, 1);
    Ok(())
}

#[test]
fn resolution_guards_status_and_winner() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let (a, b) = seed_pair(&store, org_id)?;
    let conflict_id = store.insert_scored_conflict(org_id, scored(&a, &b))?;

    let outsider = trace_ledger_core::DecisionId::generate();
    let result = store.resolve_conflict(
        org_id,
        conflict_id,
        &ConflictResolution {
            status: ConflictStatus::Resolved,
            resolved_by: "admin".to_string(),
            resolution_note: None,
            resolution_decision_id: None,
            winning_decision_id: Some(outsider),
        },
    );
    assert!(matches!(result, Err(StoreError::Invalid(_))));

    assert!(matches!(
        store.acknowledge_conflict(org_id, trace_ledger_core::ConflictId::generate()),
        Err(StoreError::NotFound)
    ));
    Ok(())
}
