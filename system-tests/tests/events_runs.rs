// system-tests/tests/events_runs.rs
// ============================================================================
// Module: Event and Run Tests
// Description: Validate COPY ingest, sequencing, and run lifecycle.
// Purpose: Ensure sequence monotonicity, idempotent recovery, and
//          idempotent completion.
// ============================================================================

//! Event store and run store system tests.

mod helpers;

use serde_json::json;
use time::OffsetDateTime;
use trace_ledger_core::EventType;
use trace_ledger_core::NewAgentEvent;
use trace_ledger_core::RunStatus;
use trace_ledger_store_postgres::StoreError;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

/// Builds a batch of events against one run.
fn batch(run_id: trace_ledger_core::RunId, count: usize) -> Vec<NewAgentEvent> {
    (0..count)
        .map(|n| NewAgentEvent {
            run_id,
            event_type: EventType::Observation,
            occurred_at: OffsetDateTime::now_utc(),
            agent_id: "planner".to_string(),
            payload: json!({"n": n}),
        })
        .collect()
}

#[test]
fn bulk_insert_assigns_monotonic_sequences_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let first = store.insert_events(org_id, &batch(run_id, 5))?;
    let second = store.insert_events(org_id, &batch(run_id, 5))?;

    let first_max = first.iter().map(|e| e.sequence_num).max().ok_or("empty batch")?;
    let second_min = second.iter().map(|e| e.sequence_num).min().ok_or("empty batch")?;
    assert!(first_max < second_min);

    let read = store.get_events_by_run(org_id, run_id, None)?;
    assert_eq!(read.len(), 10);
    let mut sorted = read.clone();
    sorted.sort_by_key(|e| e.sequence_num);
    assert_eq!(read, sorted);
    // Input order matches assignment order within a batch.
    assert_eq!(read[0].payload, json!({"n": 0}));
    Ok(())
}

#[test]
fn idempotent_recovery_never_duplicates() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let events = store.insert_events(org_id, &batch(run_id, 3))?;
    let replayed = store.insert_events_idempotent(&events)?;
    assert_eq!(replayed, 0);
    assert_eq!(store.get_events_by_run(org_id, run_id, None)?.len(), 3);
    Ok(())
}

#[test]
fn sequence_reservations_are_disjoint_and_ascending() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let a = store.reserve_sequence_nums(10)?;
    let b = store.reserve_sequence_nums(10)?;
    assert!(a.windows(2).all(|w| w[0] < w[1]));
    assert!(a.last() < b.first());
    Ok(())
}

#[test]
fn run_completion_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    store.complete_run(org_id, run_id, RunStatus::Completed, &json!({"result": "ok"}))?;
    // A retry with any terminal status succeeds without modification.
    store.complete_run(org_id, run_id, RunStatus::Failed, &json!({"late": true}))?;

    let run = store.get_run(org_id, run_id)?;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.metadata.get("result"), Some(&json!("ok")));
    assert_eq!(run.metadata.get("late"), None);
    Ok(())
}

#[test]
fn completing_missing_runs_and_listing() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;

    let missing = trace_ledger_core::RunId::generate();
    assert!(matches!(
        store.complete_run(org_id, missing, RunStatus::Completed, &json!({})),
        Err(StoreError::NotFound)
    ));

    for _ in 0..3 {
        seed::run(&store, org_id, "planner")?;
    }
    seed::run(&store, org_id, "other")?;
    let runs = store.list_runs_by_agent(org_id, "planner", Some(2), 0)?;
    assert_eq!(runs.len(), 2);
    Ok(())
}
