// system-tests/tests/trace.rs
// ============================================================================
// Module: Trace Transaction Tests
// Description: Validate the atomic run+decision+children+outbox write.
// Purpose: Ensure a trace is all-or-nothing and reads back intact.
// ============================================================================

//! Trace transaction system tests.

mod helpers;

use serde_json::json;
use trace_ledger_core::DecisionInclude;
use trace_ledger_core::EvidenceSourceType;
use trace_ledger_core::NewAlternative;
use trace_ledger_core::NewEvidence;
use trace_ledger_core::OutboxOperation;
use trace_ledger_core::RunStatus;
use trace_ledger_core::content_hash;
use trace_ledger_store_postgres::CreateTraceParams;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

/// Builds the S1-style trace parameters.
fn planner_trace(embedding: Option<Vec<f32>>) -> CreateTraceParams {
    let mut decision = seed::decision(
        trace_ledger_core::RunId::generate(),
        "planner",
        "architecture",
        "chose Postgres",
    );
    decision.confidence = 0.87;
    decision.embedding = embedding;
    CreateTraceParams {
        agent_id: "planner".to_string(),
        trace_id: Some("ext-trace-1".to_string()),
        parent_run_id: None,
        run_metadata: json!({"source": "system-test"}),
        decision,
        alternatives: vec![
            NewAlternative::new("Postgres", Some(0.9), true),
            NewAlternative::new("DynamoDB", Some(0.4), false),
        ],
        evidence: vec![NewEvidence::new(EvidenceSourceType::Document, "RFC-17")],
        audit: None,
    }
}

#[test]
fn trace_create_and_read_back() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;

    let record = store.create_trace_tx(org_id, &planner_trace(None))?;

    let run = store.get_run(org_id, record.run.id)?;
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());

    let decision = store.get_decision(org_id, record.decision.id)?;
    assert!(!decision.content_hash.is_empty());
    assert_eq!(decision.outcome, "chose Postgres");
    let recomputed = content_hash(
        decision.id,
        &decision.decision_type,
        &decision.outcome,
        decision.confidence,
        decision.reasoning.as_deref(),
        decision.valid_from,
    );
    assert_eq!(recomputed, decision.content_hash);

    let alternatives = store.get_alternatives(org_id, decision.id)?;
    assert_eq!(alternatives.len(), 2);
    assert_eq!(alternatives[0].label, "Postgres");
    assert!(alternatives[0].selected);
    assert_eq!(alternatives[1].label, "DynamoDB");

    let evidence = store.get_evidence(org_id, decision.id)?;
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence[0].content, "RFC-17");

    // No embedding was supplied, so no outbox intent exists.
    assert!(store.get_outbox_row(decision.id, OutboxOperation::Upsert)?.is_none());
    Ok(())
}

#[test]
fn trace_with_embedding_emits_outbox_intent() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;

    let record = store.create_trace_tx(org_id, &planner_trace(Some(vec![0.1, 0.2, 0.3])))?;

    let row = store
        .get_outbox_row(record.decision.id, OutboxOperation::Upsert)?
        .ok_or("missing outbox row")?;
    assert_eq!(row.attempts, 0);
    assert!(row.locked_until.is_none());
    Ok(())
}

#[test]
fn queried_decisions_hydrate_children_in_batch() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    store.create_trace_tx(org_id, &planner_trace(None))?;

    let hits = store.query_decisions(
        org_id,
        &trace_ledger_core::DecisionFilter::default(),
        None,
        None,
        None,
        0,
        DecisionInclude {
            alternatives: true,
            evidence: true,
        },
    )?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].alternatives.len(), 2);
    assert_eq!(hits[0].evidence.len(), 1);
    Ok(())
}
