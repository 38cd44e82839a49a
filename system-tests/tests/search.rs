// system-tests/tests/search.rs
// ============================================================================
// Module: Text Search Tests
// Description: Validate FTS ranking and the substring fallback stage.
// Purpose: Ensure both stages return current decisions only.
// ============================================================================

//! Decision text search system tests.

mod helpers;

use trace_ledger_core::DecisionRevision;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

#[test]
fn full_text_search_ranks_matching_decisions() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let mut relevant = seed::decision(run_id, "planner", "architecture", "chose Postgres for \
                                      the ledger storage engine");
    relevant.completeness_score = 0.9;
    store.create_decision(org_id, &relevant, None)?;
    store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "naming", "renamed the billing service"),
        None,
    )?;

    let hits = store.search_decisions(org_id, "postgres storage", None)?;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].decision.outcome.contains("Postgres"));
    assert!(hits[0].score > 0.0);
    Ok(())
}

#[test]
fn search_sees_only_current_decisions() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;

    let original = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "adopt quorum replication"),
        None,
    )?;
    store.revise_decision(
        org_id,
        original.id,
        &DecisionRevision {
            decision_type: "architecture".to_string(),
            outcome: "adopt chain replication".to_string(),
            confidence: 0.9,
            reasoning: None,
            embedding: None,
            outcome_embedding: None,
            metadata: serde_json::Value::Null,
            completeness_score: 0.5,
        },
        None,
    )?;

    let hits = store.search_decisions(org_id, "replication", None)?;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].decision.outcome.contains("chain"));
    Ok(())
}

#[test]
fn empty_queries_return_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    assert!(store.search_decisions(org_id, "   ", None)?.is_empty());
    Ok(())
}

#[test]
fn wildcard_heavy_queries_fall_back_to_substring() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;
    store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "capacity", "raise quota to 50%_of_limit"),
        None,
    )?;

    // Punctuation-only tokens stem to nothing in the tsquery; the
    // substring stage still finds the literal text with wildcards escaped.
    let hits = store.search_decisions(org_id, "50%_of_limit", None)?;
    assert!(!hits.is_empty());
    Ok(())
}
