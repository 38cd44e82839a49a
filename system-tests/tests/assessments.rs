// system-tests/tests/assessments.rs
// ============================================================================
// Module: Assessment Tests
// Description: Validate append-only history and latest-per-assessor math.
// Purpose: Ensure summaries reflect each assessor's newest verdict only.
// ============================================================================

//! Assessment store system tests.

mod helpers;

use trace_ledger_core::AssessmentOutcome;
use trace_ledger_core::NewAssessment;
use trace_ledger_store_postgres::StoreError;

use helpers::infra::PostgresFixture;
use helpers::infra::migrated_store;
use helpers::seed;

#[test]
fn summary_counts_latest_verdict_per_assessor() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;
    let decision = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "chose Postgres"),
        None,
    )?;

    store.create_assessment(
        org_id,
        &NewAssessment {
            decision_id: decision.id,
            assessor_agent_id: "reviewer".to_string(),
            outcome: AssessmentOutcome::Correct,
            notes: None,
        },
    )?;
    store.create_assessment(
        org_id,
        &NewAssessment {
            decision_id: decision.id,
            assessor_agent_id: "reviewer".to_string(),
            outcome: AssessmentOutcome::Incorrect,
            notes: Some("regressed in production".to_string()),
        },
    )?;

    let summary = store.get_assessment_summary(org_id, decision.id)?;
    assert_eq!(summary.incorrect, 1);
    assert_eq!(summary.correct, 0);
    assert_eq!(summary.total(), 1);

    let history = store.list_assessments(org_id, decision.id, None)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].outcome, AssessmentOutcome::Incorrect);
    assert_eq!(history[1].outcome, AssessmentOutcome::Correct);

    let batch = store.get_assessment_summaries(org_id, &[decision.id])?;
    assert_eq!(batch.get(&decision.id).map(|s| s.total()), Some(1));
    Ok(())
}

#[test]
fn assessments_require_a_current_decision() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = PostgresFixture::start()?;
    let store = migrated_store(&fixture)?;
    let org_id = seed::org(&store, "acme")?;
    let run_id = seed::run(&store, org_id, "planner")?;
    let decision = store.create_decision(
        org_id,
        &seed::decision(run_id, "planner", "architecture", "v1"),
        None,
    )?;
    store.revise_decision(
        org_id,
        decision.id,
        &trace_ledger_core::DecisionRevision {
            decision_type: "architecture".to_string(),
            outcome: "v2".to_string(),
            confidence: 0.9,
            reasoning: None,
            embedding: None,
            outcome_embedding: None,
            metadata: serde_json::Value::Null,
            completeness_score: 0.5,
        },
        None,
    )?;

    // The original is superseded; assessing it is a not-found.
    let result = store.create_assessment(
        org_id,
        &NewAssessment {
            decision_id: decision.id,
            assessor_agent_id: "reviewer".to_string(),
            outcome: AssessmentOutcome::Correct,
            notes: None,
        },
    );
    assert!(matches!(result, Err(StoreError::NotFound)));
    Ok(())
}
