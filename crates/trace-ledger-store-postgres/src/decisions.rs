// crates/trace-ledger-store-postgres/src/decisions.rs
// ============================================================================
// Module: Decision Store
// Description: Bi-temporal decision CRUD, revision, backfills, and signals.
// Purpose: Record, revise, and traverse hashed decisions atomically with
//          their outbox intents.
// Dependencies: postgres, pgvector, time
// ============================================================================

//! ## Overview
//! Creating a decision computes its content hash and, when an embedding is
//! present, upserts the `upsert` outbox intent in the same transaction.
//! Revising closes the original (`valid_to = now()`), inserts a successor
//! whose `valid_from` equals that close time, and emits both outbox intents.
//! The optimistic update's row count decides the race: zero rows on a still
//! existing decision means another revision won. Chain traversal is a
//! recursive CTE bounded at 100 hops per direction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use pgvector::Vector;
use postgres::Row;
use postgres::Transaction;
use serde_json::json;
use time::OffsetDateTime;
use trace_ledger_core::ApiKeyId;
use trace_ledger_core::ConflictFate;
use trace_ledger_core::Decision;
use trace_ledger_core::DecisionId;
use trace_ledger_core::DecisionRevision;
use trace_ledger_core::MutationAuditEntry;
use trace_ledger_core::NewDecision;
use trace_ledger_core::OrgId;
use trace_ledger_core::OutboxOperation;
use trace_ledger_core::OutcomeSignals;
use trace_ledger_core::RunId;
use trace_ledger_core::content_hash;
use trace_ledger_core::normalized_metadata;

use crate::audit::insert_audit_tx;
use crate::error::StoreError;
use crate::outbox::upsert_outbox_tx;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for decision selects; the order is load-bearing for
/// [`row_to_decision`].
pub(crate) const DECISION_COLUMNS: &str = "id, run_id, org_id, agent_id, decision_type, outcome, \
                                           confidence, reasoning, embedding, outcome_embedding, \
                                           metadata, completeness_score, precedent_ref, \
                                           supersedes_id, content_hash, valid_from, valid_to, \
                                           transaction_time, created_at, session_id, \
                                           agent_context, tool, model, project, api_key_id";

/// Maps a decision row (selected via [`DECISION_COLUMNS`]) to the domain
/// record.
pub(crate) fn row_to_decision(row: &Row) -> Decision {
    Decision {
        id: DecisionId::from_uuid(row.get(0)),
        run_id: RunId::from_uuid(row.get(1)),
        org_id: OrgId::from_uuid(row.get(2)),
        agent_id: row.get(3),
        decision_type: row.get(4),
        outcome: row.get(5),
        confidence: row.get(6),
        reasoning: row.get(7),
        embedding: row.get::<_, Option<Vector>>(8).map(|v| v.to_vec()),
        outcome_embedding: row.get::<_, Option<Vector>>(9).map(|v| v.to_vec()),
        metadata: row.get(10),
        completeness_score: row.get(11),
        precedent_ref: row.get::<_, Option<uuid::Uuid>>(12).map(DecisionId::from_uuid),
        supersedes_id: row.get::<_, Option<uuid::Uuid>>(13).map(DecisionId::from_uuid),
        content_hash: row.get(14),
        valid_from: row.get(15),
        valid_to: row.get(16),
        transaction_time: row.get(17),
        created_at: row.get(18),
        session_id: row.get(19),
        agent_context: row.get(20),
        tool: row.get(21),
        model: row.get(22),
        project: row.get(23),
        api_key_id: row.get::<_, Option<uuid::Uuid>>(24).map(ApiKeyId::from_uuid),
    }
}

// ============================================================================
// SECTION: Insert
// ============================================================================

/// Inserts a decision row inside an open transaction and returns the
/// persisted record. Shared by standalone creation and the trace
/// transaction.
pub(crate) fn insert_decision_tx(
    tx: &mut Transaction<'_>,
    org_id: OrgId,
    new: &NewDecision,
    now: OffsetDateTime,
) -> Result<Decision, StoreError> {
    let id = DecisionId::generate();
    let valid_from = new.valid_from.unwrap_or(now);
    let hash = content_hash(
        id,
        &new.decision_type,
        &new.outcome,
        new.confidence,
        new.reasoning.as_deref(),
        valid_from,
    );
    let decision = Decision {
        id,
        run_id: new.run_id,
        org_id,
        agent_id: new.agent_id.clone(),
        decision_type: new.decision_type.clone(),
        outcome: new.outcome.clone(),
        confidence: new.confidence,
        reasoning: new.reasoning.clone(),
        embedding: new.embedding.clone(),
        outcome_embedding: new.outcome_embedding.clone(),
        metadata: normalized_metadata(&new.metadata),
        completeness_score: new.completeness_score,
        precedent_ref: new.precedent_ref,
        supersedes_id: None,
        content_hash: hash,
        valid_from,
        valid_to: None,
        transaction_time: now,
        created_at: now,
        session_id: new.session_id.clone(),
        agent_context: normalized_metadata(&new.agent_context),
        tool: new.context_str("tool"),
        model: new.context_str("model"),
        project: new.context_str("project"),
        api_key_id: new.api_key_id,
    };
    write_decision_row(tx, &decision, "create_decision")?;
    Ok(decision)
}

/// Executes the decision INSERT for a fully built record.
fn write_decision_row(
    tx: &mut Transaction<'_>,
    decision: &Decision,
    call: &'static str,
) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO decisions ({DECISION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
         $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)"
    );
    tx.execute(
        sql.as_str(),
        &[
            &decision.id.as_uuid(),
            &decision.run_id.as_uuid(),
            &decision.org_id.as_uuid(),
            &decision.agent_id,
            &decision.decision_type,
            &decision.outcome,
            &decision.confidence,
            &decision.reasoning,
            &decision.embedding.clone().map(Vector::from),
            &decision.outcome_embedding.clone().map(Vector::from),
            &decision.metadata,
            &decision.completeness_score,
            &decision.precedent_ref.map(DecisionId::as_uuid),
            &decision.supersedes_id.map(DecisionId::as_uuid),
            &decision.content_hash,
            &decision.valid_from,
            &decision.valid_to,
            &decision.transaction_time,
            &decision.created_at,
            &decision.session_id,
            &decision.agent_context,
            &decision.tool,
            &decision.model,
            &decision.project,
            &decision.api_key_id.map(ApiKeyId::as_uuid),
        ],
    )
    .map_err(|err| StoreError::db(call, &err))?;
    Ok(())
}

/// Emits a change notification on the `decisions` channel inside the
/// transaction; delivery happens on commit.
pub(crate) fn notify_decision_tx(
    tx: &mut Transaction<'_>,
    decision_id: DecisionId,
    org_id: OrgId,
    op: &str,
) -> Result<(), StoreError> {
    let payload = json!({
        "decision_id": decision_id,
        "org_id": org_id,
        "op": op,
    })
    .to_string();
    tx.execute("SELECT pg_notify('decisions', $1)", &[&payload])
        .map_err(|err| StoreError::db("notify_decision", &err))?;
    Ok(())
}

// ============================================================================
// SECTION: Create / Get
// ============================================================================

impl TraceStore {
    /// Records a decision atomically with its outbox intent.
    ///
    /// When an embedding is present, the `upsert` outbox row lands in the
    /// same transaction; if the transaction aborts, neither exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn create_decision(
        &self,
        org_id: OrgId,
        new: &NewDecision,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<Decision, StoreError> {
        let mut conn = self.conn("create_decision")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("create_decision", &err))?;
        let decision = insert_decision_tx(&mut tx, org_id, new, OffsetDateTime::now_utc())?;
        if decision.embedding.is_some() {
            upsert_outbox_tx(&mut tx, decision.id, org_id, OutboxOperation::Upsert)?;
        }
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        notify_decision_tx(&mut tx, decision.id, org_id, "create")?;
        tx.commit().map_err(|err| StoreError::db("create_decision", &err))?;
        Ok(decision)
    }

    /// Fetches one decision scoped by org.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn get_decision(&self, org_id: OrgId, id: DecisionId) -> Result<Decision, StoreError> {
        let mut conn = self.conn("get_decision")?;
        let sql =
            format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = $1 AND id = $2");
        let row = conn
            .query_opt(sql.as_str(), &[&org_id.as_uuid(), &id.as_uuid()])
            .map_err(|err| StoreError::db("get_decision", &err))?
            .ok_or(StoreError::NotFound)?;
        Ok(row_to_decision(&row))
    }
}

// ============================================================================
// SECTION: Revise
// ============================================================================

impl TraceStore {
    /// Revises a decision: closes the original, inserts the successor, and
    /// emits both outbox intents, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyRevised`] when another revision won the
    /// race, [`StoreError::NotFound`] when the decision does not exist in
    /// the org, or [`StoreError`] on driver failure.
    pub fn revise_decision(
        &self,
        org_id: OrgId,
        original_id: DecisionId,
        revision: &DecisionRevision,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<Decision, StoreError> {
        let mut conn = self.conn("revise_decision")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("revise_decision", &err))?;
        let closed = tx
            .query_opt(
                "UPDATE decisions SET valid_to = now() WHERE org_id = $1 AND id = $2 AND \
                 valid_to IS NULL RETURNING valid_to, run_id, agent_id, session_id, \
                 agent_context, api_key_id, precedent_ref",
                &[&org_id.as_uuid(), &original_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("revise_decision", &err))?;
        let Some(closed) = closed else {
            // Zero rows: either the decision is gone or it is already
            // superseded. Look once to tell the caller which.
            let exists = tx
                .query_opt(
                    "SELECT 1 FROM decisions WHERE org_id = $1 AND id = $2",
                    &[&org_id.as_uuid(), &original_id.as_uuid()],
                )
                .map_err(|err| StoreError::db("revise_decision", &err))?;
            return Err(if exists.is_some() {
                StoreError::AlreadyRevised
            } else {
                StoreError::NotFound
            });
        };
        let valid_to: OffsetDateTime = closed.get(0);
        let now = OffsetDateTime::now_utc();
        let id = DecisionId::generate();
        let hash = content_hash(
            id,
            &revision.decision_type,
            &revision.outcome,
            revision.confidence,
            revision.reasoning.as_deref(),
            valid_to,
        );
        let agent_context: serde_json::Value = closed.get(4);
        let context_str = |key: &str| -> Option<String> {
            agent_context.get(key).and_then(serde_json::Value::as_str).map(str::to_owned)
        };
        let successor = Decision {
            id,
            run_id: RunId::from_uuid(closed.get(1)),
            org_id,
            agent_id: closed.get(2),
            decision_type: revision.decision_type.clone(),
            outcome: revision.outcome.clone(),
            confidence: revision.confidence,
            reasoning: revision.reasoning.clone(),
            embedding: revision.embedding.clone(),
            outcome_embedding: revision.outcome_embedding.clone(),
            metadata: normalized_metadata(&revision.metadata),
            completeness_score: revision.completeness_score,
            precedent_ref: closed.get::<_, Option<uuid::Uuid>>(6).map(DecisionId::from_uuid),
            supersedes_id: Some(original_id),
            content_hash: hash,
            valid_from: valid_to,
            valid_to: None,
            transaction_time: now,
            created_at: now,
            session_id: closed.get(3),
            agent_context: agent_context.clone(),
            tool: context_str("tool"),
            model: context_str("model"),
            project: context_str("project"),
            api_key_id: closed.get::<_, Option<uuid::Uuid>>(5).map(ApiKeyId::from_uuid),
        };
        write_decision_row(&mut tx, &successor, "revise_decision")?;
        upsert_outbox_tx(&mut tx, original_id, org_id, OutboxOperation::Delete)?;
        if successor.embedding.is_some() {
            upsert_outbox_tx(&mut tx, successor.id, org_id, OutboxOperation::Upsert)?;
        }
        if let Some(entry) = audit {
            let mut entry = entry.clone();
            entry.operation = "decision_revised".to_string();
            entry.resource_type = "decision".to_string();
            entry.resource_id = Some(original_id.to_string());
            entry.before = Some(json!({ "valid_to": serde_json::Value::Null }));
            entry.after = Some(json!({
                "superseded_by": successor.id,
                "valid_to": trace_ledger_core::canonical_timestamp(valid_to),
            }));
            insert_audit_tx(&mut tx, &entry)?;
        }
        notify_decision_tx(&mut tx, successor.id, org_id, "revise")?;
        tx.commit().map_err(|err| StoreError::db("revise_decision", &err))?;
        Ok(successor)
    }
}

// ============================================================================
// SECTION: Revision Chain
// ============================================================================

/// Recursive chain query over both directions of `supersedes_id`, bounded
/// at 100 hops each way.
const CHAIN_SQL: &str = "WITH RECURSIVE up AS ( \
     SELECT d.id, d.supersedes_id, 0 AS depth FROM decisions d WHERE d.org_id = $1 AND d.id = $2 \
     UNION ALL \
     SELECT d.id, d.supersedes_id, up.depth + 1 FROM decisions d JOIN up ON d.id = \
     up.supersedes_id WHERE d.org_id = $1 AND up.depth < 100 \
 ), down AS ( \
     SELECT d.id, d.supersedes_id, 0 AS depth FROM decisions d WHERE d.org_id = $1 AND d.id = $2 \
     UNION ALL \
     SELECT d.id, d.supersedes_id, down.depth + 1 FROM decisions d JOIN down ON \
     d.supersedes_id = down.id WHERE d.org_id = $1 AND down.depth < 100 \
 ) SELECT id FROM up UNION SELECT id FROM down";

impl TraceStore {
    /// Returns every decision in the revision chain reachable from `id`,
    /// deduplicated and sorted by `valid_from` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the seed decision is absent, or
    /// [`StoreError`] on driver failure.
    pub fn get_decision_revisions(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut conn = self.conn("get_decision_revisions")?;
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = $1 AND id IN ({CHAIN_SQL}) \
             ORDER BY valid_from ASC"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &id.as_uuid()])
            .map_err(|err| StoreError::db("get_decision_revisions", &err))?;
        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(rows.iter().map(row_to_decision).collect())
    }

    /// Returns the ids of every other decision in the chain (the input id is
    /// excluded). Used by the conflict scorer to skip same-chain pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_revision_chain_ids(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<Vec<DecisionId>, StoreError> {
        let mut conn = self.conn("get_revision_chain_ids")?;
        let rows = conn
            .query(CHAIN_SQL, &[&org_id.as_uuid(), &id.as_uuid()])
            .map_err(|err| StoreError::db("get_revision_chain_ids", &err))?;
        Ok(rows
            .iter()
            .map(|row| DecisionId::from_uuid(row.get(0)))
            .filter(|chain_id| *chain_id != id)
            .collect())
    }
}

// ============================================================================
// SECTION: Embedding Backfills
// ============================================================================

impl TraceStore {
    /// Lists current decisions missing an embedding, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn find_unembedded_decisions(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
    ) -> Result<Vec<Decision>, StoreError> {
        self.find_missing_vector(org_id, limit, "embedding", "find_unembedded_decisions")
    }

    /// Lists current decisions missing an outcome embedding, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn find_decisions_missing_outcome_embedding(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
    ) -> Result<Vec<Decision>, StoreError> {
        self.find_missing_vector(
            org_id,
            limit,
            "outcome_embedding",
            "find_decisions_missing_outcome_embedding",
        )
    }

    /// Shared select for the two backfill scans.
    fn find_missing_vector(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
        column: &str,
        call: &'static str,
    ) -> Result<Vec<Decision>, StoreError> {
        let limit = clamp_limit(limit, 100, 1_000);
        let mut conn = self.conn(call)?;
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = $1 AND valid_to IS NULL AND \
             {column} IS NULL ORDER BY created_at ASC LIMIT $2"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &limit])
            .map_err(|err| StoreError::db(call, &err))?;
        Ok(rows.iter().map(row_to_decision).collect())
    }

    /// Backfills a decision's embedding and refreshes its outbox intent
    /// atomically. A decision revised away since the scan is skipped
    /// silently.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn backfill_embedding(
        &self,
        org_id: OrgId,
        id: DecisionId,
        embedding: &[f32],
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn("backfill_embedding")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("backfill_embedding", &err))?;
        let updated = tx
            .execute(
                "UPDATE decisions SET embedding = $3 WHERE org_id = $1 AND id = $2 AND valid_to \
                 IS NULL",
                &[&org_id.as_uuid(), &id.as_uuid(), &Vector::from(embedding.to_vec())],
            )
            .map_err(|err| StoreError::db("backfill_embedding", &err))?;
        if updated == 1 {
            upsert_outbox_tx(&mut tx, id, org_id, OutboxOperation::Upsert)?;
        }
        tx.commit().map_err(|err| StoreError::db("backfill_embedding", &err))?;
        Ok(updated == 1)
    }

    /// Backfills a decision's outcome embedding. The outcome vector is not
    /// replicated externally, so no outbox intent is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn backfill_outcome_embedding(
        &self,
        org_id: OrgId,
        id: DecisionId,
        embedding: &[f32],
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn("backfill_outcome_embedding")?;
        let updated = conn
            .execute(
                "UPDATE decisions SET outcome_embedding = $3 WHERE org_id = $1 AND id = $2 AND \
                 valid_to IS NULL",
                &[&org_id.as_uuid(), &id.as_uuid(), &Vector::from(embedding.to_vec())],
            )
            .map_err(|err| StoreError::db("backfill_outcome_embedding", &err))?;
        Ok(updated == 1)
    }
}

// ============================================================================
// SECTION: Outcome Signals
// ============================================================================

impl TraceStore {
    /// Computes outcome signals for one decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the decision is absent, or
    /// [`StoreError`] on driver failure.
    pub fn get_outcome_signals(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<OutcomeSignals, StoreError> {
        let mut signals = self.get_outcome_signals_batch(org_id, &[id])?;
        signals.pop().ok_or(StoreError::NotFound)
    }

    /// Computes outcome signals for a batch of decisions, preserving input
    /// order. Unknown ids are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_outcome_signals_batch(
        &self,
        org_id: OrgId,
        ids: &[DecisionId],
    ) -> Result<Vec<OutcomeSignals>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw_ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let mut conn = self.conn("get_outcome_signals")?;
        let mut merged: BTreeMap<uuid::Uuid, OutcomeSignals> = BTreeMap::new();
        let velocity_rows = conn
            .query(
                "SELECT d.id, EXTRACT(EPOCH FROM (s.valid_from - d.valid_from))::float8 / \
                 3600.0, (SELECT count(*) FROM decisions c WHERE c.org_id = d.org_id AND \
                 c.valid_to IS NULL AND c.precedent_ref = d.id) FROM decisions d LEFT JOIN \
                 decisions s ON s.org_id = d.org_id AND s.supersedes_id = d.id WHERE d.org_id = \
                 $1 AND d.id = ANY($2)",
                &[&org_id.as_uuid(), &raw_ids],
            )
            .map_err(|err| StoreError::db("get_outcome_signals", &err))?;
        for row in &velocity_rows {
            let raw: uuid::Uuid = row.get(0);
            merged.insert(
                raw,
                OutcomeSignals {
                    decision_id: DecisionId::from_uuid(raw),
                    supersession_velocity_hours: row.get(1),
                    precedent_citation_count: row.get(2),
                    conflict_fate: ConflictFate::default(),
                },
            );
        }
        let fate_rows = conn
            .query(
                "SELECT d.id, count(*) FILTER (WHERE c.winning_decision_id = d.id), count(*) \
                 FILTER (WHERE c.winning_decision_id IS NOT NULL AND c.winning_decision_id <> \
                 d.id), count(*) FILTER (WHERE c.status = 'resolved' AND c.winning_decision_id \
                 IS NULL) FROM decisions d JOIN scored_conflicts c ON c.org_id = d.org_id AND \
                 (c.decision_a_id = d.id OR c.decision_b_id = d.id) WHERE d.org_id = $1 AND d.id \
                 = ANY($2) AND c.status IN ('resolved', 'wont_fix') GROUP BY d.id",
                &[&org_id.as_uuid(), &raw_ids],
            )
            .map_err(|err| StoreError::db("get_outcome_signals", &err))?;
        for row in &fate_rows {
            let raw: uuid::Uuid = row.get(0);
            if let Some(signals) = merged.get_mut(&raw) {
                signals.conflict_fate = ConflictFate {
                    won: row.get(1),
                    lost: row.get(2),
                    resolved_no_winner: row.get(3),
                };
            }
        }
        Ok(ids
            .iter()
            .filter_map(|id| merged.get(&id.as_uuid()).cloned())
            .collect())
    }
}
