// crates/trace-ledger-store-postgres/src/children.rs
// ============================================================================
// Module: Alternatives, Evidence, and Claims
// Description: Immutable child rows recorded alongside decisions.
// Purpose: Bulk-insert children over COPY and read them org-scoped.
// Dependencies: postgres, pgvector
// ============================================================================

//! ## Overview
//! Children are written in bulk inside the decision's transaction and never
//! mutated. Alternatives have no org column, so reads scope through the
//! parent decision join; evidence carries `org_id` and is additionally
//! filtered by it. Default ordering is `score DESC NULLS LAST`
//! for alternatives and `relevance_score DESC NULLS LAST` for evidence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use pgvector::Vector;
use postgres::Client;
use postgres::Row;
use postgres::Transaction;
use time::OffsetDateTime;
use trace_ledger_core::Alternative;
use trace_ledger_core::DecisionClaim;
use trace_ledger_core::DecisionId;
use trace_ledger_core::Evidence;
use trace_ledger_core::EvidenceSourceType;
use trace_ledger_core::NewAlternative;
use trace_ledger_core::NewDecisionClaim;
use trace_ledger_core::NewEvidence;
use trace_ledger_core::OrgId;
use trace_ledger_core::normalized_metadata;
use uuid::Uuid;

use crate::copy_text::CopyBuffer;
use crate::copy_text::copy_rows;
use crate::error::StoreError;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for alternative selects.
const ALTERNATIVE_COLUMNS: &str =
    "id, decision_id, label, score, selected, rejection_reason, metadata, created_at";

/// Column list for evidence selects.
const EVIDENCE_COLUMNS: &str = "id, decision_id, org_id, source_type, source_uri, content, \
                                relevance_score, embedding, metadata, created_at";

/// Maps an alternative row to the domain record.
fn row_to_alternative(row: &Row) -> Alternative {
    Alternative {
        id: row.get(0),
        decision_id: DecisionId::from_uuid(row.get(1)),
        label: row.get(2),
        score: row.get(3),
        selected: row.get(4),
        rejection_reason: row.get(5),
        metadata: row.get(6),
        created_at: row.get(7),
    }
}

/// Maps an evidence row to the domain record.
fn row_to_evidence(row: &Row) -> Result<Evidence, StoreError> {
    let label: String = row.get(3);
    let source_type = EvidenceSourceType::parse(&label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown evidence source type {label}")))?;
    Ok(Evidence {
        id: row.get(0),
        decision_id: DecisionId::from_uuid(row.get(1)),
        org_id: OrgId::from_uuid(row.get(2)),
        source_type,
        source_uri: row.get(4),
        content: row.get(5),
        relevance_score: row.get(6),
        embedding: row.get::<_, Option<Vector>>(7).map(|v| v.to_vec()),
        metadata: row.get(8),
        created_at: row.get(9),
    })
}

// ============================================================================
// SECTION: Bulk Inserts
// ============================================================================

/// Bulk-inserts alternatives under a decision via COPY.
pub(crate) fn insert_alternatives_tx(
    tx: &mut Transaction<'_>,
    decision_id: DecisionId,
    alternatives: &[NewAlternative],
    now: OffsetDateTime,
    copy_timeout_ms: u64,
) -> Result<Vec<Alternative>, StoreError> {
    if alternatives.is_empty() {
        return Ok(Vec::new());
    }
    let complete: Vec<Alternative> = alternatives
        .iter()
        .map(|alt| Alternative {
            id: Uuid::new_v4(),
            decision_id,
            label: alt.label.clone(),
            score: alt.score,
            selected: alt.selected,
            rejection_reason: alt.rejection_reason.clone(),
            metadata: normalized_metadata(&alt.metadata),
            created_at: now,
        })
        .collect();
    let mut buf = CopyBuffer::new();
    for alt in &complete {
        buf.raw(&alt.id);
        buf.raw(&alt.decision_id);
        buf.field(&alt.label);
        buf.opt_raw(alt.score.as_ref());
        buf.raw(&alt.selected);
        buf.opt_field(alt.rejection_reason.as_deref());
        buf.json_object(&alt.metadata);
        buf.timestamp(alt.created_at);
        buf.end_row();
    }
    let target = format!("alternatives ({ALTERNATIVE_COLUMNS})");
    copy_rows(tx, &target, &buf, copy_timeout_ms, "insert_alternatives")?;
    Ok(complete)
}

/// Bulk-inserts evidence under a decision via COPY.
pub(crate) fn insert_evidence_tx(
    tx: &mut Transaction<'_>,
    decision_id: DecisionId,
    org_id: OrgId,
    evidence: &[NewEvidence],
    now: OffsetDateTime,
    copy_timeout_ms: u64,
) -> Result<Vec<Evidence>, StoreError> {
    if evidence.is_empty() {
        return Ok(Vec::new());
    }
    let complete: Vec<Evidence> = evidence
        .iter()
        .map(|item| Evidence {
            id: Uuid::new_v4(),
            decision_id,
            org_id,
            source_type: item.source_type,
            source_uri: item.source_uri.clone(),
            content: item.content.clone(),
            relevance_score: item.relevance_score,
            embedding: item.embedding.clone(),
            metadata: normalized_metadata(&item.metadata),
            created_at: now,
        })
        .collect();
    let mut buf = CopyBuffer::new();
    for item in &complete {
        buf.raw(&item.id);
        buf.raw(&item.decision_id);
        buf.raw(&item.org_id);
        buf.field(item.source_type.as_str());
        buf.opt_field(item.source_uri.as_deref());
        buf.field(&item.content);
        buf.opt_raw(item.relevance_score.as_ref());
        buf.opt_vector(item.embedding.as_deref());
        buf.json_object(&item.metadata);
        buf.timestamp(item.created_at);
        buf.end_row();
    }
    let target = format!("evidence ({EVIDENCE_COLUMNS})");
    copy_rows(tx, &target, &buf, copy_timeout_ms, "insert_evidence")?;
    Ok(complete)
}

/// Inserts claims under a decision; small batches use plain statements.
pub(crate) fn insert_claims_tx(
    tx: &mut Transaction<'_>,
    decision_id: DecisionId,
    org_id: OrgId,
    claims: &[NewDecisionClaim],
    now: OffsetDateTime,
) -> Result<Vec<DecisionClaim>, StoreError> {
    let mut complete = Vec::with_capacity(claims.len());
    for claim in claims {
        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO decision_claims (id, decision_id, org_id, claim_text, claim_type, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &id,
                &decision_id.as_uuid(),
                &org_id.as_uuid(),
                &claim.claim_text,
                &claim.claim_type,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("insert_claims", &err))?;
        complete.push(DecisionClaim {
            id,
            decision_id,
            org_id,
            claim_text: claim.claim_text.clone(),
            claim_type: claim.claim_type.clone(),
            created_at: now,
        });
    }
    Ok(complete)
}

// ============================================================================
// SECTION: Batch Reads
// ============================================================================

/// Fetches alternatives for many decisions in one query, grouped by parent.
pub(crate) fn batch_alternatives(
    conn: &mut Client,
    decision_ids: &[Uuid],
) -> Result<BTreeMap<Uuid, Vec<Alternative>>, StoreError> {
    let sql = format!(
        "SELECT {ALTERNATIVE_COLUMNS} FROM alternatives WHERE decision_id = ANY($1) ORDER BY \
         decision_id, score DESC NULLS LAST"
    );
    let rows = conn
        .query(sql.as_str(), &[&decision_ids])
        .map_err(|err| StoreError::db("batch_alternatives", &err))?;
    let mut grouped: BTreeMap<Uuid, Vec<Alternative>> = BTreeMap::new();
    for row in &rows {
        let alternative = row_to_alternative(row);
        grouped.entry(alternative.decision_id.as_uuid()).or_default().push(alternative);
    }
    Ok(grouped)
}

/// Fetches evidence for many decisions in one org-scoped query, grouped by
/// parent.
pub(crate) fn batch_evidence(
    conn: &mut Client,
    org_id: OrgId,
    decision_ids: &[Uuid],
) -> Result<BTreeMap<Uuid, Vec<Evidence>>, StoreError> {
    let sql = format!(
        "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE org_id = $1 AND decision_id = ANY($2) \
         ORDER BY decision_id, relevance_score DESC NULLS LAST"
    );
    let rows = conn
        .query(sql.as_str(), &[&org_id.as_uuid(), &decision_ids])
        .map_err(|err| StoreError::db("batch_evidence", &err))?;
    let mut grouped: BTreeMap<Uuid, Vec<Evidence>> = BTreeMap::new();
    for row in &rows {
        let evidence = row_to_evidence(row)?;
        grouped.entry(evidence.decision_id.as_uuid()).or_default().push(evidence);
    }
    Ok(grouped)
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Reads a decision's alternatives, best score first. Org scope is
    /// enforced through the parent decision join because alternatives carry
    /// no org column of their own.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_alternatives(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
    ) -> Result<Vec<Alternative>, StoreError> {
        let mut conn = self.conn("get_alternatives")?;
        let sql = format!(
            "SELECT a.id, a.decision_id, a.label, a.score, a.selected, a.rejection_reason, \
             a.metadata, a.created_at FROM alternatives a JOIN decisions d ON d.id = \
             a.decision_id WHERE d.org_id = $1 AND a.decision_id = $2 ORDER BY a.score DESC \
             NULLS LAST"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &decision_id.as_uuid()])
            .map_err(|err| StoreError::db("get_alternatives", &err))?;
        Ok(rows.iter().map(row_to_alternative).collect())
    }

    /// Reads a decision's evidence, most relevant first, filtered by org
    /// both directly and through the parent decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_evidence(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
    ) -> Result<Vec<Evidence>, StoreError> {
        let mut conn = self.conn("get_evidence")?;
        let sql = format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE org_id = $1 AND decision_id = $2 \
             ORDER BY relevance_score DESC NULLS LAST"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &decision_id.as_uuid()])
            .map_err(|err| StoreError::db("get_evidence", &err))?;
        rows.iter().map(row_to_evidence).collect()
    }

    /// Records claims under an existing decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the decision is absent in the
    /// org, or [`StoreError`] on driver failure.
    pub fn add_claims(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
        claims: &[NewDecisionClaim],
    ) -> Result<Vec<DecisionClaim>, StoreError> {
        let mut conn = self.conn("add_claims")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("add_claims", &err))?;
        let exists = tx
            .query_opt(
                "SELECT 1 FROM decisions WHERE org_id = $1 AND id = $2",
                &[&org_id.as_uuid(), &decision_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("add_claims", &err))?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }
        let complete =
            insert_claims_tx(&mut tx, decision_id, org_id, claims, OffsetDateTime::now_utc())?;
        tx.commit().map_err(|err| StoreError::db("add_claims", &err))?;
        Ok(complete)
    }

    /// Reads a decision's claims, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_claims(
        &self,
        org_id: OrgId,
        decision_id: DecisionId,
    ) -> Result<Vec<DecisionClaim>, StoreError> {
        let mut conn = self.conn("get_claims")?;
        let rows = conn
            .query(
                "SELECT id, decision_id, org_id, claim_text, claim_type, created_at FROM \
                 decision_claims WHERE org_id = $1 AND decision_id = $2 ORDER BY created_at ASC",
                &[&org_id.as_uuid(), &decision_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("get_claims", &err))?;
        Ok(rows
            .iter()
            .map(|row| DecisionClaim {
                id: row.get(0),
                decision_id: DecisionId::from_uuid(row.get(1)),
                org_id: OrgId::from_uuid(row.get(2)),
                claim_text: row.get(3),
                claim_type: row.get(4),
                created_at: row.get(5),
            })
            .collect())
    }
}
