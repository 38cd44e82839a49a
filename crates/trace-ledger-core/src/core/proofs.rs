// crates/trace-ledger-core/src/core/proofs.rs
// ============================================================================
// Module: Integrity Proofs
// Description: Merkle-chained batch proofs over decision content hashes.
// Purpose: Model the periodic tamper-evidence anchor rows.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Each proof covers the decisions created in `(batch_start, batch_end]` for
//! one organization: their content hashes are sorted lexicographically and
//! folded into a binary Merkle root. `previous_root` equals the prior
//! proof's `root_hash`, chaining the series so no interior batch can be
//! rewritten unnoticed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Record
// ============================================================================

/// A persisted integrity proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityProof {
    /// Row identifier.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: OrgId,
    /// Exclusive start of the covered window.
    #[serde(with = "time::serde::rfc3339")]
    pub batch_start: OffsetDateTime,
    /// Inclusive end of the covered window.
    #[serde(with = "time::serde::rfc3339")]
    pub batch_end: OffsetDateTime,
    /// Decisions covered by the proof.
    pub decision_count: i64,
    /// Merkle root over the sorted content hashes.
    pub root_hash: String,
    /// Prior proof's root hash; null for the first proof of an org.
    pub previous_root: Option<String>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
