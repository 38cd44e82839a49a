// crates/trace-ledger-core/src/core/retention.rs
// ============================================================================
// Module: Retention and Deletion Records
// Description: Legal holds, purge outcomes, and the archival deletion log.
// Purpose: Model the records driving and documenting data removal.
// Dependencies: serde, time, serde_json
// ============================================================================

//! ## Overview
//! Legal holds cover a time window, optionally restricted to decision types
//! and agents; while a hold is active (`released_at IS NULL`) its covered
//! rows are not purgeable. Every purge or deletion run writes a
//! `deletion_log` row documenting what was removed and why.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::identifiers::HoldId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Legal Holds
// ============================================================================

/// A persisted legal hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalHold {
    /// Hold identifier.
    pub id: HoldId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Why the hold exists.
    pub reason: String,
    /// Start of the covered window, inclusive.
    #[serde(with = "time::serde::rfc3339")]
    pub hold_start: OffsetDateTime,
    /// End of the covered window, inclusive.
    #[serde(with = "time::serde::rfc3339")]
    pub hold_end: OffsetDateTime,
    /// Restrict coverage to these decision types; null covers all.
    pub decision_types: Option<Vec<String>>,
    /// Restrict coverage to these agents; null covers all.
    pub agent_ids: Option<Vec<String>>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the hold was released; active while null.
    #[serde(with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
}

/// Parameters for placing a hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLegalHold {
    /// Why the hold exists.
    pub reason: String,
    /// Start of the covered window, inclusive.
    #[serde(with = "time::serde::rfc3339")]
    pub hold_start: OffsetDateTime,
    /// End of the covered window, inclusive.
    #[serde(with = "time::serde::rfc3339")]
    pub hold_end: OffsetDateTime,
    /// Restrict coverage to these decision types; null covers all.
    pub decision_types: Option<Vec<String>>,
    /// Restrict coverage to these agents; null covers all.
    pub agent_ids: Option<Vec<String>>,
}

// ============================================================================
// SECTION: Outcomes and Logs
// ============================================================================

/// Outcome of one retention or deletion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionOutcome {
    /// Rows removed, keyed by table name.
    pub deleted: BTreeMap<String, u64>,
    /// Batches processed.
    pub batches: u64,
    /// Cutoff applied; rows created before it were eligible.
    #[serde(with = "time::serde::rfc3339::option")]
    pub cutoff: Option<OffsetDateTime>,
}

impl RetentionOutcome {
    /// Outcome of a run that removed nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            deleted: BTreeMap::new(),
            batches: 0,
            cutoff: None,
        }
    }

    /// Total rows removed across all tables.
    #[must_use]
    pub fn total_deleted(&self) -> u64 {
        self.deleted.values().sum()
    }
}

/// A persisted deletion log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionLogEntry {
    /// Row identifier.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: OrgId,
    /// What started the run (`retention`, `agent_delete`, `manual`).
    pub trigger: String,
    /// Who started the run.
    pub initiated_by: String,
    /// Selection criteria snapshot.
    pub criteria: Value,
    /// Rows removed, keyed by table name.
    pub deleted_counts: Value,
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the run finished.
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::RetentionOutcome;

    #[test]
    fn outcome_totals_sum_tables() {
        let mut outcome = RetentionOutcome::empty();
        outcome.deleted.insert("decisions".to_string(), 3);
        outcome.deleted.insert("evidence".to_string(), 5);
        assert_eq!(outcome.total_deleted(), 8);
        assert_eq!(RetentionOutcome::empty().total_deleted(), 0);
    }
}
