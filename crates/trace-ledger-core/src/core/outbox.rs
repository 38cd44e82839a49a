// crates/trace-ledger-core/src/core/outbox.rs
// ============================================================================
// Module: Search Outbox
// Description: Durable intents to replicate decisions into the vector index.
// Purpose: Model the transactional-outbox rows consumed by the indexer.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Instead of dual-writing the relational store and the external vector
//! index, writers persist an intent row in the same transaction. The row is
//! unique on `(decision_id, operation)`; re-emitting it refreshes
//! `created_at`, resets `attempts`, and clears any lease so the external
//! indexer picks it up again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::DecisionId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Vocabulary
// ============================================================================

/// Operation the external indexer must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOperation {
    /// Create or replace the decision in the vector index.
    Upsert,
    /// Remove the decision from the vector index.
    Delete,
}

impl OutboxOperation {
    /// Returns the persisted label for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "upsert" => Some(Self::Upsert),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Record
// ============================================================================

/// A persisted outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutboxRow {
    /// Subject decision.
    pub decision_id: DecisionId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Operation to perform.
    pub operation: OutboxOperation,
    /// Delivery attempts so far.
    pub attempts: i32,
    /// Lease expiry while a worker holds the row.
    #[serde(with = "time::serde::rfc3339::option")]
    pub locked_until: Option<OffsetDateTime>,
    /// When the intent was (most recently) enqueued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::OutboxOperation;

    #[test]
    fn operation_labels_roundtrip() {
        for op in [OutboxOperation::Upsert, OutboxOperation::Delete] {
            assert_eq!(OutboxOperation::parse(op.as_str()), Some(op));
        }
        assert_eq!(OutboxOperation::parse("reindex"), None);
    }
}
