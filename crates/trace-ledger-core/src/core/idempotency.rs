// crates/trace-ledger-core/src/core/idempotency.rs
// ============================================================================
// Module: Idempotency Keys
// Description: Reservation/replay protocol state for non-idempotent writes.
// Purpose: Model the lookup result the store hands back to hosts.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A key is unique per `(org, actor, endpoint, idempotency_key)`. The first
//! insert wins the reservation; concurrent holders of the same key observe
//! either a live reservation or the completed replay. A key presented with a
//! different request hash is a payload mismatch, never a replay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Vocabulary
// ============================================================================

/// Reservation status of an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    /// Reservation held; the first caller is still processing.
    InProgress,
    /// Processing finished; the stored response replays on retry.
    Completed,
}

impl IdempotencyStatus {
    /// Returns the persisted label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Lookup Result
// ============================================================================

/// Result of beginning idempotent processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyLookup {
    /// True when a prior invocation already completed and the stored
    /// response should be replayed.
    pub completed: bool,
    /// HTTP status of the stored response, when completed.
    pub status_code: Option<i32>,
    /// Raw response payload, when completed.
    pub response_data: Option<Value>,
}

impl IdempotencyLookup {
    /// Lookup representing a fresh reservation owned by the caller.
    #[must_use]
    pub const fn fresh() -> Self {
        Self {
            completed: false,
            status_code: None,
            response_data: None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
