// crates/trace-ledger-store-postgres/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Sentinel error kinds and driver-error wrapping.
// Purpose: Let callers branch on stable kinds without string matching while
//          preserving the failing call and SQLSTATE for diagnosis.
// Dependencies: thiserror, postgres
// ============================================================================

//! ## Overview
//! Sentinels (`NotFound`, `AlreadyRevised`, `PayloadMismatch`, `InProgress`,
//! `QuotaExceeded`, `Cancelled`) map one-to-one onto the host's error
//! envelopes. Driver failures are wrapped with the name of the failing store
//! call; the SQLSTATE survives so the retry helper can classify transient
//! serialization failures and deadlocks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::error::SqlState;
use thiserror::Error;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Errors surfaced by the Postgres store.
///
/// # Invariants
/// - Variants are stable for programmatic handling; hosts map them onto the
///   HTTP error envelope without string matching.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Zero rows matched a scoped read or update.
    #[error("not found")]
    NotFound,
    /// An optimistic revision lost the race; the decision is already
    /// superseded.
    #[error("decision already revised")]
    AlreadyRevised,
    /// An idempotency key was reused with a different request hash.
    #[error("idempotency key reused with a different payload")]
    PayloadMismatch,
    /// An idempotency key is actively reserved by another request.
    #[error("request with this idempotency key is in progress")]
    InProgress,
    /// A transactional quota check rejected the write.
    #[error("organization quota exceeded")]
    QuotaExceeded,
    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
    /// Input rejected before reaching a statement.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// Connection pool failure.
    #[error("connection pool error in {call}: {message}")]
    Pool {
        /// Failing store call.
        call: &'static str,
        /// Underlying pool error text.
        message: String,
    },
    /// Driver or protocol failure, wrapped with the failing call.
    #[error("{call} failed: {message}")]
    Database {
        /// Failing store call.
        call: &'static str,
        /// Underlying driver error text.
        message: String,
        /// SQLSTATE code, when the server reported one.
        code: Option<String>,
    },
}

impl StoreError {
    /// Wraps a driver error with the failing call name.
    #[must_use]
    pub fn db(call: &'static str, err: &postgres::Error) -> Self {
        Self::Database {
            call,
            message: err.to_string(),
            code: err.code().map(|state| state.code().to_string()),
        }
    }

    /// Wraps a pool checkout error with the failing call name.
    #[must_use]
    pub fn pool(call: &'static str, err: &r2d2::Error) -> Self {
        Self::Pool {
            call,
            message: err.to_string(),
        }
    }

    /// Returns true for serialization failures and deadlocks, which the
    /// retry helper may re-attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database { code: Some(code), .. } => {
                code == SqlState::T_R_SERIALIZATION_FAILURE.code()
                    || code == SqlState::T_R_DEADLOCK_DETECTED.code()
            }
            _ => false,
        }
    }

    /// Returns true when the error is the not-found sentinel.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::StoreError;

    #[test]
    fn transient_classification_uses_sqlstate() {
        let serialization = StoreError::Database {
            call: "revise_decision",
            message: "could not serialize access".to_string(),
            code: Some("40001".to_string()),
        };
        let deadlock = StoreError::Database {
            call: "revise_decision",
            message: "deadlock detected".to_string(),
            code: Some("40P01".to_string()),
        };
        let unique = StoreError::Database {
            call: "create_agent",
            message: "duplicate key".to_string(),
            code: Some("23505".to_string()),
        };
        assert!(serialization.is_transient());
        assert!(deadlock.is_transient());
        assert!(!unique.is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::Cancelled.is_transient());
    }

    #[test]
    fn sentinels_are_matchable() {
        assert!(StoreError::NotFound.is_not_found());
        assert!(!StoreError::AlreadyRevised.is_not_found());
    }

    #[test]
    fn database_errors_name_the_failing_call() {
        let err = StoreError::Database {
            call: "get_run",
            message: "connection reset".to_string(),
            code: None,
        };
        assert!(err.to_string().starts_with("get_run failed"));
    }
}
