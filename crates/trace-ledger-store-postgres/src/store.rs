// crates/trace-ledger-store-postgres/src/store.rs
// ============================================================================
// Module: Trace Store
// Description: The store handle wrapping the OLTP pool.
// Purpose: Own the pool, retry policy, and COPY budget shared by every
//          operation module.
// Dependencies: postgres, r2d2
// ============================================================================

//! ## Overview
//! [`TraceStore`] is the single entry point for relational operations. The
//! operation surface is spread over sibling modules (`runs`, `events`,
//! `decisions`, ...) as `impl TraceStore` blocks; this module only holds
//! construction and connection plumbing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::config::RetryPolicy;
use crate::config::TraceStoreConfig;
use crate::error::StoreError;
use crate::pool::PgConn;
use crate::pool::PgPool;
use crate::pool::build_pool;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Postgres-backed trace-and-decision store.
pub struct TraceStore {
    /// OLTP connection pool.
    pool: PgPool,
    /// Retry budget for transient failures.
    retry: RetryPolicy,
    /// Dedicated COPY timeout in milliseconds.
    copy_timeout_ms: u64,
}

impl TraceStore {
    /// Creates a store over a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the pool cannot be built.
    pub fn new(config: &TraceStoreConfig) -> Result<Self, StoreError> {
        let pool = build_pool(config)?;
        Ok(Self {
            pool,
            retry: config.retry,
            copy_timeout_ms: config.copy_timeout_ms,
        })
    }

    /// Creates a store over an existing pool (used by fixtures).
    #[must_use]
    pub fn from_pool(pool: PgPool, config: &TraceStoreConfig) -> Self {
        Self {
            pool,
            retry: config.retry,
            copy_timeout_ms: config.copy_timeout_ms,
        }
    }

    /// Checks out a pooled connection, naming the failing call on error.
    pub(crate) fn conn(&self, call: &'static str) -> Result<PgConn, StoreError> {
        self.pool.get().map_err(|err| StoreError::pool(call, &err))
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Returns the dedicated COPY timeout in milliseconds.
    #[must_use]
    pub const fn copy_timeout_ms(&self) -> u64 {
        self.copy_timeout_ms
    }
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Clamps a requested page size into `[1, max]`, falling back to `default`.
pub(crate) fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::clamp_limit;

    #[test]
    fn limits_clamp_into_range() {
        assert_eq!(clamp_limit(None, 50, 1_000), 50);
        assert_eq!(clamp_limit(Some(0), 50, 1_000), 1);
        assert_eq!(clamp_limit(Some(-5), 50, 1_000), 1);
        assert_eq!(clamp_limit(Some(10), 50, 1_000), 10);
        assert_eq!(clamp_limit(Some(9_999), 50, 1_000), 1_000);
    }
}
