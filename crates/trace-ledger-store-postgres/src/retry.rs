// crates/trace-ledger-store-postgres/src/retry.rs
// ============================================================================
// Module: Retry Helper
// Description: Bounded retry with jittered backoff for transient failures.
// Purpose: Re-attempt serialization failures and deadlocks transparently.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Wraps a closure and retries only errors classified transient by
//! [`StoreError::is_transient`]: serialization failures (40001) and
//! deadlocks (40P01). The delay doubles each attempt and the actual sleep is
//! `delay + U[0, delay)`. Cancellation is terminal: a fired token returns
//! [`StoreError::Cancelled`] immediately, even mid-sleep.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::cancel::CancelToken;
use crate::config::RetryPolicy;
use crate::error::StoreError;

// ============================================================================
// SECTION: Retry Loop
// ============================================================================

/// Computes the jittered sleep for a 0-based attempt index.
fn jittered_sleep_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let base = policy.delay_ms(attempt);
    if base == 0 {
        return 0;
    }
    base + rand::thread_rng().gen_range(0..base)
}

/// Runs `op`, retrying transient failures up to `policy.max_retries` times.
///
/// # Errors
///
/// Returns the last error once the budget is exhausted, the first
/// non-transient error unchanged, or [`StoreError::Cancelled`] when the
/// token fires.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let sleep_ms = jittered_sleep_ms(policy, attempt);
                tracing::debug!(attempt, sleep_ms, error = %err, "retrying transient failure");
                if cancel.wait_cancelled(Duration::from_millis(sleep_ms)) {
                    return Err(StoreError::Cancelled);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::with_retry;
    use crate::cancel::CancelToken;
    use crate::config::RetryPolicy;
    use crate::error::StoreError;

    /// A policy with no sleep so tests run instantly.
    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 0,
        }
    }

    /// Builds a transient serialization failure.
    fn transient() -> StoreError {
        StoreError::Database {
            call: "op",
            message: "could not serialize access".to_string(),
            code: Some("40001".to_string()),
        }
    }

    #[test]
    fn first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), &CancelToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_failures_are_retried_up_to_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&fast_policy(3), &CancelToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        });
        assert!(result.is_err());
        // max_retries + 1 attempts in total.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn transient_then_success_recovers() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), &CancelToken::new(), || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&fast_policy(3), &CancelToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound)
        });
        assert!(matches!(result, Err(StoreError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_is_terminal() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&fast_policy(3), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        });
        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
