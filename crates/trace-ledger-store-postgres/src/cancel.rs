// crates/trace-ledger-store-postgres/src/cancel.rs
// ============================================================================
// Module: Cancellation Token
// Description: Cooperative cancellation shared across worker threads.
// Purpose: Let hosts interrupt retry sleeps and reconnect backoff.
// Dependencies: std::sync
// ============================================================================

//! ## Overview
//! A clonable token backed by a mutex/condvar pair. Waiters sleep on the
//! condvar so `cancel()` wakes them immediately instead of letting a backoff
//! sleep run to completion. Once fired, a token stays fired.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Token
// ============================================================================

/// Shared cancellation state.
#[derive(Debug, Default)]
struct CancelState {
    /// Fired flag guarded by the condvar's mutex.
    fired: Mutex<bool>,
    /// Wakes sleepers when the token fires.
    signal: Condvar,
}

/// Cooperative cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared state across clones.
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Creates an unfired token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token, waking every sleeper. Idempotent.
    pub fn cancel(&self) {
        let mut fired = self.state.fired.lock().unwrap_or_else(PoisonError::into_inner);
        *fired = true;
        drop(fired);
        self.state.signal.notify_all();
    }

    /// Returns true once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.fired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps up to `timeout`, returning early with `true` when the token
    /// fires during the wait.
    #[must_use]
    pub fn wait_cancelled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self.state.fired.lock().unwrap_or_else(PoisonError::into_inner);
        while !*fired {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, wait) = match self.state.signal.wait_timeout(fired, deadline - now) {
                Ok(pair) => pair,
                Err(poisoned) => {
                    let (guard, wait) = poisoned.into_inner();
                    (guard, wait)
                }
            };
            fired = guard;
            if wait.timed_out() && !*fired {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
