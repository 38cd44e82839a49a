// crates/trace-ledger-store-postgres/src/notify.rs
// ============================================================================
// Module: Change Stream
// Description: LISTEN/NOTIFY subscription over a dedicated connection.
// Purpose: Deliver change notifications with reconnect and re-subscription.
// Dependencies: postgres, rand, tracing
// ============================================================================

//! ## Overview
//! The change-stream owns one dedicated connection, never borrowed from the
//! pool. `listen` records the channel so reconnects can re-subscribe;
//! `wait_for_notification` blocks up to the given window. A connection
//! failure drops the client and surfaces an error; `reconnect` then redials
//! with exponential backoff plus jitter, re-issuing LISTEN for every
//! tracked channel. A generation counter distinguishes a waiter's stale
//! failure from a live one: if another thread already reconnected, the
//! failed waiter's reconnect call is a no-op and it simply retries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use postgres::Client;
use postgres::fallible_iterator::FallibleIterator;
use rand::Rng;

use crate::cancel::CancelToken;
use crate::config::NotifyConfig;
use crate::error::StoreError;
use crate::pool::connect_notify;

// ============================================================================
// SECTION: Channels
// ============================================================================

/// Channel carrying decision create/revise payloads.
pub const DECISIONS_CHANNEL: &str = "decisions";
/// Channel carrying conflict detection payloads.
pub const CONFLICTS_CHANNEL: &str = "conflicts";

// ============================================================================
// SECTION: Types
// ============================================================================

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Channel the notification arrived on.
    pub channel: String,
    /// Short JSON payload sufficient to re-fetch the changed record.
    pub payload: String,
}

/// Connection state guarded by the notify lock.
struct NotifyState {
    /// Live client; `None` after a failure until reconnect succeeds.
    client: Option<Client>,
    /// Bumped on every successful reconnect.
    generation: u64,
}

/// Change-stream handle over the dedicated LISTEN connection.
pub struct ChangeStream {
    /// Connection configuration for dial and redial.
    config: NotifyConfig,
    /// Guarded connection state; only one thread reads at a time.
    state: Mutex<NotifyState>,
    /// Channels to re-subscribe after a reconnect.
    channels: Mutex<BTreeSet<String>>,
}

impl ChangeStream {
    /// Opens the dedicated notify connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the connection cannot be established.
    pub fn connect(config: &NotifyConfig) -> Result<Self, StoreError> {
        let client = connect_notify(config)?;
        Ok(Self {
            config: config.clone(),
            state: Mutex::new(NotifyState {
                client: Some(client),
                generation: 1,
            }),
            channels: Mutex::new(BTreeSet::new()),
        })
    }

    /// Returns the current connection generation (bumps per reconnect).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).generation
    }

    /// Subscribes to a channel and records it for re-subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the LISTEN statement fails; the channel
    /// is still tracked, so the next reconnect subscribes it.
    pub fn listen(&self, channel: &str) -> Result<(), StoreError> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_string());
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(client) = state.client.as_mut() else {
            return Err(StoreError::Database {
                call: "listen",
                message: "notify connection is down".to_string(),
                code: None,
            });
        };
        let statement = format!("LISTEN {}", quote_channel(channel));
        if let Err(err) = client.batch_execute(&statement) {
            state.client = None;
            return Err(StoreError::db("listen", &err));
        }
        Ok(())
    }

    /// Blocks up to `wait` for one notification. `Ok(None)` means the
    /// window elapsed quietly; an error means the connection failed and the
    /// caller should `reconnect` and retry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on connection failure.
    pub fn wait_for_notification(
        &self,
        wait: Duration,
    ) -> Result<Option<ChangeNotification>, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(client) = state.client.as_mut() else {
            return Err(StoreError::Database {
                call: "wait_for_notification",
                message: "notify connection is down".to_string(),
                code: None,
            });
        };
        let mut notifications = client.notifications();
        let mut iter = notifications.timeout_iter(wait);
        let next = iter.next();
        drop(iter);
        drop(notifications);
        match next {
            Ok(Some(notification)) => Ok(Some(ChangeNotification {
                channel: notification.channel().to_string(),
                payload: notification.payload().to_string(),
            })),
            Ok(None) => Ok(None),
            Err(err) => {
                // Drop the dead client; the generation stays until a
                // reconnect succeeds, letting racing waiters detect that
                // someone else already repaired the stream.
                state.client = None;
                Err(StoreError::db("wait_for_notification", &err))
            }
        }
    }

    /// Re-establishes the connection and re-subscribes every tracked
    /// channel, backing off 0.5s/1s/2s/4s/8s with jitter across attempts.
    /// When another thread already reconnected, returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] when the token fires, or the last
    /// dial error once the attempts are exhausted.
    pub fn reconnect(&self, cancel: &CancelToken) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.client.is_some() {
            // A concurrent reconnect already won; the caller's error was
            // stale.
            return Ok(());
        }
        let channels: Vec<String> = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        let mut last_error = None;
        for attempt in 0..self.config.reconnect_attempts {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            match self.dial_and_subscribe(&channels) {
                Ok(client) => {
                    state.client = Some(client);
                    state.generation += 1;
                    tracing::info!(
                        generation = state.generation,
                        channels = channels.len(),
                        "notify connection restored"
                    );
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "notify reconnect attempt failed");
                    last_error = Some(err);
                }
            }
            let base = self.config.reconnect_base_ms.saturating_mul(1 << attempt.min(16));
            let sleep = base + rand::thread_rng().gen_range(0..base.max(1));
            if cancel.wait_cancelled(Duration::from_millis(sleep)) {
                return Err(StoreError::Cancelled);
            }
        }
        Err(last_error.unwrap_or(StoreError::Database {
            call: "reconnect",
            message: "reconnect attempts exhausted".to_string(),
            code: None,
        }))
    }

    /// Dials a fresh connection and issues LISTEN for every channel.
    fn dial_and_subscribe(&self, channels: &[String]) -> Result<Client, StoreError> {
        let mut client = connect_notify(&self.config)?;
        for channel in channels {
            let statement = format!("LISTEN {}", quote_channel(channel));
            client.batch_execute(&statement).map_err(|err| StoreError::db("reconnect", &err))?;
        }
        Ok(client)
    }
}

/// Quotes a channel name as a SQL identifier.
fn quote_channel(channel: &str) -> String {
    format!("\"{}\"", channel.replace('"', "\"\""))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::quote_channel;

    #[test]
    fn channel_names_are_identifier_quoted() {
        assert_eq!(quote_channel("decisions"), "\"decisions\"");
        assert_eq!(quote_channel("we\"ird"), "\"we\"\"ird\"");
    }
}
