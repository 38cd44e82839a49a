// crates/trace-ledger-store-postgres/src/pool.rs
// ============================================================================
// Module: Connection Pool
// Description: Pooled OLTP connections plus the notify-connection factory.
// Purpose: Build r2d2-managed Postgres connections with vector-type probing.
// Dependencies: postgres, r2d2, r2d2_postgres, tracing
// ============================================================================

//! ## Overview
//! Two connection resources back the store: a pool for OLTP statements and a
//! dedicated single connection for LISTEN (owned by the change-stream, never
//! borrowed from the pool). Each new pooled connection is probed for the
//! `vector` type; absence is logged and tolerated because the extension may
//! not exist yet during bootstrap, before migrations run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use postgres::Client;
use postgres::NoTls;
use r2d2::CustomizeConnection;
use r2d2::Pool;
use r2d2::PooledConnection;
use r2d2_postgres::PostgresConnectionManager;

use crate::config::NotifyConfig;
use crate::config::TraceStoreConfig;
use crate::error::StoreError;

// ============================================================================
// SECTION: Aliases
// ============================================================================

/// The store's connection pool type.
pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;
/// A checked-out pooled connection.
pub type PgConn = PooledConnection<PostgresConnectionManager<NoTls>>;

// ============================================================================
// SECTION: Vector Probe
// ============================================================================

/// Probes freshly acquired connections for the `vector` type.
#[derive(Debug, Clone, Copy)]
struct VectorProbe;

impl CustomizeConnection<Client, postgres::Error> for VectorProbe {
    fn on_acquire(&self, conn: &mut Client) -> Result<(), postgres::Error> {
        match conn.query_opt("SELECT 1 FROM pg_type WHERE typname = 'vector'", &[]) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("vector type not present; embeddings unavailable until migrations run");
            }
            Err(err) => {
                tracing::warn!(error = %err, "vector type probe failed; continuing");
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Parses a connection string into a driver config with timeouts applied.
fn parse_config(
    connection: &str,
    connect_timeout_ms: u64,
    statement_timeout_ms: Option<u64>,
) -> Result<postgres::Config, StoreError> {
    let mut pg_config = connection
        .parse::<postgres::Config>()
        .map_err(|err| StoreError::Invalid(format!("connection string: {err}")))?;
    pg_config.connect_timeout(Duration::from_millis(connect_timeout_ms));
    if let Some(timeout) = statement_timeout_ms {
        let options = format!("-c statement_timeout={timeout}");
        pg_config.options(&options);
    }
    Ok(pg_config)
}

/// Builds the OLTP connection pool.
///
/// # Errors
///
/// Returns [`StoreError`] when the connection string is malformed or the
/// pool cannot reach the database.
pub fn build_pool(config: &TraceStoreConfig) -> Result<PgPool, StoreError> {
    let pg_config = parse_config(
        &config.connection,
        config.connect_timeout_ms,
        Some(config.statement_timeout_ms),
    )?;
    let manager = PostgresConnectionManager::new(pg_config, NoTls);
    Pool::builder()
        .max_size(config.max_connections)
        .connection_customizer(Box::new(VectorProbe))
        .build(manager)
        .map_err(|err| StoreError::pool("build_pool", &err))
}

/// Opens the dedicated notify connection for the change-stream.
///
/// No statement timeout is applied here: a LISTEN connection idles for long
/// stretches between notifications.
///
/// # Errors
///
/// Returns [`StoreError`] when the connection cannot be established.
pub fn connect_notify(config: &NotifyConfig) -> Result<Client, StoreError> {
    let pg_config = parse_config(&config.connection, config.connect_timeout_ms, None)?;
    pg_config.connect(NoTls).map_err(|err| StoreError::db("connect_notify", &err))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::parse_config;

    #[test]
    fn malformed_connection_strings_are_rejected() {
        let result = parse_config("not-a-url", 1_000, None);
        assert!(result.is_err());
    }

    #[test]
    fn valid_connection_strings_parse() {
        let result = parse_config("postgres://u:p@localhost:5432/db", 1_000, Some(30_000));
        assert!(result.is_ok());
    }
}
