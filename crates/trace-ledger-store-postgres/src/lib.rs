// crates/trace-ledger-store-postgres/src/lib.rs
// ============================================================================
// Module: Trace Ledger Postgres Store
// Description: Durable multi-tenant Postgres storage for the ledger.
// Purpose: Implement the trace-and-decision core: atomic trace writes,
//          bi-temporal decisions, conflicts, outbox, change-stream, and the
//          retention/deletion engines.
// ============================================================================

//! ## Overview
//! One store type, [`TraceStore`], wraps an r2d2 connection pool and exposes
//! the full write/read surface: runs, events, decisions and their children,
//! scored conflicts, assessments, idempotency keys, identity records, the
//! search outbox, deletion and retention engines, and integrity proofs. A
//! separate [`ChangeStream`] owns the dedicated LISTEN connection. Every
//! statement filters by `org_id`; no code path reads across tenants.

pub mod assessments;
pub mod audit;
pub mod cancel;
pub mod children;
pub mod config;
pub mod conflicts;
pub mod copy_text;
pub mod decision_query;
pub mod decision_search;
pub mod decisions;
pub mod deletion;
pub mod error;
pub mod events;
pub mod grants;
pub mod idempotency;
pub mod identity;
pub mod migrate;
pub mod notify;
pub mod orgs;
pub mod outbox;
pub mod pool;
pub mod proofs;
pub mod retention;
pub mod retry;
pub mod runs;
pub mod sequence;
pub mod store;
pub mod trace;

pub use cancel::CancelToken;
pub use config::NotifyConfig;
pub use config::RetryPolicy;
pub use config::TraceStoreConfig;
pub use decision_query::QueriedDecision;
pub use decision_search::SearchHit;
pub use error::StoreError;
pub use migrate::run_migrations;
pub use notify::CONFLICTS_CHANNEL;
pub use notify::ChangeNotification;
pub use notify::ChangeStream;
pub use notify::DECISIONS_CHANNEL;
pub use pool::PgConn;
pub use pool::PgPool;
pub use pool::build_pool;
pub use pool::connect_notify;
pub use retry::with_retry;
pub use store::TraceStore;
pub use trace::CreateTraceParams;
pub use trace::TraceRecord;
