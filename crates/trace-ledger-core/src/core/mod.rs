// crates/trace-ledger-core/src/core/mod.rs
// ============================================================================
// Module: Core Model
// Description: Module wiring for the ledger domain model.
// Purpose: Group record types, identifiers, and primitives under one path.
// ============================================================================

//! ## Overview
//! Submodules are grouped by record family. Everything here is plain data
//! plus pure functions; side effects live in storage crates.

pub mod agents;
pub mod assessments;
pub mod audit;
pub mod children;
pub mod conflicts;
pub mod decisions;
pub mod events;
pub mod hashing;
pub mod idempotency;
pub mod identifiers;
pub mod keys;
pub mod orgs;
pub mod outbox;
pub mod proofs;
pub mod retention;
pub mod runs;
pub mod validate;
