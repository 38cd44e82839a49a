// system-tests/src/lib.rs
// ============================================================================
// Module: System Tests Crate
// Description: Placeholder library for the feature-gated test suites.
// Purpose: Anchor the package; all behavior lives under tests/.
// ============================================================================

//! Postgres-backed system-test suites for the trace ledger. Enable the
//! `system-tests` feature to run them; each suite provisions a disposable
//! Postgres container via testcontainers.
