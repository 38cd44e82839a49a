// crates/trace-ledger-store-postgres/src/sequence.rs
// ============================================================================
// Module: Sequence Allocator
// Description: Global monotonic event numbering.
// Purpose: Reserve blocks of strictly increasing sequence numbers.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Event sequence numbers come from the single server-side sequence
//! `event_sequence_num_seq`. A reservation returns `count` ascending values;
//! values across concurrent callers never collide, and gaps between blocks
//! simply indicate concurrent reservations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::StoreError;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Allocator
// ============================================================================

impl TraceStore {
    /// Reserves `count` strictly monotonic sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure or a zero `count`.
    pub fn reserve_sequence_nums(&self, count: i64) -> Result<Vec<i64>, StoreError> {
        if count <= 0 {
            return Err(StoreError::Invalid("sequence count must be positive".to_string()));
        }
        let mut conn = self.conn("reserve_sequence_nums")?;
        let rows = conn
            .query(
                "SELECT nextval('event_sequence_num_seq') FROM generate_series(1, $1)",
                &[&count],
            )
            .map_err(|err| StoreError::db("reserve_sequence_nums", &err))?;
        let mut values: Vec<i64> = rows.iter().map(|row| row.get(0)).collect();
        values.sort_unstable();
        Ok(values)
    }
}
