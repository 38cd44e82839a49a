// crates/trace-ledger-store-postgres/src/events.rs
// ============================================================================
// Module: Event Store
// Description: High-throughput append-only event log over COPY.
// Purpose: Bulk-ingest events with partition management and idempotent
//          crash recovery.
// Dependencies: postgres, time
// ============================================================================

//! ## Overview
//! Events land in the time-partitioned `agent_events` table through the COPY
//! protocol under a dedicated 30-second statement timeout, decoupled from
//! the caller's deadline. Sequence numbers are reserved in bulk and assigned
//! to the input slice in order. The idempotent variant stages rows in a
//! per-transaction temp table and inserts with `ON CONFLICT DO NOTHING` so a
//! crash-recovery replay never duplicates rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use postgres::Row;
use postgres::Transaction;
use time::Date;
use time::Month;
use time::OffsetDateTime;
use time::UtcOffset;
use trace_ledger_core::AgentEvent;
use trace_ledger_core::EventId;
use trace_ledger_core::EventType;
use trace_ledger_core::NewAgentEvent;
use trace_ledger_core::OrgId;
use trace_ledger_core::RunId;
use trace_ledger_core::normalized_metadata;

use crate::copy_text::CopyBuffer;
use crate::copy_text::copy_rows;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default and maximum page size for event reads.
const EVENT_READ_CAP: i64 = 10_000;

/// COPY column list shared by both ingest paths.
const EVENT_COPY_COLUMNS: &str =
    "id, run_id, org_id, event_type, sequence_num, occurred_at, agent_id, payload, created_at";

// ============================================================================
// SECTION: Partition Helpers
// ============================================================================

/// Returns the partition table name for a timestamp's UTC month.
pub(crate) fn partition_name(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    format!("agent_events_{:04}{:02}", utc.year(), u8::from(utc.month()))
}

/// Returns the `[start, end)` day bounds of a timestamp's UTC month.
pub(crate) fn month_bounds(ts: OffsetDateTime) -> (Date, Date) {
    let utc = ts.to_offset(UtcOffset::UTC);
    let start = Date::from_calendar_date(utc.year(), utc.month(), 1)
        .unwrap_or(Date::MIN);
    let (next_year, next_month) = match utc.month() {
        Month::December => (utc.year() + 1, Month::January),
        month => (utc.year(), month.next()),
    };
    let end = Date::from_calendar_date(next_year, next_month, 1).unwrap_or(Date::MAX);
    (start, end)
}

/// Creates the monthly partitions covering `timestamps`, if missing.
fn ensure_partitions(
    tx: &mut Transaction<'_>,
    timestamps: impl Iterator<Item = OffsetDateTime>,
) -> Result<(), StoreError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for ts in timestamps {
        let name = partition_name(ts);
        if !seen.insert(name.clone()) {
            continue;
        }
        let (start, end) = month_bounds(ts);
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {name} PARTITION OF agent_events FOR VALUES FROM \
             ('{start}') TO ('{end}')"
        );
        tx.batch_execute(&ddl).map_err(|err| StoreError::db("ensure_partitions", &err))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps an event row to the domain record.
fn row_to_event(row: &Row) -> Result<AgentEvent, StoreError> {
    let label: String = row.get(3);
    let event_type = EventType::parse(&label)
        .ok_or_else(|| StoreError::Invalid(format!("unknown event type {label}")))?;
    Ok(AgentEvent {
        id: EventId::from_uuid(row.get(0)),
        run_id: RunId::from_uuid(row.get(1)),
        org_id: OrgId::from_uuid(row.get(2)),
        event_type,
        sequence_num: row.get(4),
        occurred_at: row.get(5),
        agent_id: row.get(6),
        payload: row.get(7),
        created_at: row.get(8),
    })
}

/// Encodes one complete event into the COPY buffer.
fn encode_event(buf: &mut CopyBuffer, event: &AgentEvent) {
    buf.raw(&event.id);
    buf.raw(&event.run_id);
    buf.raw(&event.org_id);
    buf.field(event.event_type.as_str());
    buf.raw(&event.sequence_num);
    buf.timestamp(event.occurred_at);
    buf.field(&event.agent_id);
    buf.json_object(&event.payload);
    buf.timestamp(event.created_at);
    buf.end_row();
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Bulk-appends events, assigning ids and sequence numbers to the input
    /// slice in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure; on error nothing persists.
    pub fn insert_events(
        &self,
        org_id: OrgId,
        events: &[NewAgentEvent],
    ) -> Result<Vec<AgentEvent>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let count = i64::try_from(events.len())
            .map_err(|_| StoreError::Invalid("event batch too large".to_string()))?;
        let sequence_nums = self.reserve_sequence_nums(count)?;
        let now = OffsetDateTime::now_utc();
        let complete: Vec<AgentEvent> = events
            .iter()
            .zip(sequence_nums)
            .map(|(event, sequence_num)| AgentEvent {
                id: EventId::generate(),
                run_id: event.run_id,
                org_id,
                event_type: event.event_type,
                sequence_num,
                occurred_at: event.occurred_at,
                agent_id: event.agent_id.clone(),
                payload: normalized_metadata(&event.payload),
                created_at: now,
            })
            .collect();
        let mut conn = self.conn("insert_events")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("insert_events", &err))?;
        ensure_partitions(&mut tx, complete.iter().map(|event| event.occurred_at))?;
        let mut buf = CopyBuffer::new();
        for event in &complete {
            encode_event(&mut buf, event);
        }
        let target = format!("agent_events ({EVENT_COPY_COLUMNS})");
        copy_rows(&mut tx, &target, &buf, self.copy_timeout_ms(), "insert_events")?;
        tx.commit().map_err(|err| StoreError::db("insert_events", &err))?;
        Ok(complete)
    }

    /// Re-appends previously constructed events for crash recovery: rows are
    /// staged in a per-transaction temp table and inserted with
    /// `ON CONFLICT DO NOTHING`, so replays never duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure; on error nothing persists.
    pub fn insert_events_idempotent(&self, events: &[AgentEvent]) -> Result<u64, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn("insert_events_idempotent")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("insert_events_idempotent", &err))?;
        ensure_partitions(&mut tx, events.iter().map(|event| event.occurred_at))?;
        tx.batch_execute(
            "CREATE TEMP TABLE agent_events_staging (LIKE agent_events INCLUDING DEFAULTS) ON \
             COMMIT DROP",
        )
        .map_err(|err| StoreError::db("insert_events_idempotent", &err))?;
        let mut buf = CopyBuffer::new();
        for event in events {
            encode_event(&mut buf, event);
        }
        let target = format!("agent_events_staging ({EVENT_COPY_COLUMNS})");
        copy_rows(&mut tx, &target, &buf, self.copy_timeout_ms(), "insert_events_idempotent")?;
        let insert = format!(
            "INSERT INTO agent_events ({EVENT_COPY_COLUMNS}) SELECT {EVENT_COPY_COLUMNS} FROM \
             agent_events_staging ON CONFLICT (id, occurred_at) DO NOTHING"
        );
        let inserted = tx
            .execute(insert.as_str(), &[])
            .map_err(|err| StoreError::db("insert_events_idempotent", &err))?;
        tx.commit().map_err(|err| StoreError::db("insert_events_idempotent", &err))?;
        Ok(inserted)
    }

    /// Reads a run's events ordered by `sequence_num`. The cap defaults to
    /// 10 000; callers detect truncation by `len == limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn get_events_by_run(
        &self,
        org_id: OrgId,
        run_id: RunId,
        limit: Option<i64>,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        let limit = clamp_limit(limit, EVENT_READ_CAP, EVENT_READ_CAP);
        let mut conn = self.conn("get_events_by_run")?;
        let sql = format!(
            "SELECT {EVENT_COPY_COLUMNS} FROM agent_events WHERE org_id = $1 AND run_id = $2 \
             ORDER BY sequence_num ASC LIMIT $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &run_id.as_uuid(), &limit])
            .map_err(|err| StoreError::db("get_events_by_run", &err))?;
        rows.iter().map(row_to_event).collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::month_bounds;
    use super::partition_name;

    #[test]
    fn partition_names_encode_utc_months() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        assert_eq!(partition_name(ts), "agent_events_202311");
    }

    #[test]
    fn month_bounds_cover_the_month_half_open() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let (start, end) = month_bounds(ts);
        assert_eq!(start.to_string(), "2023-11-01");
        assert_eq!(end.to_string(), "2023-12-01");
    }

    #[test]
    fn december_rolls_into_next_year() {
        let ts = OffsetDateTime::from_unix_timestamp(1_703_980_800).expect("timestamp");
        assert_eq!(partition_name(ts), "agent_events_202312");
        let (start, end) = month_bounds(ts);
        assert_eq!(start.to_string(), "2023-12-01");
        assert_eq!(end.to_string(), "2024-01-01");
    }
}
