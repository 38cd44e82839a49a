// crates/trace-ledger-store-postgres/src/copy_text.rs
// ============================================================================
// Module: COPY Text Encoding
// Description: Row encoding for the COPY FROM STDIN text protocol.
// Purpose: Feed bulk inserts without parameterized-statement overhead.
// Dependencies: serde_json, time
// ============================================================================

//! ## Overview
//! Bulk inserts go through the COPY protocol, not parameterized INSERTs. The
//! text format separates fields with tabs and rows with newlines; `\N`
//! represents NULL, and backslash, tab, newline, and carriage return in the
//! data must be escaped. Timestamps are rendered in the canonical RFC 3339
//! form, which the server's `timestamptz` input accepts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use postgres::Transaction;
use serde_json::Value;
use time::OffsetDateTime;
use trace_ledger_core::canonical_timestamp;

use crate::error::StoreError;

// ============================================================================
// SECTION: Row Builder
// ============================================================================

/// Accumulates COPY text rows.
#[derive(Debug, Default)]
pub struct CopyBuffer {
    /// Encoded bytes ready for the COPY writer.
    data: String,
    /// Fields written into the current row so far.
    fields_in_row: usize,
}

impl CopyBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the field separator unless at the start of a row.
    fn separate(&mut self) {
        if self.fields_in_row > 0 {
            self.data.push('\t');
        }
        self.fields_in_row += 1;
    }

    /// Writes an escaped text field.
    pub fn field(&mut self, value: &str) {
        self.separate();
        for c in value.chars() {
            match c {
                '\\' => self.data.push_str("\\\\"),
                '\t' => self.data.push_str("\\t"),
                '\n' => self.data.push_str("\\n"),
                '\r' => self.data.push_str("\\r"),
                other => self.data.push(other),
            }
        }
    }

    /// Writes a NULL field.
    pub fn null(&mut self) {
        self.separate();
        self.data.push_str("\\N");
    }

    /// Writes an optional text field.
    pub fn opt_field(&mut self, value: Option<&str>) {
        match value {
            Some(value) => self.field(value),
            None => self.null(),
        }
    }

    /// Writes a display-rendered field (numbers, UUIDs, booleans).
    pub fn raw<T: ToString>(&mut self, value: &T) {
        // Display output of the supported scalar types never contains
        // characters that need escaping, but escaping is cheap and uniform.
        let rendered = value.to_string();
        self.field(&rendered);
    }

    /// Writes an optional display-rendered field.
    pub fn opt_raw<T: ToString>(&mut self, value: Option<&T>) {
        match value {
            Some(value) => self.raw(value),
            None => self.null(),
        }
    }

    /// Writes a timestamp field in canonical RFC 3339 form.
    pub fn timestamp(&mut self, value: OffsetDateTime) {
        let rendered = canonical_timestamp(value);
        self.field(&rendered);
    }

    /// Writes a JSON field, defaulting non-objects to `{}`.
    pub fn json_object(&mut self, value: &Value) {
        let rendered = match value {
            Value::Object(_) => value.to_string(),
            _ => "{}".to_string(),
        };
        self.field(&rendered);
    }

    /// Writes an optional pgvector literal field (`[x,y,...]`).
    pub fn opt_vector(&mut self, value: Option<&[f32]>) {
        match value {
            Some(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                let rendered = format!("[{}]", parts.join(","));
                self.field(&rendered);
            }
            None => self.null(),
        }
    }

    /// Terminates the current row.
    pub fn end_row(&mut self) {
        self.data.push('\n');
        self.fields_in_row = 0;
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Returns true when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ============================================================================
// SECTION: Streaming
// ============================================================================

/// Streams a COPY buffer into `target` under the dedicated COPY timeout.
///
/// The `SET LOCAL statement_timeout` scopes the budget to the enclosing
/// transaction, keeping bulk ingest independent of the request deadline.
pub(crate) fn copy_rows(
    tx: &mut Transaction<'_>,
    target: &str,
    buf: &CopyBuffer,
    copy_timeout_ms: u64,
    call: &'static str,
) -> Result<u64, StoreError> {
    let timeout = format!("SET LOCAL statement_timeout = {copy_timeout_ms}");
    tx.batch_execute(&timeout).map_err(|err| StoreError::db(call, &err))?;
    let statement = format!("COPY {target} FROM STDIN");
    let mut writer = tx.copy_in(statement.as_str()).map_err(|err| StoreError::db(call, &err))?;
    writer.write_all(buf.as_bytes()).map_err(|err| StoreError::Database {
        call,
        message: err.to_string(),
        code: None,
    })?;
    writer.finish().map_err(|err| StoreError::db(call, &err))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CopyBuffer;

    #[test]
    fn fields_are_tab_separated_and_rows_newline_terminated() {
        let mut buf = CopyBuffer::new();
        buf.field("a");
        buf.field("b");
        buf.end_row();
        buf.field("c");
        buf.end_row();
        assert_eq!(buf.as_bytes(), b"a\tb\nc\n");
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut buf = CopyBuffer::new();
        buf.field("tab\there\nnewline\rcr\\slash");
        buf.end_row();
        assert_eq!(buf.as_bytes(), b"tab\\there\\nnewline\\rcr\\\\slash\n");
    }

    #[test]
    fn null_fields_render_as_backslash_n() {
        let mut buf = CopyBuffer::new();
        buf.opt_field(None);
        buf.opt_field(Some("x"));
        buf.end_row();
        assert_eq!(buf.as_bytes(), b"\\N\tx\n");
    }

    #[test]
    fn json_objects_pass_through_and_scalars_default() {
        let mut buf = CopyBuffer::new();
        buf.json_object(&json!({"k": "v"}));
        buf.json_object(&json!(null));
        buf.end_row();
        assert_eq!(buf.as_bytes(), b"{\"k\":\"v\"}\t{}\n");
    }

    #[test]
    fn vectors_render_as_bracketed_literals() {
        let mut buf = CopyBuffer::new();
        buf.opt_vector(Some(&[0.5, 1.0]));
        buf.opt_vector(None);
        buf.end_row();
        assert_eq!(buf.as_bytes(), b"[0.5,1]\t\\N\n");
    }

    #[test]
    fn empty_buffer_reports_empty() {
        assert!(CopyBuffer::new().is_empty());
    }
}
