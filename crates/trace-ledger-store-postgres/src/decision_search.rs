// crates/trace-ledger-store-postgres/src/decision_search.rs
// ============================================================================
// Module: Decision Text Search
// Description: Two-stage full-text search with substring fallback.
// Purpose: Rank current decisions by relevance, quality, and recency.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Stage one queries the stored `tsvector` with `websearch_to_tsquery`,
//! scoring hits as `ts_rank x (0.6 + 0.3 * completeness_score) x
//! recency_decay`, where the decay halves relevance roughly every 90 days.
//! A tsquery parse error of the user-supplied text falls through to stage
//! two instead of erroring: up to 20 whitespace tokens, wildcard-escaped,
//! matched case-insensitively against outcome, reasoning, and decision
//! type with OR semantics, scored by the quality-recency factor alone.
//! Both stages see only current decisions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::error::SqlState;
use postgres::types::ToSql;
use serde::Deserialize;
use serde::Serialize;
use trace_ledger_core::Decision;
use trace_ledger_core::OrgId;

use crate::decisions::DECISION_COLUMNS;
use crate::decisions::row_to_decision;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum tokens considered by the fallback stage.
const FALLBACK_TOKEN_CAP: usize = 20;

/// Quality-times-recency scoring factor shared by both stages.
const QUALITY_RECENCY_SQL: &str = "((0.6 + 0.3 * completeness_score) * (1.0 / (1.0 + \
                                   EXTRACT(EPOCH FROM (now() - valid_from)) / 86400.0 / 90.0)))";

// ============================================================================
// SECTION: Results
// ============================================================================

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching decision.
    pub decision: Decision,
    /// Relevance score; comparable only within one response.
    pub score: f64,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Escapes LIKE wildcard characters in a fallback token.
pub(crate) fn escape_like(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Splits the query into at most [`FALLBACK_TOKEN_CAP`] whitespace tokens.
pub(crate) fn fallback_tokens(query: &str) -> Vec<String> {
    query.split_whitespace().take(FALLBACK_TOKEN_CAP).map(str::to_owned).collect()
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Searches current decisions by free text. The limit clamps into
    /// `[1, 1000]` with a default of 50.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure; a malformed user query is
    /// not an error (the fallback stage runs instead).
    pub fn search_decisions(
        &self,
        org_id: OrgId,
        query: &str,
        limit: Option<i64>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let limit = clamp_limit(limit, 50, 1_000);
        match self.search_fts(org_id, trimmed, limit) {
            Ok(hits) => Ok(hits),
            Err(StoreError::Database { code: Some(code), .. })
                if code == SqlState::SYNTAX_ERROR.code() =>
            {
                self.search_fallback(org_id, trimmed, limit)
            }
            Err(err) => Err(err),
        }
    }

    /// Stage one: full-text query with stemming and stop-word handling.
    fn search_fts(
        &self,
        org_id: OrgId,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut conn = self.conn("search_decisions")?;
        let sql = format!(
            "SELECT {DECISION_COLUMNS}, (ts_rank(search_tsv, q) * \
             {QUALITY_RECENCY_SQL})::float8 AS score FROM decisions, \
             websearch_to_tsquery('english', $2) q WHERE org_id = $1 AND valid_to IS NULL AND \
             search_tsv @@ q ORDER BY score DESC LIMIT $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &query, &limit])
            .map_err(|err| StoreError::db("search_decisions", &err))?;
        Ok(rows
            .iter()
            .map(|row| SearchHit {
                decision: row_to_decision(row),
                score: row.get("score"),
            })
            .collect())
    }

    /// Stage two: escaped substring OR-match over outcome, reasoning, and
    /// decision type. One token hit qualifies the row.
    fn search_fallback(
        &self,
        org_id: OrgId,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let tokens = fallback_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut params: Vec<Box<dyn ToSql + Sync>> = vec![Box::new(org_id.as_uuid())];
        let mut token_clauses = Vec::with_capacity(tokens.len());
        for token in &tokens {
            params.push(Box::new(format!("%{}%", escape_like(token))));
            let slot = params.len();
            token_clauses.push(format!(
                "(outcome ILIKE ${slot} OR reasoning ILIKE ${slot} OR decision_type ILIKE \
                 ${slot})"
            ));
        }
        let statement = format!(
            "SELECT {DECISION_COLUMNS}, {QUALITY_RECENCY_SQL}::float8 AS score FROM decisions \
             WHERE org_id = $1 AND valid_to IS NULL AND ({}) ORDER BY score DESC LIMIT {limit}",
            token_clauses.join(" OR ")
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(AsRef::as_ref).collect();
        let mut conn = self.conn("search_decisions")?;
        let rows = conn
            .query(statement.as_str(), &refs)
            .map_err(|err| StoreError::db("search_decisions", &err))?;
        Ok(rows
            .iter()
            .map(|row| SearchHit {
                decision: row_to_decision(row),
                score: row.get("score"),
            })
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::escape_like;
    use super::fallback_tokens;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_done\\x"), "50\\%\\_done\\\\x");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn fallback_tokenization_caps_at_twenty() {
        let many = (0..40).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(fallback_tokens(&many).len(), 20);
        assert_eq!(fallback_tokens("  chose   postgres  "), vec!["chose", "postgres"]);
        assert!(fallback_tokens("   ").is_empty());
    }
}
