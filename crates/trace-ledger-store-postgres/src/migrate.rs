// crates/trace-ledger-store-postgres/src/migrate.rs
// ============================================================================
// Module: Migrations Runner
// Description: Ordered, single-apply schema migrations.
// Purpose: Bring a database to the current schema idempotently.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Forward-only. Applied versions are tracked in `schema_migrations`;
//! filesystem entries sort lexicographically and every `.sql` file not yet
//! recorded executes inside its own transaction together with the version
//! insert. Re-running against a migrated database is a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use postgres::Client;

use crate::error::StoreError;

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Collects the sorted `.sql` entries of a migrations directory.
fn sql_entries(dir: &Path) -> Result<Vec<(String, String)>, StoreError> {
    let mut entries = Vec::new();
    let listing = fs::read_dir(dir)
        .map_err(|err| StoreError::Invalid(format!("migrations dir {}: {err}", dir.display())))?;
    for entry in listing {
        let entry =
            entry.map_err(|err| StoreError::Invalid(format!("migrations dir entry: {err}")))?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "sql") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&path)
            .map_err(|err| StoreError::Invalid(format!("read {}: {err}", path.display())))?;
        entries.push((name.to_string(), contents));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Applies pending migrations from `dir`, returning the versions applied in
/// this run.
///
/// # Errors
///
/// Returns [`StoreError`] when the directory is unreadable or a statement
/// fails; the failing migration's transaction rolls back and earlier
/// migrations stay applied.
pub fn run_migrations(client: &mut Client, dir: &Path) -> Result<Vec<String>, StoreError> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at \
             TIMESTAMPTZ NOT NULL DEFAULT now())",
        )
        .map_err(|err| StoreError::db("run_migrations", &err))?;
    let applied: BTreeSet<String> = client
        .query("SELECT version FROM schema_migrations", &[])
        .map_err(|err| StoreError::db("run_migrations", &err))?
        .iter()
        .map(|row| row.get(0))
        .collect();
    let mut newly_applied = Vec::new();
    for (version, contents) in sql_entries(dir)? {
        if applied.contains(&version) {
            continue;
        }
        let mut tx = client.transaction().map_err(|err| StoreError::db("run_migrations", &err))?;
        tx.batch_execute(&contents).map_err(|err| StoreError::Database {
            call: "run_migrations",
            message: format!("{version}: {err}"),
            code: err.code().map(|state| state.code().to_string()),
        })?;
        tx.execute("INSERT INTO schema_migrations (version) VALUES ($1)", &[&version])
            .map_err(|err| StoreError::db("run_migrations", &err))?;
        tx.commit().map_err(|err| StoreError::db("run_migrations", &err))?;
        tracing::info!(version = %version, "applied migration");
        newly_applied.push(version);
    }
    Ok(newly_applied)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::fs;

    use super::sql_entries;

    #[test]
    fn entries_sort_lexicographically_and_skip_non_sql() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("0002_later.sql"), "SELECT 2;").expect("write");
        fs::write(dir.path().join("0001_init.sql"), "SELECT 1;").expect("write");
        fs::write(dir.path().join("README.md"), "notes").expect("write");
        let entries = sql_entries(dir.path()).expect("entries");
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["0001_init.sql", "0002_later.sql"]);
        assert_eq!(entries[0].1, "SELECT 1;");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent");
        assert!(sql_entries(&missing).is_err());
    }
}
