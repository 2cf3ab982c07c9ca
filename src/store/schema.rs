//! Schema migration loader
//!
//! Reads all .sql files from a directory and executes them in file-name order
//! (`00_`, `01_`, ...). All SQL files must use "IF NOT EXISTS" clauses so the
//! loader can run on every start.

use crate::error::{OmsError, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// The migrations shipped in `sql/`, compiled in for tests and for
/// deployments without a schema directory.
pub const EMBEDDED_MIGRATIONS: &[(&str, &str)] = &[
    ("00_facts.sql", include_str!("../../sql/00_facts.sql")),
    ("01_statistics.sql", include_str!("../../sql/01_statistics.sql")),
];

/// Run schema migrations from SQL files
///
/// Returns: Ok(()) if all migrations succeed, Err(...) on first failure
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<()> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(OmsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Schema directory not found: {}", schema_dir),
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;

        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

/// Apply the compiled-in migrations
pub fn apply_embedded_schema(conn: &Connection) -> Result<()> {
    for (name, sql) in EMBEDDED_MIGRATIONS {
        log::debug!("Applying embedded migration {}", name);
        conn.execute_batch(sql)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_embedded_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        apply_embedded_schema(&conn).unwrap();
        apply_embedded_schema(&conn).unwrap();

        // 6 fact tables + 7 statistics tables + summaries
        assert_eq!(table_count(&conn), 14);
    }

    #[test]
    fn test_directory_migrations_run_in_name_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("01_second.sql"),
            "CREATE TABLE IF NOT EXISTS second (id INTEGER REFERENCES first(id));\
             INSERT INTO first (id) SELECT 2 WHERE NOT EXISTS (SELECT 1 FROM first WHERE id = 2);",
        )
        .unwrap();
        fs::write(
            dir.path().join("00_first.sql"),
            "CREATE TABLE IF NOT EXISTS first (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not sql").unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        let schema_dir = dir.path().to_str().unwrap();

        run_schema_migrations(&mut conn, schema_dir).unwrap();
        run_schema_migrations(&mut conn, schema_dir).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM first", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = run_schema_migrations(&mut conn, "/definitely/not/here");
        assert!(matches!(result, Err(OmsError::Io(_))));
    }
}
