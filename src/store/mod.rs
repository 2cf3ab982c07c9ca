//! SQLite-backed fact and aggregate storage
//!
//! One `Database` handle owns one connection behind a mutex. Every mutation
//! runs inside `with_transaction`, which opens an IMMEDIATE transaction so
//! the write lock is taken up front: two writers touching the same aggregate
//! row are serialized by SQLite, and a writer that cannot get the lock within
//! the busy timeout gets a retryable `Conflict` instead of a lost increment.

pub mod aggregate_store;
pub mod decimal;
pub mod facts;
pub mod schema;

pub use aggregate_store::{AggregateStore, SqliteAggregateStore};
pub use facts::FactStore;

use crate::error::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and apply connection pragmas.
    ///
    /// Does NOT run migrations; see [`schema::run_schema_migrations`].
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::configure(&conn, busy_timeout)?;

        log::info!(
            "📊 Opened SQLite database {} (journal_mode={})",
            db_path.display(),
            journal_mode
        );

        Ok(Self::from_connection(conn))
    }

    /// In-memory database with the embedded schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn, Duration::from_millis(0))?;
        schema::apply_embedded_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(())
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// A panic while the lock was held dropped any open transaction, which
    /// rolled it back, so a poisoned connection is still usable.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().unwrap_or_else(|poisoned| {
            log::warn!("⚠️  Recovering database connection after a panicked writer");
            self.conn.clear_poison();
            poisoned.into_inner()
        }))
    }

    /// Run `f` with exclusive access to the connection, outside any transaction.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`. On `Err` (or a panic) the transaction
    /// is dropped, which rolls it back, and the error is returned unchanged.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!("❌ Rollback failed after '{}': {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }

    /// `with_transaction` on the blocking thread pool, for async callers.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_transaction(f)).await?
    }

    /// Read-only access on the blocking thread pool, outside any transaction.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_connection(|conn| f(conn))).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OmsError;
    use tempfile::tempdir;

    fn customer_count(db: &Database) -> i64 {
        db.with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = Database::open_in_memory().unwrap();

        db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO customers (customer_id, company_name, country) VALUES ('ACME', 'Acme', 'US')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(customer_count(&db), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO customers (customer_id, company_name, country) VALUES ('ACME', 'Acme', 'US')",
                [],
            )?;
            Err(OmsError::BadRequest("abort".to_string()))
        });

        assert!(matches!(result, Err(OmsError::BadRequest(_))));
        assert_eq!(customer_count(&db), 0);
    }

    #[test]
    fn test_panicked_transaction_leaves_connection_usable() {
        let db = Database::open_in_memory().unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = db.with_transaction(|tx| {
                tx.execute(
                    "INSERT INTO customers (customer_id, company_name, country) VALUES ('ACME', 'Acme', 'US')",
                    [],
                )?;
                panic!("writer crashed mid-transaction");
            });
        }));
        assert!(panicked.is_err());

        assert_eq!(customer_count(&db), 0);
        db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO customers (customer_id, company_name, country) VALUES ('GLOBX', 'Globex', 'US')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(customer_count(&db), 1);
    }

    #[test]
    fn test_open_file_enables_wal_and_foreign_keys() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("oms.db");

        let db = Database::open(&db_path, Duration::from_millis(100)).unwrap();

        let (journal_mode, foreign_keys): (String, i64) = db
            .with_connection(|conn| {
                let journal_mode = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
                let foreign_keys = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
                Ok((journal_mode, foreign_keys))
            })
            .unwrap();

        assert_eq!(journal_mode.to_lowercase(), "wal");
        assert_eq!(foreign_keys, 1);
        assert!(db_path.exists());
    }
}
