//! Database seam for the import engine.

use brookdb_sqlite::{InsertHelper, SharedConnection};
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::batch::RowBatch;
use crate::error::ImportResult;

/// The transactional surface the import engine drives.
///
/// One implementation per platform; all methods are invoked on the work
/// queue thread.
pub trait ImportDatabase: Send + Sync {
    /// Opens the outer import transaction.
    fn begin_transaction(&self) -> ImportResult<()>;

    /// Commits the outer transaction.
    fn commit_transaction(&self) -> ImportResult<()>;

    /// Rolls the outer transaction back. Best-effort; failures are logged.
    fn rollback_transaction(&self);

    /// Creates the cycling savepoint.
    fn create_savepoint(&self) -> ImportResult<()>;

    /// Releases the cycling savepoint.
    fn release_savepoint(&self) -> ImportResult<()>;

    /// Inserts a full batch, iterating tables in sorted order.
    fn insert_batch(&self, batch: &RowBatch) -> ImportResult<()>;
}

/// [`ImportDatabase`] over a leased SQLite write connection.
///
/// `begin_transaction` switches the connection into bulk-load shape (WAL,
/// relaxed sync, in-memory temp store, large cache, deferred
/// autocheckpoint) and `commit_transaction` restores the steady-state
/// pragmas after a truncating WAL checkpoint.
pub struct SqliteImportAdapter {
    connection: SharedConnection,
}

impl SqliteImportAdapter {
    /// Wraps the write connection the import will run on.
    pub fn new(connection: SharedConnection) -> Self {
        Self { connection }
    }

    fn exec_pragma(conn: &Connection, sql: &str) {
        // Some pragmas (journal_mode, wal_checkpoint) return a result row;
        // prepare + step + ignore handles both shapes. Failures are
        // intentionally swallowed: pragma tuning is opportunistic.
        match conn.prepare(sql) {
            Ok(mut stmt) => {
                if let Ok(mut rows) = stmt.query([]) {
                    let _ = rows.next();
                }
            }
            Err(e) => debug!(sql, error = %e, "pragma skipped"),
        }
    }

    fn restore_steady_state_pragmas(conn: &Connection) {
        Self::exec_pragma(conn, "PRAGMA synchronous=NORMAL");
        Self::exec_pragma(conn, "PRAGMA wal_autocheckpoint=1000");
    }
}

impl ImportDatabase for SqliteImportAdapter {
    fn begin_transaction(&self) -> ImportResult<()> {
        let conn = self.connection.lock();
        Self::exec_pragma(&conn, "PRAGMA journal_mode=WAL");
        Self::exec_pragma(&conn, "PRAGMA synchronous=NORMAL");
        Self::exec_pragma(&conn, "PRAGMA temp_store=MEMORY");
        Self::exec_pragma(&conn, "PRAGMA cache_size=-20000");
        Self::exec_pragma(&conn, "PRAGMA wal_autocheckpoint=10000");
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(brookdb_sqlite::SqliteError::from)?;
        info!("import transaction started");
        Ok(())
    }

    fn commit_transaction(&self) -> ImportResult<()> {
        let conn = self.connection.lock();
        // Final savepoint release is best-effort; COMMIT subsumes it.
        if let Err(e) = conn.execute_batch("RELEASE SAVEPOINT sp") {
            debug!(error = %e, "final savepoint release failed (non-fatal)");
        }
        InsertHelper::finalize_statements(&conn);

        if let Err(e) = conn.execute_batch("COMMIT") {
            error!(error = %e, "import commit failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK");
            Self::restore_steady_state_pragmas(&conn);
            return Err(brookdb_sqlite::SqliteError::from(e).into());
        }

        Self::exec_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)");
        Self::restore_steady_state_pragmas(&conn);
        Ok(())
    }

    fn rollback_transaction(&self) {
        let conn = self.connection.lock();
        error!("rolling back import transaction");
        InsertHelper::finalize_statements(&conn);
        let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT sp");
        let _ = conn.execute_batch("RELEASE SAVEPOINT sp");
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            error!(error = %e, "rollback failed");
        }
        Self::restore_steady_state_pragmas(&conn);
    }

    fn create_savepoint(&self) -> ImportResult<()> {
        let conn = self.connection.lock();
        conn.execute_batch("SAVEPOINT sp")
            .map_err(brookdb_sqlite::SqliteError::from)?;
        Ok(())
    }

    fn release_savepoint(&self) -> ImportResult<()> {
        let conn = self.connection.lock();
        conn.execute_batch("RELEASE SAVEPOINT sp")
            .map_err(brookdb_sqlite::SqliteError::from)?;
        Ok(())
    }

    fn insert_batch(&self, batch: &RowBatch) -> ImportResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let conn = self.connection.lock();
        for (table, rows) in batch.tables_sorted() {
            InsertHelper::insert_rows(&conn, table, &rows.columns, &rows.rows)?;
        }
        Ok(())
    }
}
