//! SQLite-backed entity store for the sales graph.
//!
//! The database lives at `~/.dealdesk/dealdesk.db` unless configured
//! otherwise. Every multi-step write (cascades, pipeline reassignment,
//! quotation recompute) runs inside `with_transaction`, so concurrent
//! handlers sharing the file never observe an intermediate state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::entity::EntityKind;

pub mod types;
pub use types::*;

mod contacts;
mod deals;
mod interactions;
mod organizations;
mod payments;
mod pipelines;
mod projects;
mod quotations;
mod tasks;
mod users;

pub use pipelines::{PipelineDeletion, StageDeletion};
pub use quotations::{quotation_number_prefix, QuotationTotals};

/// How long a writer waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CrmDb {
    conn: Connection,
}

impl CrmDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// Nested calls join the outer transaction, so a composite operation can
    /// reuse single-step methods without committing halfway.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }

        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DbError::from)?;
        match f(self) {
            Ok(val) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(DbError::from(e).into());
                }
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at `~/.dealdesk/dealdesk.db`.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path and bring its schema up to date.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets readers proceed while a writer holds the lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Open a private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Default database path: `~/.dealdesk/dealdesk.db`.
    pub fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".dealdesk").join("dealdesk.db"))
    }

    /// File backing this connection, `None` for in-memory databases.
    pub fn file_path(&self) -> Option<&Path> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(Path::new)
    }

    /// Whether a record of `kind` with this key exists.
    pub fn exists(&self, kind: EntityKind, id: &str) -> Result<bool, DbError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
            kind.table(),
            kind.key_column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.exists(params![id])?)
    }

    /// Number of records of `kind`.
    pub fn count(&self, kind: EntityKind) -> Result<usize, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Read every collection in one transaction.
    pub fn load_snapshot(&self) -> Result<CrmSnapshot, DbError> {
        self.with_transaction(|db| {
            Ok(CrmSnapshot {
                users: db.list_users()?,
                organizations: db.list_organizations()?,
                contacts: db.list_contacts()?,
                pipelines: db.list_pipelines()?,
                pipeline_stages: db.list_pipeline_stages()?,
                deals: db.list_deals()?,
                payments: db.list_payments()?,
                projects: db.list_projects()?,
                tasks: db.list_tasks()?,
                quotations: db.list_quotations()?,
                quotation_items: db.list_quotation_items()?,
                interactions: db.list_interactions()?,
            })
        })
    }

    /// Collect the rows of a prepared query through a row mapper.
    fn collect_rows<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>, DbError>
    where
        P: rusqlite::Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// First row of a prepared query, if any.
    fn first_row<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>, DbError>
    where
        P: rusqlite::Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query_map(params, map)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;

    /// Fresh file-backed database in a leaked temp directory.
    pub fn test_db() -> CrmDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        CrmDb::open_at(path).expect("Failed to open test database")
    }
}
