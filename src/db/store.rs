//! SQLite history store implementation.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Result as SqlResult, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

/// How long a writer waits for another connection's write to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database error types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Append-only probe history.
///
/// Every operation opens its own connection, so concurrent appends from
/// independent targets never share a lock in this process. SQLite's WAL
/// journal serializes the actual writes, one transaction per record.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), StorageError> {
        let conn = self.connect()?;

        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        tracing::debug!("SQLite journal mode: {}", mode);

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| StorageError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run a blocking store operation on tokio's blocking pool.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Store) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    /// Durably append one record and return its sequence id.
    ///
    /// The id is also written back into `record`.
    pub fn append(&self, record: &mut HistoryRecord) -> Result<i64, StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO checks (name, url, status, http_code, latency_ms, ts) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.name,
                record.url,
                record.status.as_str(),
                record.http_code,
                record.latency_ms,
                record.observed_at.timestamp(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        record.id = id;
        Ok(id)
    }

    /// Most recently appended records, newest first.
    pub fn recent_records(&self, limit: usize) -> Result<Vec<HistoryRecord>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, url, status, http_code, latency_ms, ts FROM checks ORDER BY id DESC LIMIT ?1",
        )?;

        let records = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Most recent records for one URL, newest first.
    pub fn recent_records_for(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, url, status, http_code, latency_ms, ts FROM checks
             WHERE url = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![url, limit as i64], record_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<i64, StorageError> {
        let conn = self.connect()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM checks", [], |r| r.get(0))?)
    }
}

fn record_from_row(row: &Row<'_>) -> SqlResult<HistoryRecord> {
    let status: String = row.get(3)?;
    let status = status
        .parse::<Status>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    let ts: i64 = row.get(6)?;

    Ok(HistoryRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        status,
        http_code: row.get(4)?,
        latency_ms: row.get(5)?,
        observed_at: DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default(),
    })
}
