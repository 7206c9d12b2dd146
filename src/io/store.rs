//! Prediction log store - SQLite table of past predictions
//!
//! Each operation opens its own connection and closes it before returning,
//! on success and on failure. No connection is pooled or shared between
//! requests; concurrent writers rely on SQLite's own locking.

use crate::domain::types::{PredictionLogEntry, PredictionLogRow};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS prediction_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pclass INTEGER,
        age REAL,
        fare REAL,
        prediction INTEGER,
        probability REAL,
        timestamp TEXT
    )
";

const INSERT_SQL: &str = "
    INSERT INTO prediction_logs (pclass, age, fare, prediction, probability, timestamp)
    VALUES (?, ?, ?, ?, ?, ?)
";

const RECENT_SQL: &str = "
    SELECT id, pclass, age, fare, prediction, probability, timestamp
    FROM prediction_logs
    ORDER BY id DESC
    LIMIT ?
";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM prediction_logs";

/// How long a connection waits on SQLite's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Handle to the prediction log database.
///
/// Holds only the file path; cloning is cheap.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the log table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(CREATE_TABLE_SQL).execute(&mut conn).await;
        self.release(conn).await;
        result?;

        info!(path = %self.path.display(), "prediction_log_table_ready");
        Ok(())
    }

    /// Append one entry; returns the store-assigned row id
    pub async fn insert(&self, entry: &PredictionLogEntry) -> Result<i64, StoreError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(INSERT_SQL)
            .bind(entry.class)
            .bind(entry.age)
            .bind(entry.fare)
            .bind(entry.prediction)
            .bind(entry.probability)
            .bind(entry.timestamp.as_str())
            .execute(&mut conn)
            .await;
        self.release(conn).await;

        let id = result?.last_insert_rowid();
        debug!(id = %id, "prediction_log_inserted");
        Ok(id)
    }

    /// Up to `limit` rows, newest first
    pub async fn recent(&self, limit: u32) -> Result<Vec<PredictionLogRow>, StoreError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query_as::<_, (i64, i64, f64, f64, i64, f64, String)>(RECENT_SQL)
            .bind(i64::from(limit))
            .fetch_all(&mut conn)
            .await;
        self.release(conn).await;

        Ok(result?.into_iter().map(PredictionLogRow::from).collect())
    }

    /// Number of logged predictions
    pub async fn count(&self) -> Result<i64, StoreError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query_scalar::<_, i64>(COUNT_SQL).fetch_one(&mut conn).await;
        self.release(conn).await;

        Ok(result?)
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        // Create parent directories if they don't exist
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .connect()
            .await?;
        Ok(conn)
    }

    /// Close a connection. A failed close is logged and otherwise ignored so
    /// it never hides the result of the statement that ran on it.
    async fn release(&self, conn: SqliteConnection) {
        if let Err(e) = conn.close().await {
            warn!(path = %self.path.display(), error = %e, "store_connection_close_failed");
        }
    }
}
