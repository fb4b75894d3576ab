//! Persisted transfer log — SQLite via sqlx.
//!
//! One row per distinct file path. Re-observing a path upserts the
//! existing row; the log never grows a second row for the same path and
//! the agent never deletes rows (pruning is an operator concern).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use forecourt_core::types::{TransferRecord, TransferStatus};

use crate::error::SyncError;

/// Per-status row counts, surfaced in the daemon status payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// Handle to the transfer log database.
///
/// Cheap to clone; all clones share one connection pool. Concurrent
/// upserts for the same path are serialized by SQLite at the row level,
/// which is exactly the guarantee the pipeline needs.
#[derive(Clone)]
pub struct TransferLog {
    pool: SqlitePool,
}

impl TransferLog {
    /// Open or create the transfer log at `path`.
    ///
    /// Creates the parent directory and the schema if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::io_err(parent, e))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let log = Self { pool };
        log.ensure_schema().await?;

        tracing::info!(path = %path.display(), "transfer log opened");
        Ok(log)
    }

    /// Close the underlying pool. Pending queries finish first.
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<(), SyncError> {
        // WAL lets the CLI read the log while the agent holds the writer.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS transfers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                file_path TEXT NOT NULL UNIQUE,
                content_hash TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                last_attempt INTEGER NOT NULL,
                error_message TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transfers_last_attempt ON transfers(last_attempt)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transfers_status ON transfers(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert or update the row for `record.file_path`.
    pub async fn upsert(&self, record: &TransferRecord) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO transfers (file_name, file_path, content_hash, status, last_attempt, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                file_name = excluded.file_name,
                content_hash = excluded.content_hash,
                status = excluded.status,
                last_attempt = excluded.last_attempt,
                error_message = excluded.error_message
            "#,
        )
        .bind(&record.file_name)
        .bind(record.file_path.to_string_lossy().as_ref())
        .bind(&record.content_hash)
        .bind(record.status.as_str())
        .bind(record.last_attempt.timestamp_millis())
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Fetch the row for one path, if any.
    pub async fn find(&self, path: &Path) -> Result<Option<TransferRecord>, SyncError> {
        let row = sqlx::query(
            "SELECT file_name, file_path, content_hash, status, last_attempt, error_message
             FROM transfers WHERE file_path = ?",
        )
        .bind(path.to_string_lossy().as_ref())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// The `limit` most recently touched rows, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<TransferRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT file_name, file_path, content_hash, status, last_attempt, error_message
             FROM transfers ORDER BY last_attempt DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// The most recent successfully delivered row, if any.
    pub async fn last_sent(&self) -> Result<Option<TransferRecord>, SyncError> {
        let row = sqlx::query(
            "SELECT file_name, file_path, content_hash, status, last_attempt, error_message
             FROM transfers WHERE status = ? ORDER BY last_attempt DESC, id DESC LIMIT 1",
        )
        .bind(TransferStatus::Sent.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Row counts per status, for status displays.
    pub async fn status_counts(&self) -> Result<StatusCounts, SyncError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM transfers GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            match TransferStatus::parse(&status) {
                Some(TransferStatus::Pending) => counts.pending = n as u64,
                Some(TransferStatus::Sent) => counts.sent = n as u64,
                Some(TransferStatus::Failed) => counts.failed = n as u64,
                Some(TransferStatus::Rejected) => counts.rejected = n as u64,
                None => {
                    return Err(SyncError::InvalidState(format!(
                        "unknown transfer status: {status}"
                    )))
                }
            }
        }
        Ok(counts)
    }
}

fn row_to_record(row: &SqliteRow) -> Result<TransferRecord, SyncError> {
    let status_str: String = row.get("status");
    let status = TransferStatus::parse(&status_str).ok_or_else(|| {
        SyncError::InvalidState(format!("unknown transfer status: {status_str}"))
    })?;

    let path: String = row.get("file_path");
    let last_attempt: i64 = row.get("last_attempt");

    Ok(TransferRecord {
        file_name: row.get("file_name"),
        file_path: path.into(),
        content_hash: row.get("content_hash"),
        status,
        last_attempt: millis_to_datetime(last_attempt),
        error_message: row.get("error_message"),
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
