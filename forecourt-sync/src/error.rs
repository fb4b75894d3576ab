//! Error types for forecourt-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from transfer pipeline operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transfer log (SQLite) failure.
    #[error("transfer log error: {0}")]
    Db(#[from] sqlx::Error),

    /// A transfer log row held a value the domain types cannot represent.
    #[error("invalid transfer log state: {0}")]
    InvalidState(String),

    /// Transport-level HTTP failure (connect, timeout, body stream).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// A spawned blocking task failed to join.
    #[error("blocking task join error: {0}")]
    Join(String),
}

impl SyncError {
    /// Text persisted as `error_message` when an upload fails: the raw
    /// response body when the server sent one, otherwise the error display.
    pub fn upload_message(&self) -> String {
        match self {
            SyncError::Api { body, .. } if !body.trim().is_empty() => body.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
