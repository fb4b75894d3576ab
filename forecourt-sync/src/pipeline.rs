//! Transfer pipeline entrypoint used by the daemon's workers.
//!
//! ## `process_path` — stage order
//!
//! 1. Classify by extension; unrelated files are ignored without a row.
//! 2. Wait until the producer has released the file (readiness gate).
//! 3. Reject empty files.
//! 4. For archives, cross-check the station code embedded in the export.
//! 5. SHA-256 the content; skip if an identical copy was already delivered.
//! 6. Upload and record the result, success or failure.
//!
//! Every terminal stage except 1 and 2 leaves a row in the transfer log,
//! so the log reflects each decision the agent took about real exports.

use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;

use forecourt_core::types::{AgentConfig, TransferRecord, TransferStatus};

use crate::api::ApiClient;
use crate::classify::{classify, ExportKind};
use crate::digest::digest_file;
use crate::error::SyncError;
use crate::ready::{await_readiness, Readiness};
use crate::store::TransferLog;
use crate::validate::{station_check, StationCheck};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal state of one pipeline run for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Extension outside the export allow-list; never recorded.
    SkippedExtension,
    /// Producer still held the file after the full grace period. Not
    /// recorded; the next filesystem event retries it.
    SkippedBusy,
    /// File disappeared before it could be read.
    Vanished,
    /// Identical content was already delivered; nothing sent.
    AlreadySent,
    /// Content failed validation and was recorded as rejected.
    Rejected { reason: String },
    /// Uploaded and acknowledged by the server.
    Uploaded,
    /// Upload attempted and refused or unreachable; recorded for retry.
    UploadFailed { message: String },
}

// ---------------------------------------------------------------------------
// process_path
// ---------------------------------------------------------------------------

/// Run one observed path through the full transfer pipeline.
///
/// Returns `Err` only for faults that prevent a verdict, such as a broken
/// transfer log or unreadable content. The caller logs those and moves on;
/// a bad file must never take the agent down.
pub async fn process_path(
    path: &Path,
    config: &AgentConfig,
    log: &TransferLog,
    client: &ApiClient,
) -> Result<ProcessOutcome, SyncError> {
    let kind = match classify(path, &config.exports) {
        Some(kind) => kind,
        None => {
            tracing::debug!("ignoring: {}", path.display());
            return Ok(ProcessOutcome::SkippedExtension);
        }
    };

    match await_readiness(path).await {
        Readiness::Ready => {}
        Readiness::Vanished => {
            tracing::debug!("vanished: {}", path.display());
            return Ok(ProcessOutcome::Vanished);
        }
        Readiness::Busy => {
            tracing::warn!("still busy, giving up for now: {}", path.display());
            return Ok(ProcessOutcome::SkippedBusy);
        }
    }

    // classify() required an extension, so a file name is always present.
    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Ok(ProcessOutcome::SkippedExtension),
    };

    let len = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("vanished: {}", path.display());
            return Ok(ProcessOutcome::Vanished);
        }
        Err(e) => return Err(crate::error::io_err(path, e)),
    };
    if len == 0 {
        let reason = "empty content".to_string();
        tracing::warn!("rejected: {} ({reason})", path.display());
        let digest = digest_file(path).await?;
        record_verdict(log, path, &file_name, &digest, TransferStatus::Rejected, Some(&reason))
            .await?;
        return Ok(ProcessOutcome::Rejected { reason });
    }

    if kind == ExportKind::Archive {
        if let Some(expected) = config.station.expected_code.clone() {
            let check_path = path.to_path_buf();
            let data_ext = config.exports.data_ext.clone();
            let check = tokio::task::spawn_blocking(move || {
                station_check(&check_path, &data_ext, &expected)
            })
            .await
            .map_err(|e| SyncError::Join(e.to_string()))?;

            match check {
                StationCheck::Matched => {}
                StationCheck::Inconclusive { reason } => {
                    tracing::warn!(
                        "station check inconclusive, uploading anyway: {} ({reason})",
                        path.display()
                    );
                }
                StationCheck::Mismatched { found } => {
                    let expected = config.station.expected_code.as_deref().unwrap_or_default();
                    let reason = format!(
                        "station code mismatch: archive reports {found}, agent expects {expected}"
                    );
                    tracing::warn!("rejected: {} ({reason})", path.display());
                    let digest = digest_file(path).await?;
                    record_verdict(
                        log,
                        path,
                        &file_name,
                        &digest,
                        TransferStatus::Rejected,
                        Some(&reason),
                    )
                    .await?;
                    return Ok(ProcessOutcome::Rejected { reason });
                }
            }
        }
    }

    let digest = match digest_file(path).await {
        Ok(digest) => digest,
        Err(SyncError::Io { ref source, .. }) if source.kind() == ErrorKind::NotFound => {
            tracing::debug!("vanished before hashing: {}", path.display());
            return Ok(ProcessOutcome::Vanished);
        }
        Err(e) => return Err(e),
    };

    if let Some(previous) = log.find(path).await? {
        if previous.status == TransferStatus::Sent && previous.content_hash == digest {
            tracing::debug!("already sent, identical content: {}", path.display());
            return Ok(ProcessOutcome::AlreadySent);
        }
    }

    record_verdict(log, path, &file_name, &digest, TransferStatus::Pending, None).await?;

    match client.upload(path, &file_name, &digest).await {
        Ok(()) => {
            tracing::info!("uploaded: {}", path.display());
            record_verdict(log, path, &file_name, &digest, TransferStatus::Sent, None).await?;
            Ok(ProcessOutcome::Uploaded)
        }
        Err(e) => {
            let message = e.upload_message();
            tracing::warn!("upload failed: {} ({message})", path.display());
            record_verdict(
                log,
                path,
                &file_name,
                &digest,
                TransferStatus::Failed,
                Some(&message),
            )
            .await?;
            Ok(ProcessOutcome::UploadFailed { message })
        }
    }
}

async fn record_verdict(
    log: &TransferLog,
    path: &Path,
    file_name: &str,
    digest: &str,
    status: TransferStatus,
    error: Option<&str>,
) -> Result<(), SyncError> {
    log.upsert(&TransferRecord {
        file_name: file_name.to_string(),
        file_path: path.to_path_buf(),
        content_hash: digest.to_string(),
        status,
        last_attempt: Utc::now(),
        error_message: error.map(str::to_string),
    })
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
