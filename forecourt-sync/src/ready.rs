//! File readiness gate — bounded retry until a file stops being written.
//!
//! Automation hardware writes exports in place, so a create notification
//! often arrives while the file is still growing. The gate probes with an
//! exclusive open and backs off between attempts; exhaustion is silent
//! because the next modify event or backlog scan revisits the path.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

/// Probe attempts before giving up on a busy file.
const MAX_ATTEMPTS: u32 = 10;
/// Pause after each failed attempt.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Outcome of waiting for a file to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Exclusive open succeeded; the writer is done.
    Ready,
    /// The file disappeared while waiting.
    Vanished,
    /// Still locked after every attempt.
    Busy,
}

/// Wait until `path` can be opened with no other writer attached.
///
/// The probe handle is released before returning; callers re-open the file
/// for actual reading.
pub async fn await_readiness(path: &Path) -> Readiness {
    await_readiness_with(path, MAX_ATTEMPTS, RETRY_DELAY).await
}

async fn await_readiness_with(path: &Path, attempts: u32, delay: Duration) -> Readiness {
    for attempt in 1..=attempts {
        match try_exclusive_open(path) {
            Ok(_probe) => return Readiness::Ready,
            Err(err) if err.kind() == ErrorKind::NotFound => return Readiness::Vanished,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    error = %err,
                    "file not ready yet",
                );
            }
        }
        tokio::time::sleep(delay).await;
    }
    Readiness::Busy
}

#[cfg(unix)]
fn try_exclusive_open(path: &Path) -> std::io::Result<std::fs::File> {
    use fs2::FileExt;
    let file = std::fs::OpenOptions::new().read(true).open(path)?;
    file.try_lock_exclusive()?;
    Ok(file)
}

#[cfg(windows)]
fn try_exclusive_open(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::windows::fs::OpenOptionsExt;
    // share_mode(0): the open itself fails while any other handle is attached.
    std::fs::OpenOptions::new()
        .read(true)
        .share_mode(0)
        .open(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
