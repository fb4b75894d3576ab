//! Streaming SHA-256 content digests.
//!
//! The digest is the sole idempotency key for uploads: path + digest let
//! the agent re-observe the same file any number of times without sending
//! it twice.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{io_err, SyncError};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Hash the whole file at `path`, returning the lower-case hex digest.
///
/// Reads in chunks; the file is never buffered whole.
pub async fn digest_file(path: &Path) -> Result<String, SyncError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| io_err(path, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let read = file.read(&mut buf).await.map_err(|e| io_err(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
