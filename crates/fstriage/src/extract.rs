//! Metadata extraction
//!
//! One `stat` per file plus a streamed SHA-256 of its content. The content-type
//! label is supplied by the caller and recorded as-is.

use crate::error::{Result, TriageError};
use crate::types::{DetectionMethod, FileRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, Metadata};
use std::io::{self, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Block size for streamed hashing.
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// What the pipeline does when a single file cannot be extracted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionPolicy {
    /// Propagate the fault and abort the run
    #[default]
    Abort,
    /// Log, count the file as skipped, continue
    Skip,
}

impl ExtractionPolicy {
    pub fn from_skip_flag(skip_unreadable: bool) -> Self {
        if skip_unreadable {
            Self::Skip
        } else {
            Self::Abort
        }
    }
}

/// Build a [`FileRecord`] for `path`.
///
/// Fails with [`TriageError::Extract`] if the path is not valid UTF-8, or if
/// the file cannot be stat'ed, opened, or read to the end. The path is the
/// store key and is never converted lossily.
pub fn extract(path: &Path, mime: &str, detector: DetectionMethod) -> Result<FileRecord> {
    let key = path.to_str().ok_or_else(|| {
        TriageError::extract(
            path,
            io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
        )
    })?;
    let metadata = std::fs::metadata(path).map_err(|e| TriageError::extract(path, e))?;
    let sha256 = sha256_file(path).map_err(|e| TriageError::extract(path, e))?;

    Ok(FileRecord {
        path: key.to_string(),
        size: metadata.len(),
        mtime: modified_secs(&metadata),
        ctime: ctime_secs(&metadata),
        mime: mime.to_string(),
        sha256,
        detector,
    })
}

/// Stream a file through SHA-256 in [`HASH_BLOCK_SIZE`] blocks.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer, lowercase hex.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn modified_secs(metadata: &Metadata) -> f64 {
    metadata.modified().map(system_time_secs).unwrap_or(0.0)
}

/// Inode change time (st_ctime).
#[cfg(unix)]
fn ctime_secs(metadata: &Metadata) -> f64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ctime() as f64 + metadata.ctime_nsec() as f64 / 1_000_000_000.0
}

/// Creation time.
#[cfg(windows)]
fn ctime_secs(metadata: &Metadata) -> f64 {
    metadata
        .created()
        .map(system_time_secs)
        .unwrap_or_else(|_| modified_secs(metadata))
}

#[cfg(not(any(unix, windows)))]
fn ctime_secs(metadata: &Metadata) -> f64 {
    modified_secs(metadata)
}

/// Seconds since the Unix epoch, negative before it.
fn system_time_secs(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}
