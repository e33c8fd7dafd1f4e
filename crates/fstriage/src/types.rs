//! Core types for fstriage
//!
//! A [`FileRecord`] is built once per discovered file, buffered for the
//! duration of a run, and then written to the inventory store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback label when no tier can say anything about a file.
pub const UNKNOWN_MIME: &str = "application/octet-stream";

// ============================================================================
// Detection
// ============================================================================

/// Which identification tier produced a content-type label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    /// Full content sniffing against a MIME database
    ContentSignature,
    /// Built-in magic-number table
    LightweightSignature,
    /// File extension lookup
    ExtensionGuess,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 3] = [
        DetectionMethod::ContentSignature,
        DetectionMethod::LightweightSignature,
        DetectionMethod::ExtensionGuess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentSignature => "content-signature",
            Self::LightweightSignature => "lightweight-signature",
            Self::ExtensionGuess => "extension-guess",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| format!("unknown detection method: {}", s))
    }
}

// ============================================================================
// File records
// ============================================================================

/// Metadata observed for one file during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path; unique key in the store
    pub path: String,
    /// Byte length at observation time
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: f64,
    /// Platform ctime as reported by the OS (inode change on Unix, creation on Windows)
    pub ctime: f64,
    /// Content-type label, never empty
    pub mime: String,
    /// Lowercase hex SHA-256 of the content, always 64 characters
    pub sha256: String,
    /// Tier that produced `mime`
    pub detector: DetectionMethod,
}

/// One row of the aggregate-by-MIME query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeCount {
    pub mime: String,
    pub count: u64,
}

/// A digest shared by more than one stored path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestGroup {
    pub sha256: String,
    pub count: u64,
}

/// Returns true if `digest` is a 64-character lowercase hex string.
pub fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
