//! fstriage: read-only filesystem triage
//!
//! Walks a directory tree while steering clear of OS-critical paths, labels
//! each file's content type, hashes it, and records the results idempotently
//! in a SQLite inventory.

pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod identify;
pub mod paths;
pub mod pipeline;
pub mod store;
pub mod traversal;
pub mod types;

pub use config::{IdentifyConfig, TriageConfig};
pub use error::{Result, TriageError};
pub use extract::{extract, sha256_bytes, sha256_file, ExtractionPolicy};
pub use identify::{Capabilities, Identification, Identifier};
pub use pipeline::{run, RunOptions, RunOutput, RunReport};
pub use store::Store;
pub use traversal::{mounted_roots, traverse, ExclusionSet, Traversal};
pub use types::{DetectionMethod, DigestGroup, FileRecord, MimeCount, UNKNOWN_MIME};
