//! Run orchestration
//!
//! traverse -> (identify, extract) per path -> buffer -> one upsert batch ->
//! one aggregate query. Strictly sequential; at most one file is open at a
//! time. The store is not opened until every record has been collected, so an
//! aborted run never touches it.

use crate::config::{IdentifyConfig, TriageConfig};
use crate::error::{Result, TriageError};
use crate::extract::{extract, ExtractionPolicy};
use crate::identify::{Capabilities, Identifier};
use crate::paths;
use crate::store::Store;
use crate::traversal::{traverse, ExclusionSet};
use crate::types::{FileRecord, MimeCount};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Inputs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root directory to scan
    pub target: PathBuf,
    /// Inventory store file
    pub db_path: PathBuf,
    /// Stop after this many records
    pub limit: Option<usize>,
    /// Pruned in addition to the platform defaults
    pub exclude: Vec<PathBuf>,
    pub policy: ExtractionPolicy,
    pub capabilities: Capabilities,
}

impl RunOptions {
    /// Options with default policy and all available identification tiers.
    pub fn new(target: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            db_path: db_path.into(),
            limit: None,
            exclude: Vec::new(),
            policy: ExtractionPolicy::default(),
            capabilities: Capabilities::detect(&IdentifyConfig::default()),
        }
    }

    /// Options seeded from a loaded configuration file.
    pub fn from_config(target: impl Into<PathBuf>, config: &TriageConfig) -> Self {
        Self {
            target: target.into(),
            db_path: config.database_path.clone(),
            limit: None,
            exclude: config.exclude.clone(),
            policy: ExtractionPolicy::from_skip_flag(config.skip_unreadable),
            capabilities: Capabilities::detect(&config.identify),
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Resolved absolute target
    pub target: PathBuf,
    pub db_path: PathBuf,
    /// Records written in this run
    pub files_processed: u64,
    /// Files dropped under [`ExtractionPolicy::Skip`]
    pub files_skipped: u64,
    /// Directory entries traversal could not read
    pub traversal_errors: u64,
    /// Whole-store counts after the run
    pub by_mime: Vec<MimeCount>,
    /// First record of the run, for spot checks
    pub sample: Option<FileRecord>,
    pub duration_ms: u64,
}

/// Report plus the records written, for downstream consumers.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: RunReport,
    pub records: Vec<FileRecord>,
}

/// Execute one full run.
pub fn run(options: &RunOptions) -> Result<RunOutput> {
    let started = Instant::now();

    let target =
        paths::absolutize(&options.target).map_err(|e| TriageError::io(&options.target, e))?;
    paths::validate_target(&target)?;
    let db_path =
        paths::absolutize(&options.db_path).map_err(|e| TriageError::io(&options.db_path, e))?;

    let excludes = ExclusionSet::platform_defaults().with_extra(&options.exclude);
    let identifier = Identifier::new(options.capabilities);

    info!(
        target = %target.display(),
        db = %db_path.display(),
        limit = ?options.limit,
        policy = ?options.policy,
        "Starting run"
    );

    let mut traversal = traverse(&target, &excludes)?;
    let collected = collect_records(
        traversal.by_ref(),
        &identifier,
        options.limit,
        options.policy,
    )?;
    let traversal_errors = traversal.errors() as u64;

    let store = Store::open(&db_path)?;
    let files_processed = store.upsert_batch(&collected.records)?;
    let by_mime = store.aggregate_by_mime()?;
    store.close()?;

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        files_processed,
        files_skipped = collected.skipped,
        traversal_errors,
        duration_ms,
        "Run complete"
    );

    Ok(RunOutput {
        report: RunReport {
            target,
            db_path,
            files_processed,
            files_skipped: collected.skipped,
            traversal_errors,
            by_mime,
            sample: collected.records.first().cloned(),
            duration_ms,
        },
        records: collected.records,
    })
}

struct Collected {
    records: Vec<FileRecord>,
    skipped: u64,
}

/// Identify and extract each path in order until `limit` records exist.
fn collect_records(
    paths: impl Iterator<Item = PathBuf>,
    identifier: &Identifier,
    limit: Option<usize>,
    policy: ExtractionPolicy,
) -> Result<Collected> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut collected = Collected {
        records: Vec::new(),
        skipped: 0,
    };
    if limit == 0 {
        return Ok(collected);
    }

    for path in paths {
        let identification = identifier.identify(&path);
        match extract(&path, &identification.mime, identification.method) {
            Ok(record) => collected.records.push(record),
            Err(err) => match policy {
                ExtractionPolicy::Abort => return Err(err),
                ExtractionPolicy::Skip => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable file");
                    collected.skipped += 1;
                    continue;
                }
            },
        }
        // Stop before pulling another path from the traversal
        if collected.records.len() >= limit {
            break;
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_sha256_hex, DetectionMethod};
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn four_file_tree(dir: &Path) {
        fs::write(dir.join("note.txt"), b"hello world\n").unwrap();
        fs::write(dir.join("data.csv"), b"a,b\n1,2\n").unwrap();
        fs::write(dir.join("doc.pdf"), b"%PDF-1.4\n%EOF\n").unwrap();
        fs::write(dir.join("image.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
    }

    #[test]
    fn test_end_to_end_four_files() {
        let temp = TempDir::new().unwrap();
        four_file_tree(temp.path());
        // Store lives inside the target; it must not be scanned in this run
        let db = temp.path().join("agent.db");

        let output = run(&RunOptions::new(temp.path(), &db)).unwrap();
        let report = &output.report;
        assert_eq!(report.files_processed, 4);
        assert_eq!(report.files_skipped, 0);
        assert_eq!(report.by_mime.iter().map(|m| m.count).sum::<u64>(), 4);
        assert!(report.sample.is_some());

        let store = Store::open(&db).unwrap();
        assert_eq!(store.count_rows().unwrap(), 4);
        let paths: HashSet<&str> = output.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths.len(), 4);
        for record in &output.records {
            let stored = store.get(&record.path).unwrap().unwrap();
            assert!(is_sha256_hex(&stored.sha256));
            assert!(!stored.mime.is_empty());
        }
        assert!(store
            .get(&db.to_string_lossy())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_limit_truncates() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir(&target).unwrap();
        four_file_tree(&target);
        let db = temp.path().join("inventory.sqlite3");

        let mut options = RunOptions::new(&target, &db);
        options.limit = Some(2);
        let output = run(&options).unwrap();
        assert_eq!(output.report.files_processed, 2);
        assert_eq!(output.records.len(), 2);

        let store = Store::open(&db).unwrap();
        assert_eq!(store.count_rows().unwrap(), 2);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir(&target).unwrap();
        four_file_tree(&target);
        let db = temp.path().join("inventory.sqlite3");
        let options = RunOptions::new(&target, &db);

        run(&options).unwrap();
        fs::write(target.join("note.txt"), b"changed\n").unwrap();
        let second = run(&options).unwrap();
        assert_eq!(second.report.files_processed, 4);

        let store = Store::open(&db).unwrap();
        assert_eq!(store.count_rows().unwrap(), 4);
        let note = store
            .get(&target.join("note.txt").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(note.size, 8);
    }

    #[test]
    fn test_excluded_subtree_not_recorded() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir_all(target.join("cache")).unwrap();
        four_file_tree(&target);
        fs::write(target.join("cache").join("blob.bin"), b"x").unwrap();
        let db = temp.path().join("inventory.sqlite3");

        let mut options = RunOptions::new(&target, &db);
        options.exclude = vec![target.join("cache")];
        let output = run(&options).unwrap();
        assert_eq!(output.report.files_processed, 4);
        assert!(output
            .records
            .iter()
            .all(|r| !Path::new(&r.path).starts_with(target.join("cache"))));
    }

    #[test]
    fn test_missing_target_leaves_no_store() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("inventory.sqlite3");
        let result = run(&RunOptions::new(temp.path().join("absent"), &db));
        assert!(matches!(result, Err(TriageError::InvalidTarget(_))));
        assert!(!db.exists());
    }

    #[test]
    fn test_vanished_file_aborts_or_skips() {
        let temp = TempDir::new().unwrap();
        four_file_tree(temp.path());
        let identifier = Identifier::new(Capabilities::signatures_only());
        let paths = vec![
            temp.path().join("note.txt"),
            temp.path().join("vanished.txt"),
            temp.path().join("doc.pdf"),
        ];

        let aborted = collect_records(
            paths.clone().into_iter(),
            &identifier,
            None,
            ExtractionPolicy::Abort,
        );
        assert!(matches!(aborted, Err(TriageError::Extract { .. })));

        let skipped =
            collect_records(paths.into_iter(), &identifier, None, ExtractionPolicy::Skip).unwrap();
        assert_eq!(skipped.records.len(), 2);
        assert_eq!(skipped.skipped, 1);
        assert_eq!(
            skipped.records[1].detector,
            DetectionMethod::LightweightSignature
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_fault_leaves_store_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir(&target).unwrap();
        four_file_tree(&target);
        let db = temp.path().join("inventory.sqlite3");
        let options = RunOptions::new(&target, &db);
        let first = run(&options).unwrap();

        let locked = target.join("note.txt");
        fs::write(&locked, b"changed\n").unwrap();
        fs::write(target.join("extra.txt"), b"new\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&locked).is_ok() {
            // Running with privileges that bypass file modes
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
            return;
        }

        let result = run(&options);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(result, Err(TriageError::Extract { .. })));

        let store = Store::open_readonly(&db).unwrap();
        assert_eq!(store.count_rows().unwrap(), 4);
        for record in &first.records {
            assert_eq!(store.get(&record.path).unwrap().as_ref(), Some(record));
        }
        assert!(store
            .get(&target.join("extra.txt").to_string_lossy())
            .unwrap()
            .is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_never_share_a_row() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("plain.txt"), b"ok\n").unwrap();
        for name in [&b"a\xff"[..], &b"a\xfe"[..]] {
            if fs::write(target.join(OsStr::from_bytes(name)), b"x").is_err() {
                // Filesystem refuses non-UTF-8 names
                return;
            }
        }
        let db = temp.path().join("inventory.sqlite3");

        let mut options = RunOptions::new(&target, &db);
        let aborted = run(&options);
        assert!(matches!(aborted, Err(TriageError::Extract { .. })));
        assert!(!db.exists());

        options.policy = ExtractionPolicy::Skip;
        let output = run(&options).unwrap();
        assert_eq!(output.report.files_processed, 1);
        assert_eq!(output.report.files_skipped, 2);
        let store = Store::open_readonly(&db).unwrap();
        assert_eq!(store.count_rows().unwrap(), output.report.files_processed);
    }

    #[test]
    fn test_limit_stops_pulling_paths() {
        let temp = TempDir::new().unwrap();
        four_file_tree(temp.path());
        let identifier = Identifier::new(Capabilities::extension_only());
        let mut pulled = 0usize;
        let paths = ["note.txt", "data.csv", "doc.pdf", "image.jpg"]
            .iter()
            .map(|name| temp.path().join(name))
            .inspect(|_| pulled += 1);

        let collected =
            collect_records(paths, &identifier, Some(2), ExtractionPolicy::Abort).unwrap();
        assert_eq!(collected.records.len(), 2);
        assert_eq!(pulled, 2);

        let none = collect_records(
            std::iter::once(temp.path().join("note.txt")),
            &identifier,
            Some(0),
            ExtractionPolicy::Abort,
        )
        .unwrap();
        assert!(none.records.is_empty());
    }
}
