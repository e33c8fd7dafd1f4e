use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn fstriage_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fstriage"))
}

/// Run the CLI with its home pinned inside `home` and logs quiet.
fn run_cli(home: &Path, args: &[&str]) -> Output {
    Command::new(fstriage_bin())
        .args(args)
        .env("FSTRIAGE_HOME", home)
        .env_remove("FSTRIAGE_CONFIG")
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to execute fstriage CLI")
}

fn assert_success(output: &Output, args: &[&str]) {
    assert!(
        output.status.success(),
        "command failed: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn run_cli_json<T: for<'de> Deserialize<'de>>(home: &Path, args: &[&str]) -> T {
    let output = run_cli(home, args);
    assert_success(&output, args);
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}",
            err,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn four_file_tree(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("note.txt"), b"hello world\n").unwrap();
    fs::write(dir.join("data.csv"), b"a,b\n1,2\n").unwrap();
    fs::write(dir.join("doc.pdf"), b"%PDF-1.4\n%EOF\n").unwrap();
    fs::write(dir.join("image.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
}

struct StoredRow {
    path: String,
    sha256: String,
    mime: String,
}

fn stored_rows(db: &Path) -> Vec<StoredRow> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare("SELECT path, sha256, mime FROM files")
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredRow {
                path: row.get(0)?,
                sha256: row.get(1)?,
                mime: row.get(2)?,
            })
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[derive(Debug, Deserialize)]
struct MimeCount {
    mime: String,
    count: u64,
}

#[derive(Debug, Deserialize)]
struct RunReport {
    target: PathBuf,
    db_path: PathBuf,
    files_processed: u64,
    files_skipped: u64,
    by_mime: Vec<MimeCount>,
    sample: Option<serde_json::Value>,
}

#[test]
fn scan_four_files_end_to_end() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let db = target.join("agent.db");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();

    let args = ["scan", "--target", &target_arg, "--db", &db_arg, "--no-model"];
    let output = run_cli(temp.path(), &args);
    assert_success(&output, &args);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== Run Summary ==="), "{}", stdout);
    assert!(stdout.contains(&format!("Target: {}", target.display())));
    assert!(stdout.contains(&format!("DB: {}", db.display())));
    assert!(stdout.contains("Files processed: 4"), "{}", stdout);
    assert!(stdout.contains("Counts by MIME:"));
    assert!(stdout.contains("Sample record:"));
    assert!(stdout.contains("Elapsed:"));

    let rows = stored_rows(&db);
    assert_eq!(rows.len(), 4);
    let paths: HashSet<&str> = rows.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths.len(), 4);
    for row in &rows {
        assert!(is_sha256_hex(&row.sha256), "bad digest for {}", row.path);
        assert!(!row.mime.is_empty());
        assert!(Path::new(&row.path).is_absolute());
    }
    let note = rows
        .iter()
        .find(|r| r.path.ends_with("note.txt"))
        .unwrap();
    assert_eq!(
        note.sha256,
        "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
    );
}

#[test]
fn scan_store_is_wal_with_indexes() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let db = temp.path().join("inv").join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();

    let args = ["scan", "--target", &target_arg, "--db", &db_arg, "--no-model"];
    assert_success(&run_cli(temp.path(), &args), &args);

    let conn = Connection::open(&db).unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'files'")
        .unwrap();
    let indexes: HashSet<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(indexes.contains("idx_files_mime"));
    assert!(indexes.contains("idx_files_sha256"));
}

#[test]
fn scan_json_report_with_limit() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let db = temp.path().join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();

    let report: RunReport = run_cli_json(
        temp.path(),
        &[
            "scan", "--target", &target_arg, "--db", &db_arg, "--limit", "2", "--json",
            "--no-model",
        ],
    );
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.target, target);
    assert_eq!(report.db_path, db);
    assert_eq!(report.by_mime.iter().map(|m| m.count).sum::<u64>(), 2);
    assert!(report.by_mime.iter().all(|m| !m.mime.is_empty()));
    assert!(report.sample.is_some());

    assert_eq!(stored_rows(&db).len(), 2);
}

#[test]
fn scan_rejects_zero_limit() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let target_arg = target.to_string_lossy().to_string();

    let output = run_cli(temp.path(), &["scan", "--target", &target_arg, "--limit", "0"]);
    assert!(!output.status.success());
}

#[test]
fn rescan_overwrites_in_place() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let db = temp.path().join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();
    let args = ["scan", "--target", &target_arg, "--db", &db_arg, "--no-model"];

    assert_success(&run_cli(temp.path(), &args), &args);
    let before = stored_rows(&db);
    fs::write(target.join("note.txt"), b"edited\n").unwrap();
    assert_success(&run_cli(temp.path(), &args), &args);
    let after = stored_rows(&db);

    assert_eq!(after.len(), 4);
    let digest = |rows: &[StoredRow]| {
        rows.iter()
            .find(|r| r.path.ends_with("note.txt"))
            .map(|r| r.sha256.clone())
            .unwrap()
    };
    assert_ne!(digest(&before), digest(&after));
}

#[test]
fn scan_exclude_prunes_subtree() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    four_file_tree(&target.join("cache"));
    // Shares a prefix with the excluded directory but is a sibling
    four_file_tree(&target.join("cache2"));
    let db = temp.path().join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();
    let exclude_arg = target.join("cache").to_string_lossy().to_string();

    let report: RunReport = run_cli_json(
        temp.path(),
        &[
            "scan", "--target", &target_arg, "--db", &db_arg, "--exclude", &exclude_arg,
            "--json", "--no-model",
        ],
    );
    assert_eq!(report.files_processed, 8);

    let cache = target.join("cache");
    for row in stored_rows(&db) {
        assert!(!Path::new(&row.path).starts_with(&cache), "{}", row.path);
    }
}

#[test]
fn scan_missing_target_fails_without_store() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let missing = temp.path().join("absent").to_string_lossy().to_string();

    let output = run_cli(temp.path(), &["scan", "--target", &missing, "--db", &db_arg]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Path not found"), "{}", stderr);
    assert!(!db.exists());
}

#[test]
fn scan_uses_home_default_store() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let home = temp.path().join("home");
    let target_arg = target.to_string_lossy().to_string();

    let args = ["scan", "--target", &target_arg, "--no-model"];
    assert_success(&run_cli(&home, &args), &args);
    assert_eq!(stored_rows(&home.join("inventory.sqlite3")).len(), 4);
}

#[cfg(feature = "classifier")]
#[test]
fn scan_trains_demo_model_next_to_store() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let db = temp.path().join("inv").join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();

    let args = ["scan", "--target", &target_arg, "--db", &db_arg];
    let output = run_cli(temp.path(), &args);
    assert_success(&output, &args);

    let model_path = temp.path().join("inv").join("demo_model.json");
    assert!(model_path.is_file());
    let model: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&model_path).unwrap()).unwrap();
    assert_eq!(model["samples"], 4);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Demo model saved to"));
}

#[test]
fn scan_no_model_skips_training() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    let db = temp.path().join("inv").join("inventory.sqlite3");
    let db_arg = db.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();

    let args = ["scan", "--target", &target_arg, "--db", &db_arg, "--no-model"];
    assert_success(&run_cli(temp.path(), &args), &args);
    assert!(!temp.path().join("inv").join("demo_model.json").exists());
}

#[test]
fn config_file_excludes_apply() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    four_file_tree(&target);
    four_file_tree(&target.join("skipme"));
    let db = temp.path().join("inventory.sqlite3");
    let config_path = temp.path().join("fstriage.toml");
    fs::write(
        &config_path,
        format!(
            "database_path = {:?}\nexclude = [{:?}]\ntrain_demo_model = false\n",
            db.to_string_lossy(),
            target.join("skipme").to_string_lossy()
        ),
    )
    .unwrap();
    let config_arg = config_path.to_string_lossy().to_string();
    let target_arg = target.to_string_lossy().to_string();

    let report: RunReport = run_cli_json(
        temp.path(),
        &["--config", &config_arg, "scan", "--target", &target_arg, "--json"],
    );
    assert_eq!(report.files_processed, 4);
    assert_eq!(report.db_path, db);
    assert_eq!(stored_rows(&db).len(), 4);
}

#[test]
fn malformed_config_is_fatal() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("config.toml"), "exclude = 42\n").unwrap();

    let output = run_cli(temp.path(), &["config"]);
    assert!(!output.status.success());
}
