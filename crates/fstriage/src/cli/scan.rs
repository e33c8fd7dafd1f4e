//! Scan command - inventory a directory tree
//!
//! Config file values are the base; flags override them and `--exclude`
//! entries are added to the configured ones.

use crate::cli::output::truncate_chars;
use anyhow::Context;
use fstriage::classifier::{self, ClassifierOutcome};
use fstriage::{
    paths, Capabilities, ExtractionPolicy, RunOptions, RunOutput, RunReport, TriageConfig,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Characters of the sample record shown in the summary
const SAMPLE_CHARS: usize = 600;

pub const DEMO_MODEL_FILE: &str = "demo_model.json";

/// Arguments for the scan command
#[derive(Debug)]
pub struct ScanArgs {
    pub target: PathBuf,
    pub db: Option<PathBuf>,
    pub limit: Option<usize>,
    pub exclude: Vec<PathBuf>,
    pub skip_unreadable: bool,
    pub no_content_sniff: bool,
    pub no_model: bool,
    pub json: bool,
}

/// Execute the scan command
pub fn run(args: ScanArgs, config: &TriageConfig) -> anyhow::Result<()> {
    let options = build_options(&args, config);
    let output = fstriage::run(&options)
        .with_context(|| format!("Scan of {} failed", options.target.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    } else {
        print!("{}", render_summary(&output.report));
    }

    if config.train_demo_model && !args.no_model {
        let line = train_demo_model(&output);
        if !args.json {
            println!("{}", line);
        }
    }

    Ok(())
}

fn build_options(args: &ScanArgs, config: &TriageConfig) -> RunOptions {
    let mut identify = config.identify;
    if args.no_content_sniff {
        identify.content_sniff = false;
    }

    let db_path = args
        .db
        .as_deref()
        .map(paths::expand_tilde)
        .unwrap_or_else(|| paths::expand_tilde(&config.database_path));

    let mut exclude: Vec<PathBuf> = config.exclude.iter().map(|p| paths::expand_tilde(p)).collect();
    exclude.extend(args.exclude.iter().map(|p| paths::expand_tilde(p)));

    RunOptions {
        target: paths::expand_tilde(&args.target),
        db_path,
        limit: args.limit,
        exclude,
        policy: ExtractionPolicy::from_skip_flag(args.skip_unreadable || config.skip_unreadable),
        capabilities: Capabilities::detect(&identify),
    }
}

/// Human-readable run summary.
pub fn render_summary(report: &RunReport) -> String {
    let mut lines = vec![
        "=== Run Summary ===".to_string(),
        format!("Target: {}", report.target.display()),
        format!("DB: {}", report.db_path.display()),
        format!("Files processed: {}", report.files_processed),
    ];
    if report.files_skipped > 0 {
        lines.push(format!("Files skipped: {}", report.files_skipped));
    }
    if report.traversal_errors > 0 {
        lines.push(format!("Unreadable entries: {}", report.traversal_errors));
    }
    lines.push("Counts by MIME:".to_string());
    for entry in &report.by_mime {
        lines.push(format!("  {}: {}", entry.mime, entry.count));
    }
    match &report.sample {
        Some(sample) => {
            let dump = serde_json::to_string(sample).unwrap_or_default();
            lines.push("Sample record:".to_string());
            lines.push(format!("  {}", truncate_chars(&dump, SAMPLE_CHARS)));
        }
        None => lines.push("Sample record: (none)".to_string()),
    }
    lines.push(format!("Elapsed: {:.2}s", report.duration_ms as f64 / 1000.0));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Fit the demo model next to the store. Never fails the scan.
fn train_demo_model(output: &RunOutput) -> String {
    let model_path = demo_model_path(&output.report.db_path);
    let labels: Vec<bool> = output.records.iter().map(classifier::demo_label).collect();

    match classifier::train(&output.records, &labels, Some(&model_path)) {
        Ok(ClassifierOutcome::Trained(model)) => format!(
            "Demo model saved to {} ({} samples, training accuracy {:.2})",
            model_path.display(),
            model.samples,
            model.training_accuracy
        ),
        Ok(ClassifierOutcome::Unavailable { reason }) => {
            info!(%reason, "Demo model not trained");
            format!("Demo model not trained: {}", reason)
        }
        Err(err) => {
            warn!(error = %err, "Demo model training failed");
            format!("Demo model not trained: {}", err)
        }
    }
}

fn demo_model_path(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map(|dir| dir.join(DEMO_MODEL_FILE))
        .unwrap_or_else(|| PathBuf::from(DEMO_MODEL_FILE))
}
