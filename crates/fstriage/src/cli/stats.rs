//! Stats command - summarize an existing inventory
//!
//! Opens the store read-only, so it can run while a scan holds the write
//! transaction and sees the last committed state.

use crate::cli::output::{format_share, print_table};
use anyhow::Context;
use fstriage::{paths, DigestGroup, MimeCount, Store, TriageConfig};
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the stats command
#[derive(Debug)]
pub struct StatsArgs {
    pub db: Option<PathBuf>,
    pub duplicates: Option<usize>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    db_path: PathBuf,
    journal_mode: String,
    total_rows: u64,
    by_mime: Vec<MimeCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicates: Option<Vec<DigestGroup>>,
}

/// Execute the stats command
pub fn run(args: StatsArgs, config: &TriageConfig) -> anyhow::Result<()> {
    let db_path = paths::expand_tilde(args.db.as_deref().unwrap_or(config.database_path.as_path()));
    let store = Store::open_readonly(&db_path)
        .with_context(|| format!("Cannot open inventory {}", db_path.display()))?;

    let report = StatsReport {
        journal_mode: store.journal_mode()?,
        total_rows: store.count_rows()?,
        by_mime: store.aggregate_by_mime()?,
        duplicates: args
            .duplicates
            .map(|limit| store.duplicate_digests(limit))
            .transpose()?,
        db_path,
    };
    store.close()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Inventory: {}", report.db_path.display());
    println!("Journal:   {}", report.journal_mode);
    println!("Files:     {}", report.total_rows);
    println!();

    if report.by_mime.is_empty() {
        println!("No files recorded.");
    } else {
        let rows = report
            .by_mime
            .iter()
            .map(|m| {
                vec![
                    m.mime.clone(),
                    m.count.to_string(),
                    format_share(m.count, report.total_rows),
                ]
            })
            .collect();
        print_table(&["MIME", "Files", "Share"], rows);
    }

    if let Some(duplicates) = &report.duplicates {
        println!();
        if duplicates.is_empty() {
            println!("No duplicate content digests.");
        } else {
            println!("Duplicate content:");
            let rows = duplicates
                .iter()
                .map(|d| vec![d.sha256.clone(), d.count.to_string()])
                .collect();
            print_table(&["SHA-256", "Paths"], rows);
        }
    }

    Ok(())
}
