//! fstriage command-line entry point
//!
//! - `scan`: traverse, identify, hash and record a directory tree
//! - `stats`: query an existing inventory
//! - `mounts`: list mounted volumes that can be scanned
//! - `config`: show resolved paths and identification capabilities

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fstriage::{paths, TriageConfig};
use fstriage_logging::{init_logging, LogConfig};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "fstriage",
    version,
    about = "Read-only filesystem triage: traverse, identify, hash and inventory files"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: <home>/config.toml)
    #[arg(long, global = true, env = "FSTRIAGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a directory tree into the inventory store
    Scan {
        /// Root directory to scan
        #[arg(long)]
        target: PathBuf,

        /// Inventory store path (default: <home>/inventory.sqlite3)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Stop after this many files
        #[arg(long)]
        limit: Option<NonZeroUsize>,

        /// Extra path to prune from traversal (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<PathBuf>,

        /// Skip files that vanish or cannot be read instead of aborting
        #[arg(long)]
        skip_unreadable: bool,

        /// Do not use the content-sniffing tier
        #[arg(long)]
        no_content_sniff: bool,

        /// Do not train the demo model after the scan
        #[arg(long)]
        no_model: bool,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize an existing inventory store
    Stats {
        /// Inventory store path (default: <home>/inventory.sqlite3)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Also list up to N content digests shared by several paths
        #[arg(long, value_name = "N")]
        duplicates: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List mounted volumes that are accessible directories
    Mounts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved paths and identification capabilities
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(explicit: Option<&PathBuf>) -> Result<(PathBuf, TriageConfig)> {
    match explicit {
        Some(path) => {
            let config = TriageConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok((path.clone(), config))
        }
        None => {
            let path = paths::default_config_path();
            let config = TriageConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok((path, config))
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let (config_path, config) = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Scan {
            target,
            db,
            limit,
            exclude,
            skip_unreadable,
            no_content_sniff,
            no_model,
            json,
        } => cli::scan::run(
            cli::scan::ScanArgs {
                target,
                db,
                limit: limit.map(NonZeroUsize::get),
                exclude,
                skip_unreadable,
                no_content_sniff,
                no_model,
                json,
            },
            &config,
        ),
        Commands::Stats {
            db,
            duplicates,
            json,
        } => cli::stats::run(
            cli::stats::StatsArgs {
                db,
                duplicates,
                json,
            },
            &config,
        ),
        Commands::Mounts { json } => cli::mounts::run(cli::mounts::MountsArgs { json }),
        Commands::Config { json } => cli::config::run(
            cli::config::ConfigArgs { json },
            &config_path,
            &config,
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = paths::logs_dir();
    if let Err(err) = init_logging(LogConfig {
        app_name: "fstriage",
        verbose: cli.verbose,
        log_dir: Some(&log_dir),
    }) {
        eprintln!("Warning: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
