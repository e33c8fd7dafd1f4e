//! Config command - show resolved paths and capabilities

use fstriage::traversal::ExclusionSet;
use fstriage::{paths, Capabilities, TriageConfig};
use std::path::Path;

/// Arguments for the config command
#[derive(Debug)]
pub struct ConfigArgs {
    pub json: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs, config_path: &Path, config: &TriageConfig) -> anyhow::Result<()> {
    let home = paths::fstriage_home();
    let db_path = paths::expand_tilde(&config.database_path);
    let logs = paths::logs_dir();
    let caps = Capabilities::detect(&config.identify);
    let excludes = ExclusionSet::platform_defaults().with_extra(&config.exclude);
    let methods: Vec<&str> = caps.methods().iter().map(|m| m.as_str()).collect();

    if args.json {
        let value = serde_json::json!({
            "home": home.to_string_lossy(),
            "config": {
                "path": config_path.to_string_lossy(),
                "exists": config_path.exists(),
            },
            "database": {
                "path": db_path.to_string_lossy(),
                "exists": db_path.exists(),
            },
            "logs": {
                "path": logs.to_string_lossy(),
                "exists": logs.exists(),
            },
            "identification": {
                "content_sniff": caps.content_sniff(),
                "signatures": caps.signatures(),
                "methods": methods,
            },
            "exclude": excludes.entries(),
            "skip_unreadable": config.skip_unreadable,
            "train_demo_model": config.train_demo_model,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let exists = |p: &Path| if p.exists() { "exists" } else { "not found" };

    println!("FSTRIAGE CONFIGURATION");
    println!("======================");
    println!();
    println!("Home:     {}", home.display());
    println!("Config:   {} ({})", config_path.display(), exists(config_path));
    println!("Database: {} ({})", db_path.display(), exists(&db_path));
    println!("Logs:     {}", logs.display());
    println!();
    println!("Identification tiers: {}", methods.join(" -> "));
    println!();
    println!("Excluded paths:");
    for entry in excludes.entries() {
        println!("  {}", entry.display());
    }
    println!();
    println!(
        "Unreadable files: {}",
        if config.skip_unreadable { "skip" } else { "abort run" }
    );
    println!(
        "Demo model:       {}",
        if config.train_demo_model { "trained after scan" } else { "off" }
    );

    Ok(())
}
