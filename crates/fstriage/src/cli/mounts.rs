//! Mounts command - list volumes that can be scanned

use fstriage::traversal::mounted_roots;

/// Arguments for the mounts command
#[derive(Debug)]
pub struct MountsArgs {
    pub json: bool,
}

/// Execute the mounts command
pub fn run(args: MountsArgs) -> anyhow::Result<()> {
    let roots = mounted_roots();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&roots)?);
        return Ok(());
    }

    if roots.is_empty() {
        println!("No accessible mounted volumes found.");
        return Ok(());
    }
    for root in &roots {
        println!("{}", root.display());
    }
    Ok(())
}
