use anyhow::Context;
use clap::Parser;
use oasis_dwi::init_tracing;
use oasis_dwi::sanitize::{sanitize_dataset, CleanupLog, SanitizeOptions};
use std::path::PathBuf;

/// Clean up OASIS-3 dataset structure and filenames.
#[derive(Debug, Parser)]
struct Args {
    /// path to the root of the dataset
    #[arg(long)]
    root: PathBuf,
    /// run without making changes
    #[arg(long)]
    dry_run: bool,
    /// directory receiving the cleanup log
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut log = CleanupLog::create(&args.log_dir)
        .with_context(|| format!("can't create cleanup log in {}", args.log_dir.display()))?;
    let report = sanitize_dataset(&args.root, SanitizeOptions { dry_run: args.dry_run }, &mut log)?;

    println!(
        "moved {}, removed {}, skipped {}, pruned {} directories, {} DWI with missing sidecars",
        report.moved.len(),
        report.removed.len(),
        report.skipped.len(),
        report.removed_dirs.len(),
        report.missing_sidecars.len()
    );
    println!("log written to {}", log.path().display());
    Ok(())
}
