use anyhow::Context;
use clap::Parser;
use oasis_dwi::dataset::check_derivatives;
use oasis_dwi::{init_tracing, OasisParams};
use std::path::PathBuf;

/// Verify presence of required OASIS-3 derivative files.
#[derive(Debug, Parser)]
struct Args {
    /// txt file with sub-XXX/ses-XXX rows
    list_file: PathBuf,
    /// directory containing all subject folders
    root_dir: PathBuf,
    /// optional parameter file (see oasis-params)
    #[arg(long)]
    params: Option<PathBuf>,
    /// print the report as json
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let params = match &args.params {
        Some(file) => OasisParams::from_toml_file(file)
            .with_context(|| format!("failed to load parameter file {}", file.display()))?,
        None => OasisParams::default(),
    };

    let report = check_derivatives(&args.list_file, &args.root_dir, &params.check.required_suffixes)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
