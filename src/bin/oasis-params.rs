use anyhow::Context;
use clap::Parser;
use oasis_dwi::OasisParams;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Parser)]
struct Args {
    /// path to parameter file to write
    parameter_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let toml_string = OasisParams::default().to_toml_string()?;
    let filename = args.parameter_file.with_extension("toml");
    fs::write(&filename, toml_string).with_context(|| format!("can't write {}", filename.display()))?;
    println!("wrote default parameter file to {}", filename.display());
    Ok(())
}
