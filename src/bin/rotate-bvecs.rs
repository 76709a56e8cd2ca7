use anyhow::Context;
use clap::Parser;
use oasis_dwi::{init_tracing, rotate_bvecs_exec, OasisParams, RotateArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = RotateArgs::parse();

    let params = match &args.params {
        Some(file) => OasisParams::from_toml_file(file)
            .with_context(|| format!("failed to load parameter file {}", file.display()))?,
        None => OasisParams::default(),
    };

    rotate_bvecs_exec(&args, &params.rotate)
        .with_context(|| format!("failed to rotate b-vectors from {}", args.bvecs.display()))?;
    Ok(())
}
