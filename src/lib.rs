//! Tools for OASIS-3 style diffusion MRI derivatives: b-vector reorientation after
//! registration, derivative completeness checks and dataset layout cleanup.

pub mod affine;
pub mod data_export;
pub mod data_import;
pub mod dataset;
pub mod error;
pub mod gradients;
pub mod mat_file;
pub mod params;
pub mod reorient;
pub mod sanitize;

use crate::affine::Convention;
use crate::gradients::RotatedGradientTable;
use crate::reorient::{reorient_bvecs, Rotation};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use error::{Error, Result};
pub use params::{CheckParams, OasisParams, RotateParams};

/// Rotate diffusion b-vectors by the linear part of an ANTs/ITK affine (LPS -> RAS)
#[derive(Debug, Clone, Parser)]
#[command(name = "rotate-bvecs")]
pub struct RotateArgs {
    /// ITK .mat transform from antsRegistration (e.g. 0GenericAffine.mat)
    pub affine: PathBuf,
    /// FSL-style .bval file
    pub bvals: PathBuf,
    /// FSL-style .bvec file (3 x N)
    pub bvecs: PathBuf,
    /// path to write the rotated .bvec file
    pub output: PathBuf,
    /// optional parameter file (see oasis-params)
    #[arg(long)]
    pub params: Option<PathBuf>,
}

/// runs the reorientation pipeline: load affine -> LPS to RAS -> build gradient table -> rotate -> write.
/// Nothing is written unless every step succeeds.
pub fn rotate_bvecs_exec(args: &RotateArgs, params: &RotateParams) -> Result<RotatedGradientTable> {
    params.validate()?;

    let affine = data_import::read_affine(&args.affine, &params.transform_pattern)?;
    let mut affine = affine.to_convention(Convention::Ras);
    if params.orthogonalize {
        affine = affine.orthogonalized()?;
    }
    tracing::debug!("linear block (RAS): {:?}", affine.linear());

    let table = data_import::read_gradient_table(&args.bvals, &args.bvecs, params.b0_threshold)?;
    tracing::info!("found {} volumes, {} b0s", table.len(), table.len() - table.n_weighted());

    let rotated = reorient_bvecs(&table, &Rotation::shared(&affine))?;
    data_export::write_bvecs(&args.output, &rotated, params.decimals)?;
    tracing::info!("rotated b-vectors written to {}", args.output.display());

    Ok(rotated)
}

/// installs a stderr subscriber filtered by RUST_LOG, defaulting to info for this crate
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oasis_dwi=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
