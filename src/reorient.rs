use crate::affine::AffineTransform;
use crate::error::{Error, Result};
use crate::gradients::{GradientTable, RotatedGradientTable};
use ndarray::{Array2, ArrayView1};

/// rotation(s) applied to the diffusion-weighted records of a table
#[derive(Debug, Clone, PartialEq)]
pub enum Rotation {
    /// one rigid registration applied uniformly across the series
    Shared(Array2<f64>),
    /// one rotation per diffusion-weighted record, in record order (b0 records take no entry)
    PerVolume(Vec<Array2<f64>>),
}

impl Rotation {
    /// uses the linear block as-is. The caller is responsible for having converted it to the
    /// b-vector convention first.
    pub fn shared(affine: &AffineTransform) -> Self {
        Self::Shared(affine.linear().to_owned())
    }
}

/// applies `rotation` to every non-b0 direction. b0 records are copied through untouched and
/// directions are not renormalized, so any scale left in the rotation carries into the output.
pub fn reorient_bvecs(table: &GradientTable, rotation: &Rotation) -> Result<RotatedGradientTable> {
    let n_weighted = table.n_weighted();
    let matrices = match rotation {
        Rotation::Shared(r) => std::slice::from_ref(r),
        Rotation::PerVolume(rotations) => rotations.as_slice(),
    };
    if let Some(bad) = matrices.iter().find(|r| r.dim() != (3, 3)) {
        let (rows, cols) = bad.dim();
        return Err(Error::InvalidRotationShape { rows, cols });
    }
    if let Rotation::PerVolume(rotations) = rotation {
        if rotations.len() != n_weighted {
            return Err(Error::RotationCountMismatch {
                expected: n_weighted,
                found: rotations.len(),
            });
        }
    }

    let mut weighted_idx = 0;
    let records = table
        .iter()
        .map(|record| {
            if record.is_baseline() {
                return *record;
            }
            let r = match rotation {
                Rotation::Shared(r) => r,
                Rotation::PerVolume(rotations) => &rotations[weighted_idx],
            };
            weighted_idx += 1;
            record.with_direction(rotate(r, &record.direction))
        })
        .collect();

    Ok(GradientTable::from_records(records))
}

fn rotate(r: &Array2<f64>, v: &[f64; 3]) -> [f64; 3] {
    let rotated = r.dot(&ArrayView1::from(&v[..]));
    [rotated[0], rotated[1], rotated[2]]
}
