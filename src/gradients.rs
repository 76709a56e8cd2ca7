use crate::error::{Error, Result};
use ndarray::{Array2, Axis};

/// b-values at or below this are treated as b0 (baseline) acquisitions
pub const DEFAULT_B0_THRESHOLD: f64 = 1.0;

/// non-b0 directions further than this from unit length are reported
const UNIT_NORM_TOL: f64 = 1e-2;

/// one diffusion acquisition: its b-value and gradient direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientRecord {
    pub b_value: f64,
    pub direction: [f64; 3],
    baseline: bool,
}

impl GradientRecord {
    pub fn new(b_value: f64, direction: [f64; 3], b0_threshold: f64) -> Self {
        Self {
            b_value,
            direction,
            baseline: b_value <= b0_threshold,
        }
    }

    /// b0 records carry no meaningful direction and are never rotated
    pub fn is_baseline(&self) -> bool {
        self.baseline
    }

    pub(crate) fn with_direction(&self, direction: [f64; 3]) -> Self {
        Self { direction, ..*self }
    }
}

/// b-value / b-vector pairs in acquisition order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradientTable {
    records: Vec<GradientRecord>,
}

/// the output of reorientation has the same layout as its input
pub type RotatedGradientTable = GradientTable;

impl GradientTable {
    /// pairs b-values with directions positionally. Both must have the same length.
    pub fn from_parts(b_values: &[f64], directions: &[[f64; 3]], b0_threshold: f64) -> Result<Self> {
        if b_values.len() != directions.len() {
            return Err(Error::MalformedGradientData(format!(
                "{} b-values but {} b-vectors",
                b_values.len(),
                directions.len()
            )));
        }

        let records = b_values
            .iter()
            .zip(directions)
            .map(|(&b, &g)| GradientRecord::new(b, g, b0_threshold))
            .collect::<Vec<_>>();

        records.iter().enumerate().filter(|(_, r)| !r.is_baseline()).for_each(|(idx, r)| {
            let norm = r.direction.iter().map(|x| x * x).sum::<f64>().sqrt();
            if (norm - 1.).abs() > UNIT_NORM_TOL {
                tracing::warn!("b-vector {} has norm {:.4} (b = {}), expected a unit vector", idx, norm, r.b_value);
            }
        });

        Ok(Self { records })
    }

    pub(crate) fn from_records(records: Vec<GradientRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[GradientRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &GradientRecord> {
        self.records.iter()
    }

    pub fn directions(&self) -> Vec<[f64; 3]> {
        self.records.iter().map(|r| r.direction).collect()
    }

    pub fn b_values(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.b_value).collect()
    }

    /// true for every b0 record
    pub fn b0_mask(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.is_baseline()).collect()
    }

    /// number of diffusion-weighted (non-b0) records
    pub fn n_weighted(&self) -> usize {
        self.records.iter().filter(|r| !r.is_baseline()).count()
    }
}

fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// parses b-values separated by any whitespace, in any row/column layout
pub fn parse_bvals(text: &str) -> Result<Vec<f64>> {
    text.split_ascii_whitespace()
        .enumerate()
        .map(|(idx, token)| {
            parse_finite(token).ok_or_else(|| {
                Error::MalformedGradientData(format!("b-value {} ('{}') is not a finite number", idx, token))
            })
        })
        .collect()
}

/// parses a b-vector grid. Three rows are read as FSL layout (one row per axis, one column per
/// volume), otherwise every row must hold exactly three values (one row per volume).
pub fn parse_bvecs(text: &str) -> Result<Vec<[f64; 3]>> {
    let rows = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(row_idx, line)| {
            line.split_ascii_whitespace()
                .map(|token| {
                    parse_finite(token).ok_or_else(|| {
                        Error::MalformedGradientData(format!("b-vector row {} has non-finite value '{}'", row_idx, token))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let n_rows = rows.len();
    if n_rows == 0 {
        return Ok(vec![]);
    }

    let n_cols = rows[0].len();
    if let Some(idx) = rows.iter().position(|r| r.len() != n_cols) {
        return Err(Error::MalformedGradientData(format!(
            "b-vector row {} has {} values, expected {}",
            idx,
            rows[idx].len(),
            n_cols
        )));
    }

    let grid = Array2::from_shape_vec((n_rows, n_cols), rows.concat())
        .map_err(|e| Error::MalformedGradientData(format!("bad b-vector grid: {e}")))?;

    let axis = if n_rows == 3 {
        Axis(1)
    } else if n_cols == 3 {
        Axis(0)
    } else {
        return Err(Error::MalformedGradientData(format!(
            "b-vector grid is {} x {}, expected 3 x N or N x 3",
            n_rows, n_cols
        )));
    };

    Ok(grid
        .axis_iter(axis)
        .map(|g| {
            let mut v = [0.; 3];
            v.iter_mut().zip(g.iter()).for_each(|(a, &b)| *a = b);
            v
        })
        .collect())
}
