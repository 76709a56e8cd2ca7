use crate::error::{Error, Result};
use crate::mat_file::MatContainer;
use ndarray::Array2;
use ndarray_linalg::{JobSvd, SVDDC};

/// name fragment shared by ITK linear transform variables (AffineTransform_double_3_3,
/// AffineTransform_float_3_3, ...)
pub const DEFAULT_TRANSFORM_PATTERN: &str = "AffineTransform";

/// sign flips relating LPS and RAS: the two conventions are mirrored on the first two axes
const LPS_RAS_SIGNS: [f64; 3] = [-1., -1., 1.];

/// smallest singular value allowed, relative to the largest
const RANK_TOL: f64 = 1e-12;

/// anatomical axis convention a linear block is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// left, posterior, superior. Used by ITK and ANTs
    Lps,
    /// right, anterior, superior. Used by FSL, MRtrix and DIPY b-vectors
    Ras,
}

/// the 3 x 3 linear block of a spatial transform. Translation is never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform {
    linear: Array2<f64>,
    convention: Convention,
}

impl AffineTransform {
    pub fn new(linear: Array2<f64>, convention: Convention) -> Self {
        assert_eq!(linear.dim(), (3, 3), "expected a 3x3 linear block");
        Self { linear, convention }
    }

    pub fn identity(convention: Convention) -> Self {
        Self::new(Array2::eye(3), convention)
    }

    /// extracts the linear block from an ITK transform container. The first variable (in lexical
    /// name order) whose name contains `pattern` and that holds at least 9 values is used. Its
    /// values are flattened row-major and the first 9 are reshaped row-major into the block,
    /// so the trailing translation of ITK's 12-parameter layout is dropped.
    pub fn from_container(container: &MatContainer, pattern: &str) -> Result<Self> {
        let (name, array) = container
            .iter()
            .find(|(name, array)| name.contains(pattern) && array.len() >= 9)
            .ok_or_else(|| Error::MissingTransform { pattern: pattern.to_string() })?;

        let candidates = container.iter().filter(|(n, a)| n.contains(pattern) && a.len() >= 9).count();
        if candidates > 1 {
            tracing::warn!("{} arrays match '{}', using '{}'", candidates, pattern, name);
        }

        let values = array.row_major_values();
        let linear = Array2::from_shape_vec((3, 3), values[..9].to_vec())
            .map_err(|e| Error::MalformedContainer(format!("cannot reshape '{name}' to 3x3: {e}")))?;

        tracing::debug!("using transform '{}' from container", name);
        Ok(Self::new(linear, Convention::Lps))
    }

    pub fn linear(&self) -> &Array2<f64> {
        &self.linear
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// re-expresses the block in `target`. Converting to the current convention is a no-op.
    pub fn to_convention(self, target: Convention) -> Self {
        if self.convention == target {
            return self;
        }
        Self {
            linear: flip_lps_ras(&self.linear),
            convention: target,
        }
    }

    /// replaces the block with the orthogonal factor of its polar decomposition, discarding
    /// any scale and shear picked up during registration
    pub fn orthogonalized(&self) -> Result<Self> {
        Ok(Self {
            linear: polar_rotation(&self.linear)?,
            convention: self.convention,
        })
    }
}

/// similarity transform D * M * D with D = diag(-1, -1, 1). Written element-wise since D is
/// diagonal, which keeps the result exact and makes the conversion its own inverse.
pub fn flip_lps_ras(m: &Array2<f64>) -> Array2<f64> {
    assert_eq!(m.dim(), (3, 3), "expected a 3x3 matrix");
    Array2::from_shape_fn((3, 3), |(i, j)| LPS_RAS_SIGNS[i] * m[[i, j]] * LPS_RAS_SIGNS[j])
}

/// orthogonal factor U * V^T of the polar decomposition, from the SVD M = U * S * V^T.
/// Fails when the block is rank deficient relative to its largest singular value.
fn polar_rotation(m: &Array2<f64>) -> Result<Array2<f64>> {
    if m.iter().any(|x| !x.is_finite()) {
        return Err(Error::DegenerateTransform);
    }
    let (u, s, vt) = m.svddc(JobSvd::All).map_err(|e| {
        tracing::warn!("svd of linear block failed: {}", e);
        Error::DegenerateTransform
    })?;
    let (Some(u), Some(vt)) = (u, vt) else {
        return Err(Error::DegenerateTransform);
    };

    let s_max = s.iter().fold(0f64, |acc, x| acc.max(*x));
    let s_min = s.iter().fold(f64::INFINITY, |acc, x| acc.min(*x));
    if s_max == 0. || s_min / s_max < RANK_TOL {
        return Err(Error::DegenerateTransform);
    }
    Ok(u.dot(&vt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        (a - b).iter().fold(0f64, |acc, x| acc.max(x.abs()))
    }

    fn rotation_z(theta: f64) -> Array2<f64> {
        arr2(&[
            [theta.cos(), -theta.sin(), 0.],
            [theta.sin(), theta.cos(), 0.],
            [0., 0., 1.],
        ])
    }

    #[test]
    fn conversion_is_its_own_inverse() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let m = Array2::from_shape_fn((3, 3), |_| rng.random_range(-10.0..10.0));
            assert_eq!(flip_lps_ras(&flip_lps_ras(&m)), m);
        }
    }

    #[test]
    fn conversion_matches_matrix_product() {
        let d = Array2::from_diag(&ndarray::arr1(&[-1., -1., 1.]));
        let m = arr2(&[[1., 2., 3.], [4., 5., 6.], [7., 8., 9.]]);
        let expected = d.dot(&m).dot(&d);
        assert_eq!(flip_lps_ras(&m), expected);
        assert_eq!(expected, arr2(&[[1., 2., -3.], [4., 5., -6.], [-7., -8., 9.]]));
    }

    #[test]
    fn to_convention_round_trips_and_skips_same_convention() {
        let m = arr2(&[[0.9, 0.1, 0.2], [-0.1, 1.0, 0.3], [0.4, -0.2, 1.1]]);
        let lps = AffineTransform::new(m.clone(), Convention::Lps);
        let ras = lps.clone().to_convention(Convention::Ras);
        assert_eq!(ras.convention(), Convention::Ras);
        assert_ne!(ras.linear(), &m);
        assert_eq!(ras.clone().to_convention(Convention::Ras), ras);
        assert_eq!(ras.to_convention(Convention::Lps), lps);
    }

    #[test]
    fn orthogonalized_rotation_is_unchanged() {
        let r = rotation_z(0.3);
        let t = AffineTransform::new(r.clone(), Convention::Ras).orthogonalized().unwrap();
        assert!(max_abs_diff(t.linear(), &r) < 1e-12);
    }

    #[test]
    fn orthogonalized_strips_scale() {
        let r = rotation_z(-1.1);
        let scale = Array2::from_diag(&ndarray::arr1(&[1.2, 0.8, 1.05]));
        let t = AffineTransform::new(r.dot(&scale), Convention::Lps).orthogonalized().unwrap();
        assert!(max_abs_diff(t.linear(), &r) < 1e-9);
        let gram = t.linear().t().dot(t.linear());
        assert!(max_abs_diff(&gram, &Array2::eye(3)) < 1e-9);
        assert_eq!(t.convention(), Convention::Lps);
    }

    #[test]
    fn orthogonalized_rejects_singular_block() {
        let m = arr2(&[[1., 0., 0.], [0., 1., 0.], [0., 0., 0.]]);
        let err = AffineTransform::new(m, Convention::Ras).orthogonalized().unwrap_err();
        assert!(matches!(err, Error::DegenerateTransform));
    }

    #[test]
    fn orthogonalized_ignores_uniform_scale() {
        let r = rotation_z(0.3);
        for scale in [1e-5, 1e-3, 1e3, 1e5] {
            let t = AffineTransform::new(&r * scale, Convention::Ras).orthogonalized().unwrap();
            assert!(max_abs_diff(t.linear(), &r) < 1e-9, "scale {scale}");
        }
    }

    #[test]
    fn orthogonalized_keeps_reflection() {
        let m = arr2(&[[-2., 0., 0.], [0., 1., 0.], [0., 0., 3.]]);
        let t = AffineTransform::new(m, Convention::Ras).orthogonalized().unwrap();
        let expected = Array2::from_diag(&ndarray::arr1(&[-1., 1., 1.]));
        assert!(max_abs_diff(t.linear(), &expected) < 1e-12);
    }

    #[test]
    fn orthogonalized_rejects_non_finite_block() {
        let mut m = rotation_z(0.2);
        m[[1, 1]] = f64::NAN;
        let err = AffineTransform::new(m, Convention::Ras).orthogonalized().unwrap_err();
        assert!(matches!(err, Error::DegenerateTransform));
    }
}
