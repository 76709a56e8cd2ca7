use crate::affine::AffineTransform;
use crate::error::{Error, Result};
use crate::gradients::{parse_bvals, parse_bvecs, GradientTable};
use crate::mat_file::MatContainer;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::InvalidData => {
            Error::MalformedGradientData(format!("{} is not valid UTF-8 text", path.display()))
        }
        _ => Error::InputNotFound { path: path.to_path_buf(), source },
    })
}

/// load the linear block of an ITK/ANTs transform file (still in LPS)
pub fn read_affine(mat_file: impl AsRef<Path>, pattern: &str) -> Result<AffineTransform> {
    let path = mat_file.as_ref();
    let bytes = fs::read(path).map_err(|source| Error::InputNotFound { path: path.to_path_buf(), source })?;
    let container = MatContainer::from_bytes(&bytes)?;
    tracing::debug!("read {} variables from {}", container.len(), path.display());
    AffineTransform::from_container(&container, pattern)
}

/// read b-values from a whitespace delimited text file
pub fn read_bvals(txt_file: impl AsRef<Path>) -> Result<Vec<f64>> {
    parse_bvals(&read_text(txt_file.as_ref())?)
}

/// read b-vectors from a whitespace delimited text file (3 x N or N x 3)
pub fn read_bvecs(txt_file: impl AsRef<Path>) -> Result<Vec<[f64; 3]>> {
    parse_bvecs(&read_text(txt_file.as_ref())?)
}

/// load a b-value / b-vector file pair into a gradient table
pub fn read_gradient_table(bvals: impl AsRef<Path>, bvecs: impl AsRef<Path>, b0_threshold: f64) -> Result<GradientTable> {
    let b_values = read_bvals(bvals)?;
    let directions = read_bvecs(bvecs)?;
    GradientTable::from_parts(&b_values, &directions, b0_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_files_are_reported_as_input_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.bval");
        let err = read_bvals(&missing).unwrap_err();
        assert!(matches!(err, Error::InputNotFound { ref path, .. } if path == &missing));

        let err = read_affine(dir.path().join("nope.mat"), "AffineTransform").unwrap_err();
        assert!(matches!(err, Error::InputNotFound { .. }));
    }

    #[test]
    fn reads_table_from_file_pair() {
        let dir = tempdir().unwrap();
        let bvals = dir.path().join("dwi.bval");
        let bvecs = dir.path().join("dwi.bvec");
        fs::write(&bvals, "0 1000 1000\n").unwrap();
        fs::write(&bvecs, "0 1 0\n0 0 1\n0 0 0\n").unwrap();

        let table = read_gradient_table(&bvals, &bvecs, 1.).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.directions(), vec![[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]]);
        assert_eq!(table.b0_mask(), vec![true, false, false]);
    }

    #[test]
    fn container_without_affine_is_missing_transform() {
        let dir = tempdir().unwrap();
        let mat = dir.path().join("empty.mat");
        fs::write(&mat, b"").unwrap();
        let err = read_affine(&mat, "AffineTransform").unwrap_err();
        assert!(matches!(err, Error::MissingTransform { .. }));
    }

    #[test]
    fn non_utf8_text_is_malformed_gradient_data() {
        let dir = tempdir().unwrap();
        let bvals = dir.path().join("dwi.bval");
        fs::write(&bvals, [0x30, 0x20, 0xff, 0xfe, 0x0a]).unwrap();
        let err = read_bvals(&bvals).unwrap_err();
        assert!(matches!(err, Error::MalformedGradientData(_)));

        let bvecs = dir.path().join("dwi.bvec");
        fs::write(&bvecs, [0xc3, 0x28]).unwrap();
        assert!(matches!(read_bvecs(&bvecs).unwrap_err(), Error::MalformedGradientData(_)));
    }
}
