use crate::error::{Error, Result};
use crate::gradients::GradientTable;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// formats directions in FSL layout: one row per axis, one column per volume
pub fn format_bvecs(table: &GradientTable, decimals: usize) -> String {
    let mut out = String::new();
    for axis in 0..3 {
        let row = table
            .iter()
            .map(|r| format!("{:.*}", decimals, r.direction[axis]))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// writes the b-vector file through a temporary file in the destination directory, so the
/// destination is either fully written or left untouched
pub fn write_bvecs(bvec_file: impl AsRef<Path>, table: &GradientTable, decimals: usize) -> Result<()> {
    let path = bvec_file.as_ref();
    let output_err = |source: std::io::Error| Error::OutputWrite { path: path.to_path_buf(), source };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(output_err)?;
    tmp.write_all(format_bvecs(table, decimals).as_bytes()).map_err(output_err)?;
    tmp.flush().map_err(output_err)?;
    tmp.persist(path).map_err(|e| output_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradients::parse_bvecs;
    use tempfile::tempdir;

    fn sample() -> GradientTable {
        GradientTable::from_parts(&[0., 1000., 1000.], &[[0., 0., 0.], [1., 0., 0.], [0., -0.6, 0.8]], 1.).unwrap()
    }

    #[test]
    fn formats_three_rows_with_fixed_decimals() {
        let text = format_bvecs(&sample(), 8);
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0.00000000 1.00000000 0.00000000");
        assert_eq!(lines[1], "0.00000000 0.00000000 -0.60000000");
        assert_eq!(lines[2], "0.00000000 0.00000000 0.80000000");
        assert_eq!(parse_bvecs(&text).unwrap(), sample().directions());
    }

    #[test]
    fn empty_table_writes_three_empty_rows() {
        assert_eq!(format_bvecs(&GradientTable::default(), 8), "\n\n\n");
    }

    #[test]
    fn writes_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("rot.bvec");
        write_bvecs(&out, &sample(), 4).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().next().unwrap(), "0.0000 1.0000 0.0000");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unwritable_destination_is_output_write_error() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("missing_dir").join("rot.bvec");
        let err = write_bvecs(&out, &sample(), 8).unwrap_err();
        assert!(matches!(err, Error::OutputWrite { .. }));
        assert!(!out.exists());
    }
}
