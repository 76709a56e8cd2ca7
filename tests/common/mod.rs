use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::path::Path;

/// encodes a little-endian MAT v4 double variable. `values` are column-major
pub fn mat_v4_variable(name: &str, rows: i32, cols: i32, values: &[f64]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in [0, rows, cols, 0, name.len() as i32 + 1] {
        out.write_i32::<LittleEndian>(field).unwrap();
    }
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    for &v in values {
        out.write_f64::<LittleEndian>(v).unwrap();
    }
    out
}

/// writes an ITK-style transform file: 12 parameters (row-major 3x3 then translation) plus the fixed point
pub fn write_itk_affine(path: &Path, linear_row_major: [f64; 9], translation: [f64; 3]) {
    let mut params = linear_row_major.to_vec();
    params.extend_from_slice(&translation);
    let mut bytes = mat_v4_variable("AffineTransform_double_3_3", 12, 1, &params);
    bytes.extend(mat_v4_variable("fixed", 3, 1, &[1.5, -2.0, 0.25]));
    fs::write(path, bytes).unwrap();
}
