// Reader for MATLAB v4 containers, the format ITK/ANTs use for linear transforms
// (e.g. 0GenericAffine.mat). Each variable is a 20-byte header, a NUL-terminated name,
// then the real (and optionally imaginary) values in column-major order.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use ndarray::{Array2, ShapeBuilder};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

const HEADER_LEN: usize = 20;

/// element class of a MAT v4 variable (the P digit of the type code)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementClass {
    F64,
    F32,
    I32,
    I16,
    U16,
    U8,
}

impl ElementClass {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::F64),
            1 => Some(Self::F32),
            2 => Some(Self::I32),
            3 => Some(Self::I16),
            4 => Some(Self::U16),
            5 => Some(Self::U8),
            _ => None,
        }
    }

    fn byte_size(&self) -> usize {
        match self {
            Self::F64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::I16 | Self::U16 => 2,
            Self::U8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug)]
struct VarHeader {
    endian: Endian,
    class: ElementClass,
    rows: usize,
    cols: usize,
    imaginary: bool,
    name_len: usize,
}

/// a named numeric matrix. Values are widened to f64 regardless of the stored class.
#[derive(Debug, Clone)]
pub struct MatArray {
    pub class: ElementClass,
    pub real: Array2<f64>,
    pub imag: Option<Array2<f64>>,
}

impl MatArray {
    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    /// real values flattened in row-major (C) order
    pub fn row_major_values(&self) -> Vec<f64> {
        self.real.iter().copied().collect()
    }
}

/// all variables of a container, keyed (and therefore ordered) by name
#[derive(Debug, Clone, Default)]
pub struct MatContainer {
    arrays: BTreeMap<String, MatArray>,
}

impl MatContainer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(b"MATLAB") {
            return Err(Error::MalformedContainer(
                "MAT v5 containers are not supported, expected a MAT v4 file".to_string(),
            ));
        }

        let mut cursor = Cursor::new(bytes);
        let mut arrays = BTreeMap::new();

        while (cursor.position() as usize) < bytes.len() {
            let offset = cursor.position() as usize;
            let header = read_header(&mut cursor, offset)?;
            let name = read_name(&mut cursor, header.name_len, offset)?;

            let count = header.rows.checked_mul(header.cols).ok_or_else(|| {
                Error::MalformedContainer(format!("variable '{name}' has an unrepresentable size"))
            })?;
            let parts = if header.imaginary { 2 } else { 1 };
            let remaining = bytes.len() - cursor.position() as usize;
            if count.saturating_mul(header.class.byte_size() * parts) > remaining {
                return Err(Error::MalformedContainer(format!(
                    "variable '{name}' is truncated: expected {} x {} values",
                    header.rows, header.cols
                )));
            }

            let real = read_matrix(&mut cursor, &header, count, &name)?;
            let imag = if header.imaginary {
                Some(read_matrix(&mut cursor, &header, count, &name)?)
            } else {
                None
            };

            if arrays.contains_key(&name) {
                tracing::debug!("duplicate variable '{}' in container, keeping the first", name);
                continue;
            }
            arrays.insert(name, MatArray { class: header.class, real, imag });
        }

        Ok(Self { arrays })
    }

    pub fn get(&self, name: &str) -> Option<&MatArray> {
        self.arrays.get(name)
    }

    /// variables in lexical order of their names
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatArray)> {
        self.arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

fn read_header(cursor: &mut Cursor<&[u8]>, offset: usize) -> Result<VarHeader> {
    let mut raw = [0u8; HEADER_LEN];
    cursor.read_exact(&mut raw).map_err(|_| {
        Error::MalformedContainer(format!("truncated variable header at byte {offset}"))
    })?;

    // the byte order is not stored anywhere else, so it is inferred from the M digit of the
    // type code: 0 for little-endian files, 1 for big-endian ones
    let le = LittleEndian::read_i32(&raw[0..4]);
    let be = BigEndian::read_i32(&raw[0..4]);
    let (endian, type_code) = if (0..1000).contains(&le) {
        (Endian::Little, le)
    } else if (1000..2000).contains(&be) {
        (Endian::Big, be)
    } else {
        return Err(Error::MalformedContainer(format!(
            "unrecognized type code at byte {offset}, not a MAT v4 file"
        )));
    };

    let mut fields = [0i32; 4];
    match endian {
        Endian::Little => LittleEndian::read_i32_into(&raw[4..], &mut fields),
        Endian::Big => BigEndian::read_i32_into(&raw[4..], &mut fields),
    }
    let [rows, cols, imagf, name_len] = fields;

    let reserved = (type_code % 1000) / 100;
    let class_code = (type_code % 100) / 10;
    let kind = type_code % 10;
    if reserved != 0 || kind > 2 {
        return Err(Error::MalformedContainer(format!("unsupported type code {type_code} at byte {offset}")));
    }
    let class = ElementClass::from_code(class_code).ok_or_else(|| {
        Error::MalformedContainer(format!("unknown element class {class_code} at byte {offset}"))
    })?;

    if rows < 0 || cols < 0 || name_len < 1 || !(0..=1).contains(&imagf) {
        return Err(Error::MalformedContainer(format!("invalid variable header at byte {offset}")));
    }

    Ok(VarHeader {
        endian,
        class,
        rows: rows as usize,
        cols: cols as usize,
        imaginary: imagf == 1,
        name_len: name_len as usize,
    })
}

fn read_name(cursor: &mut Cursor<&[u8]>, name_len: usize, offset: usize) -> Result<String> {
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if name_len > remaining {
        return Err(Error::MalformedContainer(format!("truncated variable name at byte {offset}")));
    }
    let mut raw = vec![0u8; name_len];
    cursor.read_exact(&mut raw).map_err(|_| {
        Error::MalformedContainer(format!("truncated variable name at byte {offset}"))
    })?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec())
        .map_err(|_| Error::MalformedContainer(format!("variable name at byte {offset} is not valid UTF-8")))
}

fn read_matrix(cursor: &mut Cursor<&[u8]>, header: &VarHeader, count: usize, name: &str) -> Result<Array2<f64>> {
    let values = match header.endian {
        Endian::Little => read_values::<LittleEndian>(cursor, header.class, count),
        Endian::Big => read_values::<BigEndian>(cursor, header.class, count),
    }
    .map_err(|e| Error::MalformedContainer(format!("failed to read values of '{name}': {e}")))?;

    Array2::from_shape_vec((header.rows, header.cols).f(), values)
        .map_err(|e| Error::MalformedContainer(format!("bad shape for '{name}': {e}")))
}

fn read_values<B: ByteOrder>(reader: &mut impl Read, class: ElementClass, count: usize) -> std::io::Result<Vec<f64>> {
    let values = match class {
        ElementClass::F64 => {
            let mut v = vec![0f64; count];
            reader.read_f64_into::<B>(&mut v)?;
            v
        }
        ElementClass::F32 => {
            let mut v = vec![0f32; count];
            reader.read_f32_into::<B>(&mut v)?;
            v.into_iter().map(f64::from).collect()
        }
        ElementClass::I32 => {
            let mut v = vec![0i32; count];
            reader.read_i32_into::<B>(&mut v)?;
            v.into_iter().map(f64::from).collect()
        }
        ElementClass::I16 => {
            let mut v = vec![0i16; count];
            reader.read_i16_into::<B>(&mut v)?;
            v.into_iter().map(f64::from).collect()
        }
        ElementClass::U16 => {
            let mut v = vec![0u16; count];
            reader.read_u16_into::<B>(&mut v)?;
            v.into_iter().map(f64::from).collect()
        }
        ElementClass::U8 => {
            let mut v = vec![0u8; count];
            reader.read_exact(&mut v)?;
            v.into_iter().map(f64::from).collect()
        }
    };
    Ok(values)
}
