//! # MAT-file reader
//!
//! Minimal reader for MATLAB level 5 MAT-files. Only real numeric arrays are extracted; cell,
//! struct, char and sparse arrays are skipped. Compressed elements (the default since MATLAB 7)
//! are inflated with zlib.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const HEADER_LEN: usize = 128;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

/// Array classes from mxDOUBLE_CLASS to mxUINT64_CLASS are numeric.
const MX_NUMERIC: std::ops::RangeInclusive<u8> = 6..=15;

/// Complex flag in the array flags word.
const FLAG_COMPLEX: u32 = 0x0800;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A real numeric array, with its data in MATLAB's column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatArray {
    pub name: String,
    pub dims: Vec<usize>,
    pub real: Vec<f64>
}

/// The numeric arrays of a MAT-file.
#[derive(Debug, Clone, Default)]
pub struct MatFile {
    arrays: Vec<MatArray>
}

/// Cursor over a byte buffer in the file's byte order.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl MatFile {
    /// Parse a MAT-file from a reader.
    pub fn parse<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::MatFile(format!("read failed: {}", e)))?;

        if bytes.len() < HEADER_LEN {
            return Err(Error::MatFile("file is shorter than the MAT-file header".into()));
        }

        let big_endian = match &bytes[126..128] {
            b"IM" => false,
            b"MI" => true,
            _ => return Err(Error::MatFile("missing endian indicator, not a level 5 MAT-file".into()))
        };

        let mut file = MatFile::default();
        file.parse_elements(&bytes[HEADER_LEN..], big_endian)?;

        Ok(file)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&MatArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    fn parse_elements(&mut self, data: &[u8], big_endian: bool) -> Result<()> {
        let mut cur = Cursor { data, pos: 0, big_endian };

        while cur.remaining() >= 8 {
            let (ty, body) = cur.element()?;

            match ty {
                MI_MATRIX => {
                    if let Some(array) = parse_matrix(body, big_endian)? {
                        self.arrays.push(array);
                    }
                }
                MI_COMPRESSED => {
                    let mut inflated = Vec::new();
                    ZlibDecoder::new(body)
                        .read_to_end(&mut inflated)
                        .map_err(|e| Error::MatFile(format!("bad compressed element: {}", e)))?;
                    self.parse_elements(&inflated, big_endian)?;
                }
                _ => ()
            }
        }

        Ok(())
    }
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn u32_at(&self, bytes: &[u8]) -> u32 {
        if self.big_endian {
            BigEndian::read_u32(bytes)
        }
        else {
            LittleEndian::read_u32(bytes)
        }
    }

    /// Read the next data element, returning its type and body. Handles the small element format
    /// and skips padding to the next 8 byte boundary.
    fn element(&mut self) -> Result<(u32, &'a [u8])> {
        if self.remaining() < 8 {
            return Err(Error::MatFile("truncated element tag".into()));
        }

        let data = self.data;
        let word = self.u32_at(&data[self.pos..self.pos + 4]);

        // Small element: byte count in the upper half, data packed into the tag
        if word >> 16 != 0 {
            let ty = word & 0xffff;
            let len = (word >> 16) as usize;
            if len > 4 {
                return Err(Error::MatFile(format!("small element of {} bytes", len)));
            }
            let body = &data[self.pos + 4..self.pos + 4 + len];
            self.pos += 8;
            return Ok((ty, body));
        }

        let ty = word;
        let len = self.u32_at(&data[self.pos + 4..self.pos + 8]) as usize;
        self.pos += 8;

        if len > self.remaining() {
            return Err(Error::MatFile(format!(
                "element of {} bytes overruns the remaining {}", len, self.remaining()
            )));
        }

        let body = &data[self.pos..self.pos + len];

        // Compressed elements are not padded
        let padded = if ty == MI_COMPRESSED { len } else { (len + 7) & !7 };
        self.pos = (self.pos + padded).min(data.len());

        Ok((ty, body))
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Parse the body of a miMATRIX element. Returns `None` for arrays that are not real numeric.
fn parse_matrix(body: &[u8], big_endian: bool) -> Result<Option<MatArray>> {
    // Empty arrays are written as a zero-length miMATRIX
    if body.is_empty() {
        return Ok(None);
    }

    let mut cur = Cursor { data: body, pos: 0, big_endian };

    let (_, flags) = cur.element()?;
    if flags.len() < 8 {
        return Err(Error::MatFile("array flags too short".into()));
    }
    let flags_word = cur.u32_at(&flags[0..4]);
    let class = (flags_word & 0xff) as u8;

    if !MX_NUMERIC.contains(&class) || flags_word & FLAG_COMPLEX != 0 {
        return Ok(None);
    }

    let (dims_ty, dims_body) = cur.element()?;
    let dims: Vec<usize> = numeric_values(dims_ty, dims_body, big_endian)?
        .into_iter()
        .map(|d| d as usize)
        .collect();

    let (_, name_body) = cur.element()?;
    let name = String::from_utf8_lossy(name_body).trim_end_matches('\0').to_string();

    let (real_ty, real_body) = cur.element()?;
    let real = numeric_values(real_ty, real_body, big_endian)?;

    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::MatFile(format!("{} has oversized dimensions {:?}", name, dims)))?;
    if real.len() != count {
        return Err(Error::MatFile(format!(
            "{} holds {} values but has dimensions {:?}", name, real.len(), dims
        )));
    }

    Ok(Some(MatArray { name, dims, real }))
}

/// Decode the body of a numeric data element into `f64`s.
fn numeric_values(ty: u32, body: &[u8], big_endian: bool) -> Result<Vec<f64>> {
    macro_rules! decode {
        ($size:expr, $read:ident) => {
            body.chunks_exact($size)
                .map(|c| {
                    if big_endian {
                        BigEndian::$read(c) as f64
                    }
                    else {
                        LittleEndian::$read(c) as f64
                    }
                })
                .collect()
        };
    }

    let values: Vec<f64> = match ty {
        MI_INT8 => body.iter().map(|&b| b as i8 as f64).collect(),
        MI_UINT8 => body.iter().map(|&b| b as f64).collect(),
        MI_INT16 => decode!(2, read_i16),
        MI_UINT16 => decode!(2, read_u16),
        MI_INT32 => decode!(4, read_i32),
        MI_UINT32 => decode!(4, read_u32),
        MI_SINGLE => decode!(4, read_f32),
        MI_DOUBLE => decode!(8, read_f64),
        MI_INT64 => decode!(8, read_i64),
        MI_UINT64 => decode!(8, read_u64),
        _ => return Err(Error::MatFile(format!("unsupported data type {}", ty)))
    };

    Ok(values)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn header() -> Vec<u8> {
        let mut h = vec![b' '; HEADER_LEN];
        let text = b"MATLAB 5.0 MAT-file, test";
        h[..text.len()].copy_from_slice(text);
        h[124..126].copy_from_slice(&0x0100u16.to_le_bytes());
        h[126..128].copy_from_slice(b"IM");
        h
    }

    fn tagged(ty: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ty.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        while out.len() % 8 != 0 {
            out.push(0);
        }
        out
    }

    /// A double matrix whose name uses the small element format.
    fn matrix(name: &str, dims: &[i32], values: &[f64]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(tagged(MI_UINT32, &[6, 0, 0, 0, 0, 0, 0, 0]));

        let dims_bytes: Vec<u8> = dims.iter().flat_map(|d| d.to_le_bytes().to_vec()).collect();
        body.extend(tagged(MI_INT32, &dims_bytes));

        assert!(name.len() <= 4);
        let small = (MI_INT8 | ((name.len() as u32) << 16)).to_le_bytes();
        body.extend_from_slice(&small);
        let mut packed = name.as_bytes().to_vec();
        packed.resize(4, 0);
        body.extend(packed);

        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes().to_vec()).collect();
        body.extend(tagged(MI_DOUBLE, &data));

        tagged(MI_MATRIX, &body)
    }

    #[test]
    fn reads_uncompressed_matrix() {
        let mut bytes = header();
        bytes.extend(matrix("R", &[2, 2], &[1.0, 2.0, 3.0, 4.0]));

        let file = MatFile::parse(&bytes[..]).unwrap();
        let r = file.find_by_name("R").unwrap();

        assert_eq!(r.dims, vec![2, 2]);
        assert_eq!(r.real, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(file.find_by_name("T").is_none());
    }

    #[test]
    fn reads_compressed_matrix() {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&matrix("T", &[1, 3], &[-60.0, 0.5, 1.25])).unwrap();
        let compressed = enc.finish().unwrap();

        let mut bytes = header();
        bytes.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
        bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        bytes.extend(compressed);

        let file = MatFile::parse(&bytes[..]).unwrap();
        assert_eq!(file.find_by_name("T").unwrap().real, vec![-60.0, 0.5, 1.25]);
    }

    #[test]
    fn rejects_missing_endian_indicator() {
        let bytes = vec![0u8; HEADER_LEN];
        assert!(matches!(MatFile::parse(&bytes[..]), Err(Error::MatFile(_))));
    }

    #[test]
    fn rejects_short_file() {
        assert!(matches!(MatFile::parse(&b"MATLAB"[..]), Err(Error::MatFile(_))));
    }

    #[test]
    fn rejects_dimensions_whose_product_overflows() {
        let mut body = Vec::new();
        body.extend(tagged(MI_UINT32, &[6, 0, 0, 0, 0, 0, 0, 0]));

        let dims: Vec<u8> = [u32::MAX; 3].iter().flat_map(|d| d.to_le_bytes().to_vec()).collect();
        body.extend(tagged(MI_UINT32, &dims));
        body.extend(tagged(MI_INT8, b"R"));
        body.extend(tagged(MI_DOUBLE, &1.0f64.to_le_bytes()));

        let mut bytes = header();
        bytes.extend(tagged(MI_MATRIX, &body));

        match MatFile::parse(&bytes[..]) {
            Err(Error::MatFile(msg)) => assert!(msg.contains("oversized"), "{}", msg),
            other => panic!("expected a MAT file error, got {:?}", other.map(|_| ()))
        }
    }
}
