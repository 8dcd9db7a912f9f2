//! `.mda` multi-dimensional array files.
//!
//! Layout (little-endian):
//!
//! ```text
//! i32 data type code | i32 bytes per entry | i32 num dims | dims... | data
//! ```
//!
//! Dimensions are i32 unless the dimension count is negative, in which case
//! `|num dims|` i64 dimensions follow. Data is column-major: the first index
//! varies fastest, so a timeseries of shape (M, N) stores all M channels of
//! timepoint 0 first.

use crate::{Error, Result};
use memmap2::Mmap;
use mountainview_core::array::{check_chunk_bounds, ArraySource};
use ndarray::{Array2, Array3, ShapeBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const MAX_DIMS: usize = 50;

/// Element type of an `.mda` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdaDataType {
    /// Unsigned 8-bit.
    Byte,
    /// 32-bit float.
    Float32,
    /// Signed 16-bit.
    Int16,
    /// Signed 32-bit.
    Int32,
    /// Unsigned 16-bit.
    Uint16,
    /// 64-bit float.
    Float64,
    /// Unsigned 32-bit.
    Uint32,
}

impl MdaDataType {
    /// Type code stored in the header.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            MdaDataType::Byte => -2,
            MdaDataType::Float32 => -3,
            MdaDataType::Int16 => -4,
            MdaDataType::Int32 => -5,
            MdaDataType::Uint16 => -6,
            MdaDataType::Float64 => -7,
            MdaDataType::Uint32 => -8,
        }
    }

    /// Parses a header type code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(MdaDataType::Byte),
            -3 => Some(MdaDataType::Float32),
            -4 => Some(MdaDataType::Int16),
            -5 => Some(MdaDataType::Int32),
            -6 => Some(MdaDataType::Uint16),
            -7 => Some(MdaDataType::Float64),
            -8 => Some(MdaDataType::Uint32),
            _ => None,
        }
    }

    /// Bytes per element.
    #[must_use]
    pub fn num_bytes(self) -> usize {
        match self {
            MdaDataType::Byte => 1,
            MdaDataType::Int16 | MdaDataType::Uint16 => 2,
            MdaDataType::Float32 | MdaDataType::Int32 | MdaDataType::Uint32 => 4,
            MdaDataType::Float64 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            MdaDataType::Byte => f64::from(bytes[0]),
            MdaDataType::Float32 => f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            MdaDataType::Int16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            MdaDataType::Int32 => f64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            MdaDataType::Uint16 => f64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            MdaDataType::Float64 => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
            MdaDataType::Uint32 => f64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn encode<W: Write>(self, value: f64, out: &mut W) -> std::io::Result<()> {
        match self {
            MdaDataType::Byte => out.write_all(&[value.round() as u8]),
            MdaDataType::Float32 => out.write_all(&(value as f32).to_le_bytes()),
            MdaDataType::Int16 => out.write_all(&(value.round() as i16).to_le_bytes()),
            MdaDataType::Int32 => out.write_all(&(value.round() as i32).to_le_bytes()),
            MdaDataType::Uint16 => out.write_all(&(value.round() as u16).to_le_bytes()),
            MdaDataType::Float64 => out.write_all(&value.to_le_bytes()),
            MdaDataType::Uint32 => out.write_all(&(value.round() as u32).to_le_bytes()),
        }
    }
}

/// Parsed `.mda` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdaHeader {
    /// Element type.
    pub data_type: MdaDataType,
    /// Dimensions, first index fastest.
    pub dims: Vec<usize>,
    /// Header length in bytes.
    pub header_size: usize,
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::InvalidFormat("truncated header".to_string()))
}

fn read_i64(bytes: &[u8], offset: usize) -> Result<i64> {
    bytes
        .get(offset..offset + 8)
        .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or_else(|| Error::InvalidFormat("truncated header".to_string()))
}

impl MdaHeader {
    /// Creates a header for an array with the given shape.
    #[must_use]
    pub fn new(data_type: MdaDataType, dims: Vec<usize>) -> Self {
        let wide = dims.iter().any(|&d| i32::try_from(d).is_err());
        let dim_bytes = if wide { 8 } else { 4 };
        let header_size = 12 + dim_bytes * dims.len();
        Self {
            data_type,
            dims,
            header_size,
        }
    }

    /// Parses the header at the start of `bytes`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for unknown types, inconsistent sizes
    /// or truncated headers.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let code = read_i32(bytes, 0)?;
        let data_type = MdaDataType::from_code(code)
            .ok_or_else(|| Error::InvalidFormat(format!("unknown data type code {code}")))?;
        let num_bytes = read_i32(bytes, 4)?;
        if usize::try_from(num_bytes).ok() != Some(data_type.num_bytes()) {
            return Err(Error::InvalidFormat(format!(
                "bytes per entry {num_bytes} does not match {data_type:?}"
            )));
        }
        let num_dims_raw = read_i32(bytes, 8)?;
        let wide = num_dims_raw < 0;
        let num_dims = num_dims_raw.unsigned_abs() as usize;
        if num_dims == 0 || num_dims > MAX_DIMS {
            return Err(Error::InvalidFormat(format!(
                "invalid number of dimensions {num_dims_raw}"
            )));
        }

        let mut dims = Vec::with_capacity(num_dims);
        let mut offset = 12;
        for _ in 0..num_dims {
            let dim = if wide {
                let d = read_i64(bytes, offset)?;
                offset += 8;
                d
            } else {
                let d = read_i32(bytes, offset)?;
                offset += 4;
                i64::from(d)
            };
            let dim = usize::try_from(dim)
                .map_err(|_| Error::InvalidFormat(format!("negative dimension {dim}")))?;
            dims.push(dim);
        }

        let header = Self {
            data_type,
            dims,
            header_size: offset,
        };
        header
            .file_size()
            .ok_or_else(|| Error::InvalidFormat("array size overflows".to_string()))?;
        Ok(header)
    }

    /// Total number of elements (saturating).
    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.checked_num_entries().unwrap_or(usize::MAX)
    }

    fn checked_num_entries(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Bytes needed for header plus data, or `None` if that overflows.
    #[must_use]
    pub fn file_size(&self) -> Option<usize> {
        self.checked_num_entries()?
            .checked_mul(self.data_type.num_bytes())?
            .checked_add(self.header_size)
    }

    /// Shape seen as 2D: 1D arrays are a single row, trailing dimensions
    /// beyond the second fold into the column count.
    #[must_use]
    pub fn shape2(&self) -> (usize, usize) {
        match self.dims.as_slice() {
            [] => (0, 0),
            [n] => (1, *n),
            [n1, rest @ ..] => (
                *n1,
                rest.iter()
                    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                    .unwrap_or(usize::MAX),
            ),
        }
    }

    /// Writes the header.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        let wide = self.header_size == 12 + 8 * self.dims.len() && !self.dims.is_empty();
        let num_dims = i32::try_from(self.dims.len())
            .map_err(|_| Error::InvalidFormat("too many dimensions".to_string()))?;
        let num_bytes = i32::try_from(self.data_type.num_bytes())
            .map_err(|_| Error::InvalidFormat("entry size too large".to_string()))?;
        out.write_all(&self.data_type.code().to_le_bytes())?;
        out.write_all(&num_bytes.to_le_bytes())?;
        out.write_all(&(if wide { -num_dims } else { num_dims }).to_le_bytes())?;
        for &d in &self.dims {
            if wide {
                let d = i64::try_from(d)
                    .map_err(|_| Error::InvalidFormat(format!("dimension {d} too large")))?;
                out.write_all(&d.to_le_bytes())?;
            } else {
                let d = i32::try_from(d)
                    .map_err(|_| Error::InvalidFormat(format!("dimension {d} too large")))?;
                out.write_all(&d.to_le_bytes())?;
            }
        }
        Ok(())
    }
}

/// A memory-mapped `.mda` file.
///
/// Uses memmap2 so large recordings are paged in on demand; implements
/// [`ArraySource`] for the 2D view of the array.
pub struct MdaReader {
    mmap: Mmap,
    path: PathBuf,
    header: MdaHeader,
}

impl std::fmt::Debug for MdaReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdaReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl MdaReader {
    /// Opens and validates an `.mda` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped, the
    /// header is invalid, or the file is shorter than the header declares.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let header = MdaHeader::parse(&mmap)?;
        let expected = header
            .file_size()
            .ok_or_else(|| Error::InvalidFormat("array size overflows".to_string()))?;
        if mmap.len() < expected {
            return Err(Error::InvalidFormat(format!(
                "file is {} bytes but header declares {} (file: {})",
                mmap.len(),
                expected,
                path.as_ref().display()
            )));
        }
        log::debug!(
            "opened {} with dims {:?} ({:?})",
            path.as_ref().display(),
            header.dims,
            header.data_type
        );
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
            header,
        })
    }

    /// Parsed header.
    #[must_use]
    pub fn header(&self) -> &MdaHeader {
        &self.header
    }

    /// Path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Element at flat column-major index `index`.
    fn value_at(&self, index: usize) -> f64 {
        let nb = self.header.data_type.num_bytes();
        let offset = self.header.header_size + index * nb;
        self.header.data_type.decode(&self.mmap[offset..offset + nb])
    }

    /// Reads the whole array as 2D.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the element count overflows.
    pub fn read_array2(&self) -> Result<Array2<f64>> {
        let (n1, n2) = self.header.shape2();
        let len = n1
            .checked_mul(n2)
            .ok_or_else(|| Error::InvalidFormat("array size overflows".to_string()))?;
        let values: Vec<f64> = (0..len).map(|i| self.value_at(i)).collect();
        Array2::from_shape_vec((n1, n2).f(), values)
            .map_err(|e| Error::InvalidFormat(format!("array shape: {e}")))
    }
}

impl ArraySource for MdaReader {
    fn n1(&self) -> usize {
        self.header.shape2().0
    }

    fn n2(&self) -> usize {
        self.header.shape2().1
    }

    fn read_chunk(
        &self,
        i1: usize,
        i2: usize,
        size1: usize,
        size2: usize,
    ) -> mountainview_core::Result<Array2<f64>> {
        let (n1, n2) = self.header.shape2();
        check_chunk_bounds(n1, n2, i1, i2, size1, size2)?;
        Ok(Array2::from_shape_fn((size1, size2), |(i, j)| {
            self.value_at((i1 + i) + n1 * (i2 + j))
        }))
    }
}

/// Writer for `.mda` arrays.
pub struct MdaWriter;

impl MdaWriter {
    /// Writes a 2D array.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn write_array2<P: AsRef<Path>>(
        path: P,
        array: &Array2<f64>,
        data_type: MdaDataType,
    ) -> Result<()> {
        let header = MdaHeader::new(data_type, vec![array.nrows(), array.ncols()]);
        let mut writer = BufWriter::new(File::create(path)?);
        header.write(&mut writer)?;
        // Column-major: iterate timepoints, then channels.
        for col in array.columns() {
            for &v in col {
                data_type.encode(v, &mut writer)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes a 3D array.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn write_array3<P: AsRef<Path>>(
        path: P,
        array: &Array3<f64>,
        data_type: MdaDataType,
    ) -> Result<()> {
        let (d0, d1, d2) = array.dim();
        let header = MdaHeader::new(data_type, vec![d0, d1, d2]);
        let mut writer = BufWriter::new(File::create(path)?);
        header.write(&mut writer)?;
        for k in 0..d2 {
            for j in 0..d1 {
                for i in 0..d0 {
                    data_type.encode(array[[i, j, k]], &mut writer)?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }
}
