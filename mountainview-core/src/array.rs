//! Read access to 2D arrays of samples.
//!
//! Timeseries are channel-major: the first index is the channel (M rows),
//! the second is the timepoint (N columns). The backing store can be a
//! memory-mapped file or an in-memory array; callers only see rectangles.

use crate::{Error, Result};
use ndarray::{s, Array2};

/// A source of (channel, timepoint) rectangles.
pub trait ArraySource: Send + Sync {
    /// Number of rows (channels).
    fn n1(&self) -> usize;

    /// Number of columns (timepoints).
    fn n2(&self) -> usize;

    /// Reads rows `[i1, i1 + size1)` and columns `[i2, i2 + size2)`.
    ///
    /// # Errors
    /// Returns [`Error::ReadFailed`] if the rectangle leaves the array bounds
    /// or the backing store cannot be read.
    fn read_chunk(&self, i1: usize, i2: usize, size1: usize, size2: usize) -> Result<Array2<f64>>;
}

/// Checks that a rectangle lies inside an `n1 x n2` array.
///
/// # Errors
/// Returns [`Error::ReadFailed`] describing the offending rectangle.
pub fn check_chunk_bounds(
    n1: usize,
    n2: usize,
    i1: usize,
    i2: usize,
    size1: usize,
    size2: usize,
) -> Result<()> {
    let end1 = i1.checked_add(size1);
    let end2 = i2.checked_add(size2);
    match (end1, end2) {
        (Some(e1), Some(e2)) if e1 <= n1 && e2 <= n2 => Ok(()),
        _ => Err(Error::ReadFailed(format!(
            "chunk rows {i1}+{size1}, cols {i2}+{size2} outside array of shape ({n1}, {n2})"
        ))),
    }
}

impl ArraySource for Array2<f64> {
    fn n1(&self) -> usize {
        self.nrows()
    }

    fn n2(&self) -> usize {
        self.ncols()
    }

    fn read_chunk(&self, i1: usize, i2: usize, size1: usize, size2: usize) -> Result<Array2<f64>> {
        check_chunk_bounds(self.nrows(), self.ncols(), i1, i2, size1, size2)?;
        Ok(self.slice(s![i1..i1 + size1, i2..i2 + size2]).to_owned())
    }
}
