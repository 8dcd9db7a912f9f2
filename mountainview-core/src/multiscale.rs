//! Multi-scale min/max envelopes over a channel-major timeseries.
//!
//! The multi-scale array stores, for every downsampling factor
//! `f = 3, 9, 27, ...` up to the smallest power of 3 covering the whole
//! series, a block of `ceil(N/f)` minima followed by a block of `ceil(N/f)`
//! maxima. Level `3f` is derived from level `f` by reducing consecutive
//! triples, so every level is aligned to the start of the series.
//!
//! ```text
//! | min@3 | max@3 | min@9 | max@9 | ... | min@F | max@F |
//! ```

use std::sync::Arc;

use ndarray::{s, Array2, ArrayView2};

use crate::array::ArraySource;
use crate::{Error, Result};

/// Timepoints read per chunk when building the first level.
///
/// Must stay a multiple of 3 so chunk boundaries fall on triple boundaries.
const BUILD_CHUNK_SIZE: usize = 59_049;

/// Returns the least `3^k` that is `>= n` (`0` and `1` both map to `1`).
#[must_use]
pub fn smallest_power_of_3_larger_than(n: u64) -> u64 {
    let mut ret = 1u64;
    while ret < n {
        ret = ret.saturating_mul(3);
    }
    ret
}

/// Returns true if `n` is `3^k` for some `k >= 0`.
#[must_use]
pub fn is_power_of_3(n: u64) -> bool {
    if n == 0 {
        return false;
    }
    let mut v = n;
    while v % 3 == 0 {
        v /= 3;
    }
    v == 1
}

/// Number of envelope points at `factor` for a series of `n` timepoints.
#[must_use]
pub fn level_len(n: usize, factor: u64) -> usize {
    let factor = usize::try_from(factor).unwrap_or(usize::MAX);
    n.div_ceil(factor.max(1))
}

/// Column offset of the min block for `factor` inside the multi-scale array.
#[must_use]
pub fn level_offset(n: usize, factor: u64) -> usize {
    let mut offset = 0usize;
    let mut g = 3u64;
    while g < factor {
        offset = offset.saturating_add(2 * level_len(n, g));
        g = match g.checked_mul(3) {
            Some(next) => next,
            None => break,
        };
    }
    offset
}

/// Total number of columns of the multi-scale array for `n` timepoints.
#[must_use]
pub fn multiscale_len(n: usize) -> usize {
    let max_factor = smallest_power_of_3_larger_than(n as u64);
    let mut total = 0usize;
    let mut f = 3u64;
    while f <= max_factor {
        total += 2 * level_len(n, f);
        f = match f.checked_mul(3) {
            Some(next) => next,
            None => break,
        };
    }
    total
}

/// Per-channel minima and maxima over a window, shape `(M, width)` each.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMax {
    /// Minimum envelope.
    pub min: Array2<f64>,
    /// Maximum envelope.
    pub max: Array2<f64>,
}

impl MinMax {
    /// Creates a zero-filled envelope.
    #[must_use]
    pub fn zeros(channels: usize, width: usize) -> Self {
        Self {
            min: Array2::zeros((channels, width)),
            max: Array2::zeros((channels, width)),
        }
    }

    /// Number of channels.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.min.nrows()
    }

    /// Number of envelope points per channel.
    #[must_use]
    pub fn len(&self) -> usize {
        self.min.ncols()
    }

    /// Returns true if the envelope has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.ncols() == 0
    }
}

/// Reduces consecutive triples of an envelope; the last triple may be short.
fn reduce_triples(mins: ArrayView2<'_, f64>, maxs: ArrayView2<'_, f64>) -> MinMax {
    let channels = mins.nrows();
    let len = mins.ncols();
    let out_len = len.div_ceil(3);
    let mut out = MinMax::zeros(channels, out_len);

    for j in 0..out_len {
        let a = 3 * j;
        let b = (a + 3).min(len);
        for ch in 0..channels {
            out.min[[ch, j]] = mins
                .slice(s![ch, a..b])
                .fold(f64::INFINITY, |acc, &v| acc.min(v));
            out.max[[ch, j]] = maxs
                .slice(s![ch, a..b])
                .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        }
    }
    out
}

fn write_level(out: &mut Array2<f64>, offset: usize, level: &MinMax) {
    let len = level.len();
    out.slice_mut(s![.., offset..offset + len]).assign(&level.min);
    out.slice_mut(s![.., offset + len..offset + 2 * len])
        .assign(&level.max);
}

/// Builds the multi-scale envelope array for `source`.
///
/// The first level is computed from the raw data in aligned chunks; every
/// coarser level is reduced from the previous one in memory.
///
/// # Errors
/// Returns an error if reading the source fails.
pub fn build_multiscale(source: &dyn ArraySource) -> Result<Array2<f64>> {
    let channels = source.n1();
    let n = source.n2();
    let total = multiscale_len(n);
    let mut out = Array2::zeros((channels, total));
    if total == 0 {
        return Ok(out);
    }

    let mut level = MinMax::zeros(channels, level_len(n, 3));
    let mut t = 0usize;
    while t < n {
        let size = BUILD_CHUNK_SIZE.min(n - t);
        let chunk = source.read_chunk(0, t, channels, size)?;
        let reduced = reduce_triples(chunk.view(), chunk.view());
        let j0 = t / 3;
        level
            .min
            .slice_mut(s![.., j0..j0 + reduced.len()])
            .assign(&reduced.min);
        level
            .max
            .slice_mut(s![.., j0..j0 + reduced.len()])
            .assign(&reduced.max);
        t += size;
    }

    let max_factor = smallest_power_of_3_larger_than(n as u64);
    let mut factor = 3u64;
    write_level(&mut out, level_offset(n, factor), &level);
    while factor < max_factor {
        level = reduce_triples(level.min.view(), level.max.view());
        factor *= 3;
        write_level(&mut out, level_offset(n, factor), &level);
    }

    log::debug!(
        "built multi-scale envelope: {channels} channels, {n} timepoints, {total} columns"
    );
    Ok(out)
}

/// A timeseries paired with its multi-scale min/max envelope.
#[derive(Clone)]
pub struct MultiScaleTimeSeries {
    data: Arc<dyn ArraySource>,
    multiscale: Arc<dyn ArraySource>,
}

impl std::fmt::Debug for MultiScaleTimeSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiScaleTimeSeries")
            .field("channels", &self.data.n1())
            .field("timepoints", &self.data.n2())
            .field("multiscale_columns", &self.multiscale.n2())
            .finish()
    }
}

impl MultiScaleTimeSeries {
    /// Pairs a timeseries with a previously built multi-scale array.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the multi-scale array does not have
    /// the layout expected for `data`.
    pub fn new(data: Arc<dyn ArraySource>, multiscale: Arc<dyn ArraySource>) -> Result<Self> {
        let expected = (data.n1(), multiscale_len(data.n2()));
        let actual = (multiscale.n1(), multiscale.n2());
        if expected != actual {
            return Err(Error::ShapeMismatch { expected, actual });
        }
        Ok(Self { data, multiscale })
    }

    /// Builds the multi-scale envelope in memory.
    ///
    /// # Errors
    /// Returns an error if reading `data` fails.
    pub fn from_data(data: Arc<dyn ArraySource>) -> Result<Self> {
        let multiscale = build_multiscale(data.as_ref())?;
        Self::new(data, Arc::new(multiscale))
    }

    /// Number of channels (M).
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.data.n1()
    }

    /// Number of raw timepoints (N).
    #[must_use]
    pub fn num_timepoints(&self) -> usize {
        self.data.n2()
    }

    /// Coarsest stored downsampling factor.
    #[must_use]
    pub fn max_downsample_factor(&self) -> u64 {
        smallest_power_of_3_larger_than(self.data.n2() as u64)
    }

    /// Returns the envelope for downsampled indices `[t1, t2]` at `ds_factor`.
    ///
    /// Indices outside `[0, ceil(N/ds_factor))` are filled with zeros.
    ///
    /// # Errors
    /// Fails if `ds_factor` is not a stored power of 3, if `t2 < t1`, or if the
    /// underlying read fails. No partial envelope is returned on failure.
    pub fn get_data(&self, t1: i64, t2: i64, ds_factor: u64) -> Result<MinMax> {
        if !is_power_of_3(ds_factor) {
            log::warn!("get_data: downsampling factor {ds_factor} is not a power of 3");
            return Err(Error::InvalidDownsampleFactor(ds_factor));
        }
        let max = self.max_downsample_factor();
        if ds_factor > max {
            log::warn!("get_data: downsampling factor {ds_factor} exceeds {max}");
            return Err(Error::DownsampleFactorTooLarge {
                factor: ds_factor,
                max,
            });
        }
        if t2 < t1 {
            return Err(Error::InvalidRange { t1, t2 });
        }

        let len = i64::try_from(level_len(self.num_timepoints(), ds_factor))
            .map_err(|_| Error::InvalidRange { t1, t2 })?;
        let width = t2
            .checked_sub(t1)
            .and_then(|d| d.checked_add(1))
            .and_then(|w| usize::try_from(w).ok())
            .ok_or(Error::InvalidRange { t1, t2 })?;

        if t1 >= 0 && t2 < len {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let start = t1 as usize;
            return self.read_level(start, width, ds_factor).inspect_err(|e| {
                log::warn!("get_data: failed reading [{t1}, {t2}] at factor {ds_factor}: {e}");
            });
        }

        let mut out = MinMax::zeros(self.num_channels(), width);
        let a = t1.max(0);
        let b = t2.min(len - 1);
        if a <= b {
            let inner = self.get_data(a, b, ds_factor)?;
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let offset = (a - t1) as usize;
            let w = inner.len();
            out.min
                .slice_mut(s![.., offset..offset + w])
                .assign(&inner.min);
            out.max
                .slice_mut(s![.., offset..offset + w])
                .assign(&inner.max);
        }
        Ok(out)
    }

    fn read_level(&self, start: usize, width: usize, ds_factor: u64) -> Result<MinMax> {
        let channels = self.num_channels();
        if ds_factor == 1 {
            let chunk = self.data.read_chunk(0, start, channels, width)?;
            return Ok(MinMax {
                min: chunk.clone(),
                max: chunk,
            });
        }
        let n = self.num_timepoints();
        let offset_min = level_offset(n, ds_factor);
        let offset_max = offset_min + level_len(n, ds_factor);
        let min = self
            .multiscale
            .read_chunk(0, offset_min + start, channels, width)?;
        let max = self
            .multiscale
            .read_chunk(0, offset_max + start, channels, width)?;
        Ok(MinMax { min, max })
    }

    /// Global minimum and maximum over all channels, taken from the
    /// coarsest level.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn amplitude_range(&self) -> Result<(f64, f64)> {
        let n = self.num_timepoints();
        if n == 0 || self.num_channels() == 0 {
            return Ok((0.0, 0.0));
        }
        let factor = self.max_downsample_factor();
        let len = i64::try_from(level_len(n, factor)).unwrap_or(i64::MAX);
        let env = self.get_data(0, len - 1, factor)?;
        let lo = env.min.fold(f64::INFINITY, |acc, &v| acc.min(v));
        let hi = env.max.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        Ok((lo, hi))
    }
}
