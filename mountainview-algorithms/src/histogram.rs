//! Fixed-width histogram binning.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counts of values in equal-width bins over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram {
    /// Lower edge of the first bin.
    pub min: f64,
    /// Upper edge of the last bin.
    pub max: f64,
    /// Count per bin.
    pub counts: Vec<u64>,
    /// Values below `min`.
    pub underflow: u64,
    /// Values above `max`.
    pub overflow: u64,
}

impl Histogram {
    /// Bins `values` into `num_bins` equal bins over `[min, max]`.
    ///
    /// A value equal to `max` lands in the last bin. Non-finite values are
    /// ignored.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_values(values: &[f64], min: f64, max: f64, num_bins: usize) -> Self {
        let mut hist = Self {
            min,
            max,
            counts: vec![0; num_bins],
            underflow: 0,
            overflow: 0,
        };
        if num_bins == 0 || max <= min {
            return hist;
        }
        let width = (max - min) / num_bins as f64;
        for &v in values {
            if !v.is_finite() {
                continue;
            }
            if v < min {
                hist.underflow += 1;
            } else if v > max {
                hist.overflow += 1;
            } else {
                let bin = (((v - min) / width) as usize).min(num_bins - 1);
                hist.counts[bin] += 1;
            }
        }
        hist
    }

    /// Histogram over `[-half_width, half_width]` with bins of `bin_size`.
    ///
    /// The bin count is rounded up so the bins cover the whole range;
    /// used for correlograms.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn symmetric(values: &[f64], half_width: f64, bin_size: f64) -> Self {
        if bin_size <= 0.0 || half_width <= 0.0 {
            return Self::from_values(values, -half_width, half_width, 0);
        }
        let num_bins = ((2.0 * half_width) / bin_size).ceil().max(1.0) as usize;
        Self::from_values(values, -half_width, half_width, num_bins)
    }

    /// Number of bins.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    /// Width of each bin.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_width(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        (self.max - self.min) / self.counts.len() as f64
    }

    /// Centres of all bins.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_centers(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..self.counts.len())
            .map(|i| self.min + (i as f64 + 0.5) * width)
            .collect()
    }

    /// Largest bin count.
    #[must_use]
    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Number of binned values (excluding under/overflow).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basic_binning() {
        let hist = Histogram::from_values(&[0.0, 0.5, 1.0, 2.5, 4.0, -1.0, 5.0], 0.0, 4.0, 4);
        assert_eq!(hist.counts, vec![2, 1, 1, 1]);
        assert_eq!(hist.underflow, 1);
        assert_eq!(hist.overflow, 1);
        assert_eq!(hist.total(), 5);
        assert_eq!(hist.max_count(), 2);
    }

    #[test]
    fn test_symmetric_centres() {
        let hist = Histogram::symmetric(&[-9.0, 0.0, 9.5], 10.0, 5.0);
        assert_eq!(hist.num_bins(), 4);
        assert_relative_eq!(hist.bin_width(), 5.0);
        assert_eq!(hist.bin_centers(), vec![-7.5, -2.5, 2.5, 7.5]);
        assert_eq!(hist.counts, vec![1, 0, 1, 1]);
    }

    #[test]
    fn test_degenerate_ranges() {
        let hist = Histogram::from_values(&[1.0], 1.0, 1.0, 10);
        assert_eq!(hist.total(), 0);
        let hist = Histogram::symmetric(&[1.0], 10.0, 0.0);
        assert_eq!(hist.num_bins(), 0);
        assert_relative_eq!(hist.bin_width(), 0.0);
    }

    #[test]
    fn test_nan_ignored() {
        let hist = Histogram::from_values(&[f64::NAN, 0.5], 0.0, 1.0, 2);
        assert_eq!(hist.counts, vec![0, 1]);
    }
}
