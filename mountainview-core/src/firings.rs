//! Firing events (detected spikes) in Structure of Arrays layout.
//!
//! A firings array has one column per event and at least three rows:
//! primary channel (1-based), timepoint, and cluster label. An optional
//! fourth row carries the peak amplitude. Label `0` means unclassified.

use ndarray::Array2;

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Detected spike events with their cluster labels.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Firings {
    /// Primary channel of each event (1-based, 0 if unknown).
    pub channels: Vec<i32>,
    /// Timepoint of each event.
    pub times: Vec<f64>,
    /// Cluster label of each event.
    pub labels: Vec<i32>,
    /// Peak amplitude of each event (0 if not recorded).
    pub amplitudes: Vec<f64>,
}

impl Firings {
    /// Creates an empty table with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Vec::with_capacity(capacity),
            times: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
            amplitudes: Vec::with_capacity(capacity),
        }
    }

    /// Parses a firings array (rows: channel, time, label, [amplitude]).
    ///
    /// # Errors
    /// Returns [`Error::InvalidFirings`] if the array has fewer than 3 rows.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_array(array: &Array2<f64>) -> Result<Self> {
        if array.nrows() < 3 {
            return Err(Error::InvalidFirings(format!(
                "expected at least 3 rows, got {}",
                array.nrows()
            )));
        }
        let has_amplitude = array.nrows() >= 4;
        let mut firings = Self::with_capacity(array.ncols());
        for col in array.columns() {
            let amplitude = if has_amplitude { col[3] } else { 0.0 };
            firings.push(col[0].round() as i32, col[1], col[2].round() as i32, amplitude);
        }
        Ok(firings)
    }

    /// Converts back to a 4-row firings array.
    #[must_use]
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((4, self.len()), |(row, i)| match row {
            0 => f64::from(self.channels[i]),
            1 => self.times[i],
            2 => f64::from(self.labels[i]),
            _ => self.amplitudes[i],
        })
    }

    /// Pushes a single event.
    pub fn push(&mut self, channel: i32, time: f64, label: i32, amplitude: f64) {
        self.channels.push(channel);
        self.times.push(time);
        self.labels.push(label);
        self.amplitudes.push(amplitude);
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Returns true if there are no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Largest label present (0 if empty).
    #[must_use]
    pub fn k_max(&self) -> i32 {
        self.labels.iter().copied().max().unwrap_or(0).max(0)
    }

    /// Times of all events carrying label `k`, in table order.
    #[must_use]
    pub fn times_for_label(&self, k: i32) -> Vec<f64> {
        self.labels
            .iter()
            .zip(&self.times)
            .filter(|(&label, _)| label == k)
            .map(|(_, &t)| t)
            .collect()
    }

    /// Number of events per label, indexed `0..=k_max`.
    #[must_use]
    pub fn event_counts(&self) -> Vec<usize> {
        let k_max = usize::try_from(self.k_max()).unwrap_or(0);
        let mut counts = vec![0usize; k_max + 1];
        for &label in &self.labels {
            if let Ok(k) = usize::try_from(label) {
                counts[k] += 1;
            }
        }
        counts
    }

    /// Rewrites labels through `label_map` (indexed by old label).
    ///
    /// Labels outside the map are left unchanged.
    pub fn relabel(&mut self, label_map: &[i32]) {
        for label in &mut self.labels {
            if let Some(&mapped) = usize::try_from(*label).ok().and_then(|k| label_map.get(k)) {
                *label = mapped;
            }
        }
    }

    /// Events with `t1 <= time <= t2`.
    #[must_use]
    pub fn filter_time_range(&self, t1: f64, t2: f64) -> Self {
        let mut out = Self::default();
        for i in 0..self.len() {
            let t = self.times[i];
            if t >= t1 && t <= t2 {
                out.push(self.channels[i], t, self.labels[i], self.amplitudes[i]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Firings {
        let array = array![
            [1.0, 2.0, 1.0, 3.0],
            [100.0, 250.0, 400.0, 900.0],
            [1.0, 2.0, 1.0, 3.0],
            [-50.0, -20.0, -45.0, -80.0]
        ];
        Firings::from_array(&array).unwrap()
    }

    #[test]
    fn test_from_array() {
        let firings = sample();
        assert_eq!(firings.len(), 4);
        assert_eq!(firings.k_max(), 3);
        assert_eq!(firings.times_for_label(1), vec![100.0, 400.0]);
        assert_eq!(firings.event_counts(), vec![0, 2, 1, 1]);
        assert_eq!(firings.to_array()[[3, 3]], -80.0);
    }

    #[test]
    fn test_three_row_array_has_zero_amplitudes() {
        let array = array![[1.0], [10.0], [2.0]];
        let firings = Firings::from_array(&array).unwrap();
        assert_eq!(firings.amplitudes, vec![0.0]);
    }

    #[test]
    fn test_too_few_rows_rejected() {
        let array = Array2::<f64>::zeros((2, 5));
        assert!(matches!(
            Firings::from_array(&array),
            Err(Error::InvalidFirings(_))
        ));
    }

    #[test]
    fn test_relabel_and_filter() {
        let mut firings = sample();
        firings.relabel(&[0, 1, 1, 3]);
        assert_eq!(firings.labels, vec![1, 1, 1, 3]);

        let window = firings.filter_time_range(200.0, 400.0);
        assert_eq!(window.times, vec![250.0, 400.0]);
    }
}
