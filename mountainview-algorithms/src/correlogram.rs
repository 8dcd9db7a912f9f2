//! Cross-correlogram computation over spike trains.
//!
//! Time differences are collected with a two-pointer sliding window over
//! sorted spike times. When the expected number of differences exceeds the
//! configured budget, the reference train is thinned with a deterministic
//! pseudo-random generator before the window pass.

use mountainview_core::{Error, Firings, Result};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for correlogram computation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrelogramConfig {
    /// Maximum absolute time difference (timepoints).
    pub max_dt: f64,
    /// Budget on the estimated number of differences per correlogram.
    pub max_est_data_size: usize,
    /// Seed for the subsampling generator.
    pub seed: u64,
}

impl Default for CorrelogramConfig {
    fn default() -> Self {
        Self {
            max_dt: 1500.0, // 50 ms at 30 kHz
            max_est_data_size: 1_000_000,
            seed: 0x5EED_CC00,
        }
    }
}

impl CorrelogramConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum time difference.
    #[must_use]
    pub fn with_max_dt(mut self, max_dt: f64) -> Self {
        self.max_dt = max_dt;
        self
    }

    /// Sets the estimated output budget.
    #[must_use]
    pub fn with_max_est_data_size(mut self, size: usize) -> Self {
        self.max_est_data_size = size;
        self
    }

    /// Sets the subsampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fallible variant of [`Self::with_max_dt`].
    ///
    /// # Errors
    /// Returns an error if `max_dt` is negative or not finite.
    pub fn try_with_max_dt(mut self, max_dt: f64) -> Result<Self> {
        if !max_dt.is_finite() || max_dt < 0.0 {
            return Err(Error::ConfigError(format!(
                "max_dt must be finite and non-negative, got {max_dt}"
            )));
        }
        self.max_dt = max_dt;
        Ok(self)
    }
}

/// Time differences between two clusters' events.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Correlogram {
    /// Reference cluster label.
    pub k1: i32,
    /// Target cluster label.
    pub k2: i32,
    /// Differences `t2 - t1`, each within `[-max_dt, max_dt]`.
    pub data: Vec<f64>,
}

impl Correlogram {
    /// Returns true for an auto-correlogram.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.k1 == self.k2
    }
}

/// Collects `t2 - t1` for all pairs with `|t2 - t1| <= max_dt`.
///
/// Inputs need not be sorted. With `exclude_matches`, a pair at the same
/// index and the same time is skipped, which removes the zero-lag self pairs
/// of an auto-correlogram.
#[must_use]
pub fn compute_cc_data(times1: &[f64], times2: &[f64], max_dt: f64, exclude_matches: bool) -> Vec<f64> {
    let mut ret = Vec::new();
    if times1.is_empty() || times2.is_empty() {
        return ret;
    }
    let mut times1 = times1.to_vec();
    let mut times2 = times2.to_vec();
    times1.sort_by(f64::total_cmp);
    times2.sort_by(f64::total_cmp);

    let mut i1 = 0usize;
    for (i2, &t2) in times2.iter().enumerate() {
        while i1 + 1 < times1.len() && times1[i1] < t2 - max_dt {
            i1 += 1;
        }
        let mut j1 = i1;
        while j1 < times1.len() && times1[j1] <= t2 + max_dt {
            let is_match = exclude_matches && j1 == i2 && (times1[j1] - t2).abs() < f64::EPSILON;
            if !is_match && times1[j1] >= t2 - max_dt {
                ret.push(t2 - times1[j1]);
            }
            j1 += 1;
        }
    }
    ret
}

/// Expected number of differences for two uniformly spread trains:
/// `n1 * n2 * (2 * max_dt + 1) / duration`.
///
/// A zero-length recording falls back to `n1 * n2`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn estimate_data_size(n1: usize, n2: usize, max_dt: f64, duration: f64) -> f64 {
    let pairs = n1 as f64 * n2 as f64;
    if duration <= 0.0 {
        return pairs;
    }
    pairs * (2.0 * max_dt + 1.0) / duration
}

/// `SplitMix64`; enough for reproducible thinning.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    #[allow(clippy::cast_precision_loss)]
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Keeps each time with probability `fraction`.
#[must_use]
pub fn subsample(times: &[f64], fraction: f64, seed: u64) -> Vec<f64> {
    if fraction >= 1.0 {
        return times.to_vec();
    }
    let mut rng = SplitMix64(seed);
    times
        .iter()
        .copied()
        .filter(|_| rng.next_f64() < fraction)
        .collect()
}

/// Correlogram data for one pair, thinned to the configured budget.
#[allow(clippy::cast_precision_loss)]
fn budgeted_cc_data(
    times1: &[f64],
    times2: &[f64],
    auto: bool,
    duration: f64,
    config: &CorrelogramConfig,
) -> Vec<f64> {
    let est = estimate_data_size(times1.len(), times2.len(), config.max_dt, duration);
    let budget = config.max_est_data_size as f64;
    if est <= budget {
        return compute_cc_data(times1, times2, config.max_dt, auto);
    }

    let frac = budget / est;
    log::debug!(
        "correlogram estimate {est:.0} exceeds budget {budget:.0}; keeping fraction {frac:.4}"
    );
    if auto {
        // Both sides shrink together, so the pair count scales by frac^2.
        let kept = subsample(times2, frac.sqrt(), config.seed);
        compute_cc_data(&kept, &kept, config.max_dt, true)
    } else {
        let kept = subsample(times2, frac, config.seed);
        compute_cc_data(times1, &kept, config.max_dt, false)
    }
}

fn times_by_label(firings: &Firings) -> Vec<Vec<f64>> {
    let k_max = usize::try_from(firings.k_max()).unwrap_or(0);
    let mut out = vec![Vec::new(); k_max + 1];
    for (&label, &t) in firings.labels.iter().zip(&firings.times) {
        if let Ok(k) = usize::try_from(label) {
            out[k].push(t);
        }
    }
    out
}

fn recording_duration(firings: &Firings) -> f64 {
    let lo = firings.times.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = firings.times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi > lo {
        hi - lo
    } else {
        0.0
    }
}

/// Computes correlograms for the ordered label pairs in `pairs`.
///
/// Labels absent from `firings` produce empty correlograms.
#[must_use]
pub fn compute_correlograms_for_pairs(
    firings: &Firings,
    pairs: &[(i32, i32)],
    config: &CorrelogramConfig,
) -> Vec<Correlogram> {
    let by_label = times_by_label(firings);
    let duration = recording_duration(firings);
    let empty: Vec<f64> = Vec::new();
    let lookup = |k: i32| {
        usize::try_from(k)
            .ok()
            .and_then(|k| by_label.get(k))
            .unwrap_or(&empty)
    };

    pairs
        .par_iter()
        .map(|&(k1, k2)| Correlogram {
            k1,
            k2,
            data: budgeted_cc_data(lookup(k1), lookup(k2), k1 == k2, duration, config),
        })
        .collect()
}

/// Auto-correlograms for labels `1..=k_max`.
#[must_use]
pub fn compute_auto_correlograms(firings: &Firings, config: &CorrelogramConfig) -> Vec<Correlogram> {
    let pairs: Vec<(i32, i32)> = (1..=firings.k_max()).map(|k| (k, k)).collect();
    compute_correlograms_for_pairs(firings, &pairs, config)
}

/// Cross-correlograms of cluster `k` against every label `1..=k_max`.
#[must_use]
pub fn compute_cross_correlograms(
    firings: &Firings,
    k: i32,
    config: &CorrelogramConfig,
) -> Vec<Correlogram> {
    let pairs: Vec<(i32, i32)> = (1..=firings.k_max()).map(|k2| (k, k2)).collect();
    compute_correlograms_for_pairs(firings, &pairs, config)
}

/// Full correlogram matrix over `labels`, row-major by `(k1, k2)`.
#[must_use]
pub fn compute_correlogram_matrix(
    firings: &Firings,
    labels: &[i32],
    config: &CorrelogramConfig,
) -> Vec<Correlogram> {
    let pairs: Vec<(i32, i32)> = labels
        .iter()
        .flat_map(|&k1| labels.iter().map(move |&k2| (k1, k2)))
        .collect();
    compute_correlograms_for_pairs(firings, &pairs, config)
}
