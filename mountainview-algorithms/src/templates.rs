//! Cluster templates: mean waveform clips per label.

use mountainview_core::{ArraySource, Error, Firings, Result};
use ndarray::{s, Array2, Array3};
use rayon::prelude::*;

/// Computes the mean clip of every cluster `1..=k_max`.
///
/// Returns an array of shape `(M, clip_size, K)`; slot `k - 1` holds the
/// template of label `k`. A clip starts at `round(t) - clip_size / 2`;
/// events whose clip leaves the recording are skipped and clusters with no
/// usable events are all zeros.
///
/// # Errors
/// Returns [`Error::ConfigError`] for a zero clip size, or the first read
/// error encountered.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn compute_templates(
    source: &dyn ArraySource,
    firings: &Firings,
    clip_size: usize,
) -> Result<Array3<f64>> {
    if clip_size == 0 {
        return Err(Error::ConfigError("clip_size must be at least 1".to_string()));
    }
    let channels = source.n1();
    let n = source.n2() as i64;
    let k_max = usize::try_from(firings.k_max()).unwrap_or(0);
    let half = (clip_size / 2) as i64;

    let sums: Vec<Result<(Array2<f64>, usize)>> = (1..=k_max)
        .into_par_iter()
        .map(|k| {
            let mut sum = Array2::<f64>::zeros((channels, clip_size));
            let mut count = 0usize;
            for (&label, &t) in firings.labels.iter().zip(&firings.times) {
                if usize::try_from(label).ok() != Some(k) {
                    continue;
                }
                let start = t.round() as i64 - half;
                if start < 0 || start + clip_size as i64 > n {
                    continue;
                }
                #[allow(clippy::cast_sign_loss)]
                let clip = source.read_chunk(0, start as usize, channels, clip_size)?;
                sum += &clip;
                count += 1;
            }
            Ok((sum, count))
        })
        .collect();

    let mut templates = Array3::<f64>::zeros((channels, clip_size, k_max));
    for (i, result) in sums.into_iter().enumerate() {
        let (sum, count) = result.inspect_err(|e| {
            log::warn!("template computation for cluster {} failed: {e}", i + 1);
        })?;
        if count > 0 {
            templates
                .slice_mut(s![.., .., i])
                .assign(&(sum / count as f64));
        }
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[allow(clippy::cast_precision_loss)]
    fn recording() -> Array2<f64> {
        Array2::from_shape_fn((2, 100), |(m, t)| (t as f64) * if m == 0 { 1.0 } else { -1.0 })
    }

    #[test]
    fn test_mean_clip() {
        let data = recording();
        let mut firings = Firings::default();
        firings.push(1, 20.0, 1, 0.0);
        firings.push(1, 30.0, 1, 0.0);
        firings.push(2, 50.0, 2, 0.0);

        let templates = compute_templates(&data, &firings, 5).unwrap();
        assert_eq!(templates.dim(), (2, 5, 2));
        // Clips start at 18 and 28; the centre sample averages 20 and 30.
        assert_relative_eq!(templates[[0, 2, 0]], 25.0);
        assert_relative_eq!(templates[[1, 2, 0]], -25.0);
        assert_relative_eq!(templates[[0, 0, 1]], 48.0);
    }

    #[test]
    fn test_edge_events_skipped() {
        let data = recording();
        let mut firings = Firings::default();
        firings.push(1, 1.0, 1, 0.0);
        firings.push(1, 99.0, 1, 0.0);
        firings.push(1, 40.0, 2, 0.0);
        let templates = compute_templates(&data, &firings, 5).unwrap();
        assert!(templates.slice(s![.., .., 0]).iter().all(|&v| v == 0.0));
        assert_relative_eq!(templates[[0, 2, 1]], 40.0);
    }

    #[test]
    fn test_zero_clip_rejected() {
        let data = recording();
        let firings = Firings::default();
        assert!(compute_templates(&data, &firings, 0).is_err());
    }
}
