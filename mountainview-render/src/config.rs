//! Render cache configuration.

use mountainview_core::{Error, Result};

/// Configuration for [`crate::RenderManager`].
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Downsampled points covered by one full-size panel.
    pub panel_num_points: usize,
    /// Pixel columns drawn per point.
    pub pixels_per_point: u32,
    /// Maximum number of concurrently running panel workers.
    pub max_num_threads: usize,
    /// Cached pixel area above which eviction starts.
    pub max_cached_pixels: u64,
    /// Colour mixed into approximate panels.
    pub approximate_tint: [u8; 4],
    /// Weight of the tint colour in `[0, 1]`.
    pub tint_strength: f32,
    /// Background colour of panels and composed images.
    pub background: [u8; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            panel_num_points: 1200,
            pixels_per_point: 2,
            max_num_threads: 6,
            max_cached_pixels: 20_000_000,
            approximate_tint: [210, 215, 235, 255],
            tint_strength: 0.35,
            background: [255, 255, 255, 255],
        }
    }
}

impl RenderConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of points per panel.
    ///
    /// Values less than 3 are clamped to 3 so the panel can still shrink by
    /// a factor of 3 when zoomed far in.
    #[must_use]
    pub fn with_panel_num_points(mut self, points: usize) -> Self {
        self.panel_num_points = points.max(3);
        self
    }

    /// Sets the pixel columns drawn per point (at least 1).
    #[must_use]
    pub fn with_pixels_per_point(mut self, pixels: u32) -> Self {
        self.pixels_per_point = pixels.max(1);
        self
    }

    /// Sets the worker thread limit.
    ///
    /// Values less than 1 are clamped to 1. Use [`Self::try_with_max_num_threads`]
    /// to surface invalid values as an error instead.
    #[must_use]
    pub fn with_max_num_threads(mut self, threads: usize) -> Self {
        self.max_num_threads = threads.max(1);
        self
    }

    /// Sets the cached pixel ceiling.
    #[must_use]
    pub fn with_max_cached_pixels(mut self, pixels: u64) -> Self {
        self.max_cached_pixels = pixels;
        self
    }

    /// Sets the approximate-panel tint colour and strength.
    #[must_use]
    pub fn with_approximate_tint(mut self, tint: [u8; 4], strength: f32) -> Self {
        self.approximate_tint = tint;
        self.tint_strength = strength.clamp(0.0, 1.0);
        self
    }

    /// Sets the background colour.
    #[must_use]
    pub fn with_background(mut self, background: [u8; 4]) -> Self {
        self.background = background;
        self
    }

    /// Fallible variant of [`Self::with_max_num_threads`].
    ///
    /// # Errors
    /// Returns an error if `threads` is 0.
    pub fn try_with_max_num_threads(mut self, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::ConfigError(
                "max_num_threads must be at least 1".to_string(),
            ));
        }
        self.max_num_threads = threads;
        Ok(self)
    }

    /// Fallible variant of [`Self::with_panel_num_points`].
    ///
    /// # Errors
    /// Returns an error if `points` is less than 3.
    pub fn try_with_panel_num_points(mut self, points: usize) -> Result<Self> {
        if points < 3 {
            return Err(Error::ConfigError(
                "panel_num_points must be at least 3".to_string(),
            ));
        }
        self.panel_num_points = points;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.panel_num_points, 1200);
        assert_eq!(config.pixels_per_point, 2);
        assert_eq!(config.max_num_threads, 6);
    }

    #[test]
    fn test_clamping_builders() {
        let config = RenderConfig::new()
            .with_max_num_threads(0)
            .with_panel_num_points(1)
            .with_pixels_per_point(0)
            .with_approximate_tint([0, 0, 0, 255], 4.0);
        assert_eq!(config.max_num_threads, 1);
        assert_eq!(config.panel_num_points, 3);
        assert_eq!(config.pixels_per_point, 1);
        assert!((config.tint_strength - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_fallible_builders() {
        assert!(RenderConfig::new().try_with_max_num_threads(0).is_err());
        assert!(RenderConfig::new().try_with_panel_num_points(2).is_err());
        assert_eq!(
            RenderConfig::new()
                .try_with_max_num_threads(3)
                .unwrap()
                .max_num_threads,
            3
        );
    }
}
