//! Panels: fixed-width tiles of the rendered timeseries.
//!
//! A panel is identified by its amplitude factor, downsampling factor, pixel
//! width and index. Panel `index` covers downsampled points
//! `[index * P, (index + 1) * P)` where `P = panel_width / pixels_per_point`,
//! i.e. raw timepoints `[index * P * ds, (index + 1) * P * ds)`.

use image::{Rgba, RgbaImage};
use mountainview_core::{MinMax, MultiScaleTimeSeries, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Identifies one cached panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PanelKey {
    amp_bits: u64,
    /// Downsampling factor (a power of 3).
    pub ds_factor: u64,
    /// Panel width in pixels.
    pub panel_width: u32,
    /// Panel position along the time axis.
    pub index: i64,
}

impl PanelKey {
    /// Creates a key. The amplitude factor is compared bitwise.
    #[must_use]
    pub fn new(amp_factor: f64, ds_factor: u64, panel_width: u32, index: i64) -> Self {
        Self {
            amp_bits: amp_factor.to_bits(),
            ds_factor,
            panel_width,
            index,
        }
    }

    /// Vertical amplitude scaling this panel was drawn with.
    #[must_use]
    pub fn amp_factor(&self) -> f64 {
        f64::from_bits(self.amp_bits)
    }

    /// Whether both keys were drawn with the same amplitude factor.
    #[must_use]
    pub fn same_amplitude(&self, other: &Self) -> bool {
        self.amp_bits == other.amp_bits
    }

    /// Downsampled points covered by the panel.
    #[must_use]
    pub fn num_points(&self, pixels_per_point: u32) -> i64 {
        i64::from(self.panel_width / pixels_per_point.max(1))
    }

    /// Half-open raw timepoint range `[start, end)` covered by the panel.
    #[must_use]
    pub fn time_range(&self, pixels_per_point: u32) -> (i64, i64) {
        #[allow(clippy::cast_possible_wrap)]
        let span = self.num_points(pixels_per_point) * self.ds_factor as i64;
        (self.index * span, (self.index + 1) * span)
    }

    /// Whether the panel overlaps the raw range `[t1, t2]`.
    #[must_use]
    pub fn intersects(&self, t1: i64, t2: i64, pixels_per_point: u32) -> bool {
        let (a, b) = self.time_range(pixels_per_point);
        a <= t2 && t1 < b
    }
}

/// How a panel in a composed image was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelState {
    /// Drawn from the exact cached panel.
    Exact,
    /// Stretched from a coarser cached panel and tinted.
    Approximate,
    /// Nothing cached yet; left as background.
    Blank,
}

/// A rendered panel.
#[derive(Clone, Debug)]
pub struct Panel {
    /// Pixels, `panel_width` by panel height.
    pub image: RgbaImage,
    /// Envelope the panel was drawn from.
    pub envelope: MinMax,
}

impl Panel {
    /// Pixel area of the panel image.
    #[must_use]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.image.width()) * u64::from(self.image.height())
    }
}

/// Drawing parameters shared by every panel of one render manager.
#[derive(Clone, Debug)]
pub struct PanelStyle {
    /// Pixel columns per point.
    pub pixels_per_point: u32,
    /// Panel height in pixels.
    pub height: u32,
    /// Per-channel colours, cycled if shorter than the channel count.
    pub channel_colors: Vec<[u8; 4]>,
    /// Background colour.
    pub background: [u8; 4],
}

fn cancelled(cancel: &AtomicBool) -> bool {
    cancel.load(Ordering::Relaxed)
}

/// Renders one panel.
///
/// Each channel gets a horizontal band of `height / M` pixels. A value `v` is
/// drawn at `center - v * amp_factor * band / 2`, so with `amp_factor = 1` a
/// value of 1.0 reaches the band's edge. Every point becomes a vertical
/// segment spanning its min and max, extended to meet the previous point.
///
/// Returns `Ok(None)` if `cancel` was raised while rendering.
///
/// # Errors
/// Returns an error if reading the envelope fails.
pub fn render_panel(
    ts: &MultiScaleTimeSeries,
    key: PanelKey,
    style: &PanelStyle,
    cancel: &AtomicBool,
) -> Result<Option<Panel>> {
    if cancelled(cancel) {
        return Ok(None);
    }
    let points = key.num_points(style.pixels_per_point);
    let first = key.index * points;
    let envelope = ts.get_data(first, first + points - 1, key.ds_factor)?;
    if cancelled(cancel) {
        return Ok(None);
    }

    let width = key.panel_width;
    let height = style.height.max(1);
    let mut image = RgbaImage::from_pixel(width, height, Rgba(style.background));
    let channels = envelope.num_channels();
    if channels == 0 {
        return Ok(Some(Panel { image, envelope }));
    }

    #[allow(clippy::cast_precision_loss)]
    let band = f64::from(height) / channels as f64;
    let scale = key.amp_factor() * band / 2.0;
    let max_y = i64::from(height) - 1;
    #[allow(clippy::cast_possible_truncation)]
    let to_y = |center: f64, v: f64| -> i64 { ((center - v * scale).round() as i64).clamp(0, max_y) };

    for ch in 0..channels {
        if cancelled(cancel) {
            return Ok(None);
        }
        let color = if style.channel_colors.is_empty() {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba(style.channel_colors[ch % style.channel_colors.len()])
        };
        #[allow(clippy::cast_precision_loss)]
        let center = (ch as f64 + 0.5) * band;
        let mut prev: Option<(i64, i64)> = None;
        for p in 0..envelope.len() {
            let mut top = to_y(center, envelope.max[[ch, p]]);
            let mut bottom = to_y(center, envelope.min[[ch, p]]);
            let segment = (top, bottom);
            if let Some((prev_top, prev_bottom)) = prev {
                top = top.min(prev_bottom);
                bottom = bottom.max(prev_top);
            }
            prev = Some(segment);

            #[allow(clippy::cast_possible_truncation)]
            let x0 = p as u32 * style.pixels_per_point;
            for x in x0..(x0 + style.pixels_per_point).min(width) {
                for y in top..=bottom {
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let y = y as u32;
                    image.put_pixel(x, y, color);
                }
            }
        }
    }
    Ok(Some(Panel { image, envelope }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::sync::Arc;

    fn style(height: u32) -> PanelStyle {
        PanelStyle {
            pixels_per_point: 2,
            height,
            channel_colors: vec![[255, 0, 0, 255], [0, 0, 255, 255]],
            background: [255, 255, 255, 255],
        }
    }

    #[test]
    fn test_key_ranges() {
        let key = PanelKey::new(1.0, 9, 20, 2);
        assert_eq!(key.num_points(2), 10);
        assert_eq!(key.time_range(2), (180, 270));
        assert!(key.intersects(0, 180, 2));
        assert!(!key.intersects(270, 300, 2));

        let negative = PanelKey::new(1.0, 1, 20, -1);
        assert_eq!(negative.time_range(2), (-10, 0));
    }

    #[test]
    fn test_amp_factor_round_trips_bits() {
        let key = PanelKey::new(0.125, 3, 10, 0);
        assert!((key.amp_factor() - 0.125).abs() < f64::EPSILON);
        assert!(key.same_amplitude(&PanelKey::new(0.125, 27, 30, 4)));
        assert!(!key.same_amplitude(&PanelKey::new(0.25, 3, 10, 0)));
    }

    #[test]
    fn test_render_draws_each_channel_in_its_band() {
        let data = Array2::from_shape_fn((2, 40), |(m, _)| if m == 0 { 1.0 } else { -1.0 });
        let ts = MultiScaleTimeSeries::from_data(Arc::new(data)).unwrap();
        let key = PanelKey::new(1.0, 1, 20, 0);
        let cancel = AtomicBool::new(false);
        let panel = render_panel(&ts, key, &style(40), &cancel).unwrap().unwrap();

        assert_eq!(panel.image.dimensions(), (20, 40));
        assert_eq!(panel.envelope.len(), 10);
        // Channel 0 (value 1.0) sits at the top edge of band [0, 20).
        assert_eq!(panel.image.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(panel.image.get_pixel(0, 10).0, [255, 255, 255, 255]);
        // Channel 1 (value -1.0) sits at the bottom edge of band [20, 40).
        assert_eq!(panel.image.get_pixel(5, 39).0, [0, 0, 255, 255]);
        assert_eq!(panel.image.get_pixel(5, 30).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_render_joins_consecutive_points() {
        let data = Array2::from_shape_fn((1, 4), |(_, t)| if t % 2 == 0 { 0.8 } else { -0.8 });
        let ts = MultiScaleTimeSeries::from_data(Arc::new(data)).unwrap();
        let key = PanelKey::new(1.0, 1, 8, 0);
        let cancel = AtomicBool::new(false);
        let panel = render_panel(&ts, key, &style(20), &cancel).unwrap().unwrap();
        // Point 1 jumps from +0.8 to -0.8, so its column covers the centre row.
        assert_eq!(panel.image.get_pixel(2, 10).0, [255, 0, 0, 255]);
        // Point 0 has no predecessor; the centre row stays empty.
        assert_eq!(panel.image.get_pixel(0, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_render_beyond_data_is_flat() {
        let data = Array2::from_elem((1, 5), 0.9);
        let ts = MultiScaleTimeSeries::from_data(Arc::new(data)).unwrap();
        let key = PanelKey::new(1.0, 1, 20, 3);
        let cancel = AtomicBool::new(false);
        let panel = render_panel(&ts, key, &style(20), &cancel).unwrap().unwrap();
        assert!(panel.envelope.max.iter().all(|&v| v == 0.0));
        assert_eq!(panel.image.get_pixel(7, 10).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_cancelled_render_returns_none() {
        let data = Array2::<f64>::zeros((1, 10));
        let ts = MultiScaleTimeSeries::from_data(Arc::new(data)).unwrap();
        let cancel = AtomicBool::new(true);
        let result = render_panel(&ts, PanelKey::new(1.0, 1, 10, 0), &style(10), &cancel);
        assert!(result.unwrap().is_none());
    }
}
