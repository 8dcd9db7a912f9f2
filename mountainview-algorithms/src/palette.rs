//! Colour palettes for clusters and channels.

/// Convert f64 to u8 with clamping to [0, 255].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u8(value: f64) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

/// Mixes `tint` into `color` with weight `strength` in `[0, 1]`, keeping
/// `color`'s alpha.
#[must_use]
pub fn blend(color: [u8; 4], tint: [u8; 4], strength: f64) -> [u8; 4] {
    let s = strength.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| f64_to_u8(f64::from(a) * (1.0 - s) + f64::from(b) * s);
    [
        mix(color[0], tint[0]),
        mix(color[1], tint[1]),
        mix(color[2], tint[2]),
        color[3],
    ]
}

/// Colour assigned to label 0 (unclassified events).
pub const UNCLASSIFIED_COLOR: [u8; 4] = [128, 128, 128, 255];

/// Convert HSV (all components in [0, 1]) to RGBA bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsv_to_rgba(h: f64, s: f64, v: f64) -> [u8; 4] {
    let h6 = (h.rem_euclid(1.0)) * 6.0;
    let sector = h6.floor() as u32 % 6;
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [f64_to_u8(r * 255.0), f64_to_u8(g * 255.0), f64_to_u8(b * 255.0), 255]
}

/// Generates `n` distinct colours.
///
/// Hues step by the golden ratio so neighbouring labels differ strongly;
/// value alternates between two levels to separate near hues further.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn generate_colors(n: usize) -> Vec<[u8; 4]> {
    const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;
    (0..n)
        .map(|i| {
            let h = (0.1 + i as f64 * GOLDEN_RATIO_CONJUGATE).rem_euclid(1.0);
            let v = if i % 2 == 0 { 0.95 } else { 0.75 };
            hsv_to_rgba(h, 0.75, v)
        })
        .collect()
}

/// Colour of cluster `k` in `palette` (labels cycle through the palette).
#[must_use]
pub fn cluster_color(k: i32, palette: &[[u8; 4]]) -> [u8; 4] {
    if k <= 0 || palette.is_empty() {
        return UNCLASSIFIED_COLOR;
    }
    let idx = usize::try_from(k - 1).unwrap_or(0) % palette.len();
    palette[idx]
}

/// Colours for `m` timeseries channels: a short repeating dark cycle that
/// reads well on a white background.
#[must_use]
pub fn channel_colors(m: usize) -> Vec<[u8; 4]> {
    const CYCLE: [[u8; 4]; 4] = [
        [40, 40, 40, 255],
        [30, 70, 150, 255],
        [140, 40, 40, 255],
        [30, 110, 60, 255],
    ];
    (0..m).map(|i| CYCLE[i % CYCLE.len()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgba(0.0, 1.0, 1.0), [255, 0, 0, 255]);
        assert_eq!(hsv_to_rgba(1.0 / 3.0, 1.0, 1.0), [0, 255, 0, 255]);
        assert_eq!(hsv_to_rgba(2.0 / 3.0, 1.0, 1.0), [0, 0, 255, 255]);
        assert_eq!(hsv_to_rgba(0.5, 0.0, 0.5), [128, 128, 128, 255]);
    }

    #[test]
    fn test_generated_colors_distinct_and_stable() {
        let colors = generate_colors(12);
        assert_eq!(colors.len(), 12);
        for i in 0..colors.len() {
            for j in (i + 1)..colors.len() {
                assert_ne!(colors[i], colors[j], "colors {i} and {j} collide");
            }
        }
        assert_eq!(colors, generate_colors(12));
    }

    #[test]
    fn test_cluster_color_cycles() {
        let palette = generate_colors(3);
        assert_eq!(cluster_color(1, &palette), palette[0]);
        assert_eq!(cluster_color(4, &palette), palette[0]);
        assert_eq!(cluster_color(0, &palette), UNCLASSIFIED_COLOR);
        assert_eq!(cluster_color(2, &[]), UNCLASSIFIED_COLOR);
    }

    #[test]
    fn test_channel_colors() {
        let colors = channel_colors(6);
        assert_eq!(colors[0], colors[4]);
        assert_ne!(colors[0], colors[1]);
    }

    #[test]
    fn test_blend() {
        let white = [255, 255, 255, 255];
        assert_eq!(blend(white, [0, 0, 0, 255], 0.0), white);
        assert_eq!(blend(white, [0, 0, 0, 10], 1.0), [0, 0, 0, 255]);
        assert_eq!(blend([200, 100, 0, 128], [0, 0, 0, 255], 0.5), [100, 50, 0, 128]);
    }
}
