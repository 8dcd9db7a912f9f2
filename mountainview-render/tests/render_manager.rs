use mountainview_core::{ArraySource, Error, MultiScaleTimeSeries, Result};
use mountainview_render::{PanelKey, PanelState, RenderConfig, RenderManager};
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(30);

#[allow(clippy::cast_precision_loss)]
fn sine_series(channels: usize, n: usize) -> Arc<MultiScaleTimeSeries> {
    let data = Array2::from_shape_fn((channels, n), |(m, t)| {
        (t as f64 / 17.0 + m as f64).sin() * 0.8
    });
    Arc::new(MultiScaleTimeSeries::from_data(Arc::new(data)).unwrap())
}

fn small_config() -> RenderConfig {
    RenderConfig::new()
        .with_panel_num_points(100)
        .with_pixels_per_point(1)
        .with_max_num_threads(2)
}

#[test]
fn missing_panels_are_blank_then_exact() {
    let mut mgr = RenderManager::new(sine_series(2, 5000), small_config());

    let first = mgr.get_image(0, 199, 1.0, 100, 20);
    assert_eq!(first.panels.len(), 2);
    assert!(first
        .panels
        .iter()
        .all(|p| p.state == PanelState::Blank));
    assert_eq!(mgr.pending_count(), 2);

    assert!(mgr.wait_until_idle(WAIT));
    assert_eq!(mgr.pending_count(), 0);
    assert_eq!(mgr.cached_panel_count(), 2);

    let second = mgr.get_image(0, 199, 1.0, 100, 20);
    assert!(second.is_complete());
    assert_eq!(second.image.dimensions(), (100, 20));
    let drawn = second
        .image
        .pixels()
        .filter(|p| p.0 != [255, 255, 255, 255])
        .count();
    assert!(drawn > 0);
}

#[test]
fn coarse_panel_approximates_finer_one() {
    let config = RenderConfig::new().with_pixels_per_point(1);
    let mut mgr = RenderManager::new(sine_series(1, 40_000), config);

    // 32000 samples over 500 px settles at factor 27; one panel spans
    // 1200 * 27 = 32400 samples.
    let coarse = mgr.get_image(0, 32_000, 1.0, 500, 30);
    assert_eq!(coarse.resolution.unwrap().ds_factor, 27);
    assert_eq!(coarse.panels.len(), 1);
    assert!(mgr.wait_until_idle(WAIT));

    // Zooming in selects factor 9, whose first panel lies inside the
    // cached coarse panel.
    let fine = mgr.get_image(0, 9000, 1.0, 500, 30);
    assert_eq!(fine.resolution.unwrap().ds_factor, 9);
    assert_eq!(fine.panels[0].state, PanelState::Approximate);
    assert!(!fine.is_complete());

    assert!(mgr.wait_until_idle(WAIT));
    let fine = mgr.get_image(0, 9000, 1.0, 500, 30);
    assert!(fine.is_complete());
}

#[test]
fn different_amplitude_is_not_an_ancestor() {
    let config = RenderConfig::new().with_pixels_per_point(1);
    let mut mgr = RenderManager::new(sine_series(1, 40_000), config);
    mgr.get_image(0, 32_000, 1.0, 500, 30);
    assert!(mgr.wait_until_idle(WAIT));

    let fine = mgr.get_image(0, 9000, 2.0, 500, 30);
    assert_eq!(fine.panels[0].state, PanelState::Blank);
}

#[test]
fn panning_away_cancels_pending_panels() {
    let mut mgr = RenderManager::new(sine_series(2, 100_000), small_config());
    mgr.get_image(0, 199, 1.0, 100, 20);
    mgr.get_image(50_000, 50_199, 1.0, 100, 20);
    assert_eq!(mgr.pending_count(), 2);

    assert!(mgr.wait_until_idle(WAIT));
    assert!(!mgr.is_cached(&PanelKey::new(1.0, 1, 100, 0)));
    assert!(!mgr.is_cached(&PanelKey::new(1.0, 1, 100, 1)));
    assert!(mgr.is_cached(&PanelKey::new(1.0, 1, 100, 500)));
    assert!(mgr.is_cached(&PanelKey::new(1.0, 1, 100, 501)));
}

#[test]
fn eviction_keeps_visible_panels() {
    // Each panel is 100 x 10 = 1000 pixels.
    let config = small_config().with_max_cached_pixels(2500);
    let mut mgr = RenderManager::new(sine_series(1, 10_000), config);

    mgr.get_image(0, 199, 1.0, 100, 10);
    assert!(mgr.wait_until_idle(WAIT));
    assert_eq!(mgr.cached_pixel_count(), 2000);

    mgr.get_image(1000, 1199, 1.0, 100, 10);
    assert!(mgr.wait_until_idle(WAIT));

    assert!(mgr.is_cached(&PanelKey::new(1.0, 1, 100, 10)));
    assert!(mgr.is_cached(&PanelKey::new(1.0, 1, 100, 11)));
    assert!(!mgr.is_cached(&PanelKey::new(1.0, 1, 100, 0)));
    assert!(!mgr.is_cached(&PanelKey::new(1.0, 1, 100, 1)));
    assert_eq!(mgr.cached_pixel_count(), 2000);
}

#[test]
fn eviction_below_ceiling_keeps_everything() {
    let mut mgr = RenderManager::new(sine_series(1, 10_000), small_config());
    mgr.get_image(0, 199, 1.0, 100, 10);
    assert!(mgr.wait_until_idle(WAIT));
    mgr.get_image(1000, 1199, 1.0, 100, 10);
    assert!(mgr.wait_until_idle(WAIT));
    assert_eq!(mgr.cached_panel_count(), 4);
}

#[test]
fn clear_drops_cache() {
    let mut mgr = RenderManager::new(sine_series(1, 1000), small_config());
    mgr.get_image(0, 199, 1.0, 100, 10);
    assert!(mgr.wait_until_idle(WAIT));
    assert!(mgr.cached_panel_count() > 0);
    mgr.clear();
    assert_eq!(mgr.cached_panel_count(), 0);
    assert_eq!(mgr.pending_count(), 0);
}

#[test]
fn poll_collects_finished_panels() {
    let mut mgr = RenderManager::new(sine_series(1, 1000), small_config());
    mgr.get_image(0, 99, 1.0, 100, 10);
    let mut added = 0;
    for _ in 0..3000 {
        added += mgr.poll();
        if mgr.pending_count() == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(added, 1);
    assert_eq!(mgr.cached_panel_count(), 1);
}

struct FailingSource;

impl ArraySource for FailingSource {
    fn n1(&self) -> usize {
        1
    }

    fn n2(&self) -> usize {
        1000
    }

    fn read_chunk(&self, _i1: usize, _i2: usize, _size1: usize, _size2: usize) -> Result<Array2<f64>> {
        Err(Error::ReadFailed("device unplugged".to_string()))
    }
}

#[test]
fn failed_panels_are_not_retried() {
    let ms = Array2::<f64>::zeros((1, mountainview_core::multiscale::multiscale_len(1000)));
    let ts = MultiScaleTimeSeries::new(Arc::new(FailingSource), Arc::new(ms)).unwrap();
    let mut mgr = RenderManager::new(Arc::new(ts), small_config());

    let out = mgr.get_image(0, 99, 1.0, 100, 10);
    assert_eq!(out.panels[0].state, PanelState::Blank);
    assert!(mgr.wait_until_idle(WAIT));

    let out = mgr.get_image(0, 99, 1.0, 100, 10);
    assert_eq!(out.panels[0].state, PanelState::Blank);
    assert_eq!(mgr.pending_count(), 0);
    assert_eq!(mgr.cached_panel_count(), 0);
}

struct SlowSource {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ArraySource for SlowSource {
    fn n1(&self) -> usize {
        1
    }

    fn n2(&self) -> usize {
        10_000
    }

    fn read_chunk(&self, _i1: usize, _i2: usize, size1: usize, size2: usize) -> Result<Array2<f64>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Array2::zeros((size1, size2)))
    }
}

#[test]
fn concurrent_reads_stay_within_thread_limit() {
    let peak = Arc::new(AtomicUsize::new(0));
    let source = SlowSource {
        active: Arc::new(AtomicUsize::new(0)),
        peak: Arc::clone(&peak),
    };
    let ms = Array2::<f64>::zeros((1, mountainview_core::multiscale::multiscale_len(10_000)));
    let ts = MultiScaleTimeSeries::new(Arc::new(source), Arc::new(ms)).unwrap();
    let mut mgr = RenderManager::new(Arc::new(ts), small_config());

    // One point per pixel at factor 1: ten panels of 100 points each.
    let out = mgr.get_image(0, 999, 1.0, 1000, 10);
    assert_eq!(out.panels.len(), 10);
    assert!(mgr.wait_until_idle(WAIT));

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= 2, "peak of {peak} concurrent reads exceeds the limit");
    assert_eq!(mgr.cached_panel_count(), 10);
}
