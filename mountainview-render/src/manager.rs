//! Level-of-detail render cache.
//!
//! [`RenderManager::get_image`] composes a view from fixed-width panels.
//! Cached panels are drawn as-is. Missing panels are scheduled on background
//! workers and, in the meantime, stretched from a coarser cached panel that
//! covers the same time range (tinted so the user can tell), or left blank.
//! Finished panels are collected by [`RenderManager::poll`].

use crate::config::RenderConfig;
use crate::panel::{Panel, PanelKey, PanelState, PanelStyle};
use crate::worker::{spawn_panel_worker, PanelJob, PanelMessage};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use mountainview_algorithms::palette::{blend, channel_colors};
use mountainview_core::MultiScaleTimeSeries;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Downsampling factor and panel geometry chosen for a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Downsampling factor (a power of 3).
    pub ds_factor: u64,
    /// Points per panel.
    pub panel_num_points: usize,
    /// Panel width in pixels.
    pub panel_width: u32,
}

/// One panel of a composed image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelPlacement {
    /// Panel identity.
    pub key: PanelKey,
    /// How the panel was drawn.
    pub state: PanelState,
}

/// A composed view.
#[derive(Clone, Debug)]
pub struct RenderedImage {
    /// The composed pixels.
    pub image: RgbaImage,
    /// Resolution used, or `None` for an empty request.
    pub resolution: Option<Resolution>,
    /// Panels covering the view, left to right.
    pub panels: Vec<PanelPlacement>,
}

impl RenderedImage {
    /// Whether every panel was drawn from an exact cached panel.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.panels.iter().all(|p| p.state == PanelState::Exact)
    }
}

struct CachedPanel {
    panel: Arc<Panel>,
    last_used: u64,
}

struct RunningWorker {
    worker_id: u64,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Clone, Copy)]
struct VisibleRange {
    t1: i64,
    t2: i64,
    amp_factor: f64,
}

/// Caches rendered panels of one timeseries and renders missing ones on
/// background threads.
pub struct RenderManager {
    timeseries: Arc<MultiScaleTimeSeries>,
    config: RenderConfig,
    style: Arc<PanelStyle>,
    cache: HashMap<PanelKey, CachedPanel>,
    running: HashMap<PanelKey, RunningWorker>,
    retiring: Vec<JoinHandle<()>>,
    queued: VecDeque<PanelKey>,
    queued_set: HashSet<PanelKey>,
    failed: HashSet<PanelKey>,
    tx: Sender<PanelMessage>,
    rx: Receiver<PanelMessage>,
    next_worker_id: u64,
    clock: u64,
    visible: Option<VisibleRange>,
}

impl RenderManager {
    /// Creates a manager with the default channel colours and a panel height
    /// of 1 pixel; the height follows the first [`Self::get_image`] call.
    #[must_use]
    pub fn new(timeseries: Arc<MultiScaleTimeSeries>, config: RenderConfig) -> Self {
        let style = PanelStyle {
            pixels_per_point: config.pixels_per_point.max(1),
            height: 1,
            channel_colors: channel_colors(timeseries.num_channels()),
            background: config.background,
        };
        let (tx, rx) = mpsc::channel();
        Self {
            timeseries,
            config,
            style: Arc::new(style),
            cache: HashMap::new(),
            running: HashMap::new(),
            retiring: Vec::new(),
            queued: VecDeque::new(),
            queued_set: HashSet::new(),
            failed: HashSet::new(),
            tx,
            rx,
            next_worker_id: 0,
            clock: 0,
            visible: None,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The timeseries being rendered.
    #[must_use]
    pub fn timeseries(&self) -> &Arc<MultiScaleTimeSeries> {
        &self.timeseries
    }

    /// Picks the downsampling factor and panel size for viewing `[t1, t2]`
    /// across `width` pixels.
    ///
    /// The factor grows by 3 while there are more than 3 downsampled points
    /// per pixel, up to the coarsest stored level. When zoomed in to fewer
    /// than 1/3 point per pixel, panels shrink to a third of the configured
    /// number of points.
    #[must_use]
    pub fn choose_resolution(&self, t1: i64, t2: i64, width: u32) -> Resolution {
        let max_ds = self.timeseries.max_downsample_factor();
        #[allow(clippy::cast_precision_loss)]
        let mut density = (t2 - t1).max(1) as f64 / f64::from(width.max(1));
        let mut ds_factor = 1;
        while density > 3.0 && ds_factor < max_ds {
            ds_factor *= 3;
            density /= 3.0;
        }
        let mut panel_num_points = self.config.panel_num_points.max(1);
        if density < 1.0 / 3.0 && panel_num_points >= 3 {
            panel_num_points /= 3;
        }
        let ppp = self.style.pixels_per_point;
        let panel_width = u32::try_from(panel_num_points)
            .unwrap_or(u32::MAX)
            .saturating_mul(ppp);
        Resolution {
            ds_factor,
            panel_num_points,
            panel_width,
        }
    }

    /// Composes the view `[t1, t2]` at `amp_factor` into a `width` x `height`
    /// image.
    ///
    /// Never blocks on rendering: missing panels are scheduled and drawn
    /// approximately or left blank. Changing `height` clears the cache.
    pub fn get_image(
        &mut self,
        t1: i64,
        t2: i64,
        amp_factor: f64,
        width: u32,
        height: u32,
    ) -> RenderedImage {
        let background = Rgba(self.config.background);
        let mut image = RgbaImage::from_pixel(width, height, background);
        if width == 0 || height == 0 || t2 <= t1 {
            return RenderedImage {
                image,
                resolution: None,
                panels: Vec::new(),
            };
        }
        if height != self.style.height {
            self.set_panel_height(height);
        }

        let resolution = self.choose_resolution(t1, t2, width);
        let ppp = self.style.pixels_per_point;
        let origin = PanelKey::new(amp_factor, resolution.ds_factor, resolution.panel_width, 0);
        let (_, span) = origin.time_range(ppp);
        let keys: Vec<PanelKey> = (t1.div_euclid(span)..=t2.div_euclid(span))
            .map(|index| {
                PanelKey::new(amp_factor, resolution.ds_factor, resolution.panel_width, index)
            })
            .collect();

        self.clock += 1;
        self.visible = Some(VisibleRange { t1, t2, amp_factor });
        let needed: HashSet<PanelKey> = keys.iter().copied().collect();
        self.cancel_unneeded(&needed);

        #[allow(clippy::cast_precision_loss)]
        let scale = f64::from(width) / (t2 - t1) as f64;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let to_x = |t: i64| ((t - t1) as f64 * scale).round() as i64;

        let mut panels = Vec::with_capacity(keys.len());
        for key in keys {
            let (a, b) = key.time_range(ppp);
            let x = to_x(a);
            let target_width = u32::try_from((to_x(b) - x).max(1)).unwrap_or(u32::MAX);

            let state = if let Some(cached) = self.cache.get_mut(&key) {
                cached.last_used = self.clock;
                draw_scaled(&mut image, &cached.panel.image, x, target_width);
                PanelState::Exact
            } else {
                self.schedule(key);
                match self.approximate(key) {
                    Some(approx) => {
                        draw_scaled(&mut image, &approx, x, target_width);
                        PanelState::Approximate
                    }
                    None => PanelState::Blank,
                }
            };
            panels.push(PanelPlacement { key, state });
        }

        self.start_queued();
        self.evict();
        RenderedImage {
            image,
            resolution: Some(resolution),
            panels,
        }
    }

    /// Collects finished panels, starts queued work and evicts.
    ///
    /// Returns the number of panels added to the cache.
    pub fn poll(&mut self) -> usize {
        let mut added = 0;
        while let Ok(msg) = self.rx.try_recv() {
            if self.handle_message(msg) {
                added += 1;
            }
        }
        self.start_queued();
        self.evict();
        added
    }

    /// Blocks until no panel is queued or running, or `timeout` elapses.
    ///
    /// Returns `true` if the manager became idle.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.start_queued();
        while !self.running.is_empty() || !self.queued.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(msg) => {
                    self.handle_message(msg);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
            self.start_queued();
        }
        self.evict();
        true
    }

    /// Drops all cached panels and cancels outstanding work.
    pub fn clear(&mut self) {
        self.cancel_all();
        self.cache.clear();
        self.failed.clear();
    }

    /// Sets per-channel colours. Clears the cache.
    pub fn set_channel_colors(&mut self, colors: Vec<[u8; 4]>) {
        let mut style = (*self.style).clone();
        style.channel_colors = colors;
        self.style = Arc::new(style);
        self.clear();
    }

    /// Sets the panel height. Clears the cache.
    pub fn set_panel_height(&mut self, height: u32) {
        log::debug!("panel height {} -> {height}, clearing cache", self.style.height);
        let mut style = (*self.style).clone();
        style.height = height.max(1);
        self.style = Arc::new(style);
        self.clear();
    }

    /// Number of cached panels.
    #[must_use]
    pub fn cached_panel_count(&self) -> usize {
        self.cache.len()
    }

    /// Total pixel area of cached panels.
    #[must_use]
    pub fn cached_pixel_count(&self) -> u64 {
        self.cache.values().map(|c| c.panel.num_pixels()).sum()
    }

    /// Panels queued or being rendered.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.running.len() + self.queued.len()
    }

    /// Whether `key` is cached.
    #[must_use]
    pub fn is_cached(&self, key: &PanelKey) -> bool {
        self.cache.contains_key(key)
    }

    /// The cached panel for `key`, if any.
    #[must_use]
    pub fn cached_panel(&self, key: &PanelKey) -> Option<Arc<Panel>> {
        self.cache.get(key).map(|c| Arc::clone(&c.panel))
    }

    fn schedule(&mut self, key: PanelKey) {
        if self.running.contains_key(&key)
            || self.failed.contains(&key)
            || !self.queued_set.insert(key)
        {
            return;
        }
        self.queued.push_back(key);
    }

    fn active_workers(&mut self) -> usize {
        self.retiring.retain(|handle| !handle.is_finished());
        self.running.len() + self.retiring.len()
    }

    fn start_queued(&mut self) {
        let limit = self.config.max_num_threads.max(1);
        while self.active_workers() < limit {
            let Some(key) = self.queued.pop_front() else {
                break;
            };
            self.queued_set.remove(&key);
            let worker_id = self.next_worker_id;
            self.next_worker_id += 1;
            let cancel = Arc::new(AtomicBool::new(false));
            let job = PanelJob {
                worker_id,
                key,
                timeseries: Arc::clone(&self.timeseries),
                style: Arc::clone(&self.style),
                cancel: Arc::clone(&cancel),
            };
            match spawn_panel_worker(job, self.tx.clone()) {
                Ok(handle) => {
                    self.running.insert(
                        key,
                        RunningWorker {
                            worker_id,
                            cancel,
                            handle,
                        },
                    );
                }
                Err(e) => {
                    log::warn!("failed to start panel worker for {key:?}: {e}");
                    self.failed.insert(key);
                }
            }
        }
    }

    /// Returns `true` if a panel was added to the cache.
    fn handle_message(&mut self, msg: PanelMessage) -> bool {
        match msg {
            PanelMessage::Finished {
                worker_id,
                key,
                panel,
            } => {
                if !self.take_running(key, worker_id) {
                    log::debug!("dropping stale panel {key:?} from worker {worker_id}");
                    return false;
                }
                self.cache.insert(
                    key,
                    CachedPanel {
                        panel: Arc::from(panel),
                        last_used: self.clock,
                    },
                );
                true
            }
            PanelMessage::Failed {
                worker_id,
                key,
                error,
            } => {
                if self.take_running(key, worker_id) {
                    log::warn!("giving up on panel {key:?}: {error}");
                    self.failed.insert(key);
                }
                false
            }
        }
    }

    fn take_running(&mut self, key: PanelKey, worker_id: u64) -> bool {
        match self.running.get(&key) {
            Some(worker) if worker.worker_id == worker_id => {
                if let Some(worker) = self.running.remove(&key) {
                    self.retiring.push(worker.handle);
                }
                true
            }
            _ => false,
        }
    }

    fn cancel_unneeded(&mut self, needed: &HashSet<PanelKey>) {
        self.queued.retain(|key| needed.contains(key));
        self.queued_set.retain(|key| needed.contains(key));
        let stale: Vec<PanelKey> = self
            .running
            .keys()
            .filter(|key| !needed.contains(*key))
            .copied()
            .collect();
        for key in stale {
            if let Some(worker) = self.running.remove(&key) {
                log::debug!("cancelling panel worker {} for {key:?}", worker.worker_id);
                worker.cancel.store(true, Ordering::Relaxed);
                self.retiring.push(worker.handle);
            }
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_unneeded(&HashSet::new());
    }

    /// Stretches the part of the finest cached ancestor that covers `key`.
    fn approximate(&self, key: PanelKey) -> Option<RgbaImage> {
        let ppp = self.style.pixels_per_point;
        let (a, b) = key.time_range(ppp);
        let (ancestor_key, ancestor) = self
            .cache
            .iter()
            .filter(|(k, _)| {
                let (ka, kb) = k.time_range(ppp);
                **k != key
                    && k.same_amplitude(&key)
                    && k.ds_factor >= key.ds_factor
                    && ka <= a
                    && b <= kb
            })
            .min_by_key(|(k, _)| (k.ds_factor, k.panel_width))?;

        let (ka, kb) = ancestor_key.time_range(ppp);
        let src = &ancestor.panel.image;
        let src_w = i64::from(src.width());
        let x0 = ((a - ka) * src_w / (kb - ka)).clamp(0, src_w - 1);
        let x1 = ((b - ka) * src_w + (kb - ka) - 1) / (kb - ka);
        let x1 = x1.clamp(x0 + 1, src_w);
        let cropped = imageops::crop_imm(
            src,
            u32::try_from(x0).ok()?,
            0,
            u32::try_from(x1 - x0).ok()?,
            src.height(),
        )
        .to_image();
        let mut approx = imageops::resize(&cropped, key.panel_width, src.height(), FilterType::Triangle);
        let strength = f64::from(self.config.tint_strength);
        for pixel in approx.pixels_mut() {
            pixel.0 = blend(pixel.0, self.config.approximate_tint, strength);
        }
        Some(approx)
    }

    /// Evicts least recently used panels that are off screen or drawn at a
    /// different amplitude, once the cache exceeds its pixel ceiling, until
    /// it is back under half the ceiling.
    fn evict(&mut self) {
        let mut total = self.cached_pixel_count();
        if total <= self.config.max_cached_pixels {
            return;
        }
        let target = self.config.max_cached_pixels / 2;
        let ppp = self.style.pixels_per_point;
        let visible = self.visible;
        let mut candidates: Vec<(u64, PanelKey)> = self
            .cache
            .iter()
            .filter(|(key, _)| match visible {
                Some(v) => {
                    !(key.intersects(v.t1, v.t2, ppp)
                        && key.amp_factor().to_bits() == v.amp_factor.to_bits())
                }
                None => true,
            })
            .map(|(key, cached)| (cached.last_used, *key))
            .collect();
        candidates.sort_unstable_by_key(|&(last_used, key)| (last_used, key.ds_factor, key.index));

        let mut evicted = 0;
        for (_, key) in candidates {
            if total <= target {
                break;
            }
            if let Some(cached) = self.cache.remove(&key) {
                total -= cached.panel.num_pixels();
                evicted += 1;
            }
        }
        log::debug!("evicted {evicted} panels, {total} cached pixels remain");
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Draws `src` stretched to `target_width` columns with its left edge at
/// column `x` of `dest`, cropping whatever falls outside `dest` before
/// resizing.
fn draw_scaled(dest: &mut RgbaImage, src: &RgbaImage, x: i64, target_width: u32) {
    let (src_w, src_h) = src.dimensions();
    if src_w == 0 || src_h == 0 || target_width == 0 {
        return;
    }
    let tw = i64::from(target_width);
    let visible_start = x.max(0);
    let visible_end = (x + tw).min(i64::from(dest.width()));
    if visible_start >= visible_end {
        return;
    }

    let sw = i64::from(src_w);
    let sx0 = ((visible_start - x) * sw / tw).clamp(0, sw - 1);
    let sx1 = (((visible_end - x) * sw + tw - 1) / tw).clamp(sx0 + 1, sw);
    let px0 = x + sx0 * tw / sw;
    let px1 = x + sx1 * tw / sw;
    let (Ok(crop_x), Ok(crop_w), Ok(out_w)) = (
        u32::try_from(sx0),
        u32::try_from(sx1 - sx0),
        u32::try_from((px1 - px0).max(1)),
    ) else {
        return;
    };

    let cropped = imageops::crop_imm(src, crop_x, 0, crop_w, src_h).to_image();
    if cropped.dimensions() == (out_w, dest.height()) {
        imageops::replace(dest, &cropped, px0, 0);
    } else {
        let resized = imageops::resize(&cropped, out_w, dest.height(), FilterType::Triangle);
        imageops::replace(dest, &resized, px0, 0);
    }
}
