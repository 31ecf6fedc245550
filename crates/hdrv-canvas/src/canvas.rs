//! The canvas engine.
//!
//! [`Canvas`] holds what the viewer currently shows: the image, an optional
//! reference, the requested channel group and the [`DisplayConfig`]. It is
//! owned by the interactive thread. Everything expensive runs on the pool
//! against a snapshot of that state, so the interactive thread never waits.
//!
//! Statistics are cached per (image, group, reference, metric). Display
//! settings such as exposure or gamma do not touch the cache because the
//! statistics describe pre-tonemap values.

use std::collections::HashMap;
use std::sync::Arc;

use hdrv_core::{Channel, Image, Result};
use hdrv_task::{Lazy, Task, ThreadPool};
use tracing::debug;

use crate::compose::{channels_from_images, composite_pixel, resolve_group};
use crate::config::{validate_gamma, DisplayConfig};
use crate::metric::Metric;
use crate::stats::{compute_canvas_statistics, CanvasStatistics};
use crate::tonemap::Tonemap;

/// Lazily computed statistics of one canvas state.
pub type StatisticsCell = Lazy<Arc<CanvasStatistics>>;

/// Identity of a statistics cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatisticsKey {
    /// Id of the displayed image.
    pub image: usize,
    /// Resolved channel group.
    pub group: String,
    /// Reference id and metric, when comparing.
    pub reference: Option<(usize, Metric)>,
}

/// Display state and derived data of the image viewer.
pub struct Canvas {
    pool: ThreadPool,
    config: DisplayConfig,
    image: Option<Arc<Image>>,
    reference: Option<Arc<Image>>,
    requested_group: String,
    statistics: HashMap<StatisticsKey, Arc<StatisticsCell>>,
}

impl Canvas {
    /// Creates an empty canvas computing on `pool`.
    pub fn new(pool: ThreadPool) -> Self {
        Self::with_config(pool, DisplayConfig::default())
    }

    /// Creates an empty canvas with initial display settings.
    pub fn with_config(pool: ThreadPool, config: DisplayConfig) -> Self {
        Self {
            pool,
            config,
            image: None,
            reference: None,
            requested_group: String::new(),
            statistics: HashMap::new(),
        }
    }

    /// Current display settings.
    pub fn config(&self) -> DisplayConfig {
        self.config
    }

    /// Exposure in stops.
    pub fn set_exposure(&mut self, exposure: f32) {
        self.config.exposure = exposure;
    }

    /// Offset added after exposure.
    pub fn set_offset(&mut self, offset: f32) {
        self.config.offset = offset;
    }

    /// Gamma of the gamma tonemap. Must be positive and finite.
    pub fn set_gamma(&mut self, gamma: f32) -> Result<()> {
        validate_gamma(gamma)?;
        self.config.gamma = gamma;
        Ok(())
    }

    /// Tonemapping operator.
    pub fn set_tonemap(&mut self, tonemap: Tonemap) {
        self.config.tonemap = tonemap;
    }

    /// Comparison metric.
    pub fn set_metric(&mut self, metric: Metric) {
        self.config.metric = metric;
    }

    /// Clamp displayed values to `[0, 1]`.
    pub fn set_clip_to_ldr(&mut self, clip: bool) {
        self.config.clip_to_ldr = clip;
    }

    /// Displayed image.
    pub fn image(&self) -> Option<&Arc<Image>> {
        self.image.as_ref()
    }

    /// Replaces the displayed image.
    pub fn set_image(&mut self, image: Option<Arc<Image>>) {
        self.image = image;
    }

    /// Reference image.
    pub fn reference(&self) -> Option<&Arc<Image>> {
        self.reference.as_ref()
    }

    /// Replaces the reference image.
    pub fn set_reference(&mut self, reference: Option<Arc<Image>>) {
        self.reference = reference;
    }

    /// Requested channel group.
    pub fn requested_group(&self) -> &str {
        &self.requested_group
    }

    /// Selects the channel group to display.
    pub fn set_requested_group(&mut self, group: impl Into<String>) {
        self.requested_group = group.into();
    }

    /// The group actually shown: the requested one if the image has it, the
    /// image's first group otherwise.
    pub fn effective_group(&self) -> Option<String> {
        let image = self.image.as_ref()?;
        resolve_group(image, &self.requested_group).map(|g| g.name.clone())
    }

    /// Cache key of the current state.
    pub fn statistics_key(&self) -> Option<StatisticsKey> {
        let image = self.image.as_ref()?;
        Some(StatisticsKey {
            image: image.id(),
            group: self.effective_group()?,
            reference: self.reference.as_ref().map(|r| (r.id(), self.config.metric)),
        })
    }

    /// Statistics of the current state, starting their computation if needed.
    ///
    /// Returns `None` without an image. Entries of other states stay cached,
    /// so switching back and forth never recomputes.
    pub fn canvas_statistics(&mut self, priority: i32) -> Option<Arc<StatisticsCell>> {
        let key = self.statistics_key()?;
        let cell = match self.statistics.get(&key) {
            Some(cell) => Arc::clone(cell),
            None => {
                let cell = Arc::new(self.statistics_cell(&key)?);
                debug!(image = key.image, group = %key.group, reference = ?key.reference, "new statistics entry");
                self.statistics.insert(key, Arc::clone(&cell));
                cell
            }
        };
        cell.compute(priority);
        Some(cell)
    }

    fn statistics_cell(&self, key: &StatisticsKey) -> Option<StatisticsCell> {
        let image = self.image.clone()?;
        let reference = self.reference.clone();
        let group = key.group.clone();
        let metric = self.config.metric;
        let pool = self.pool.clone();
        Some(Lazy::new(self.pool.clone(), move |priority| {
            compute_canvas_statistics(&pool, Arc::clone(&image), reference.clone(), &group, metric, priority)
        }))
    }

    /// Marks every cached entry stale. The next request recomputes.
    pub fn invalidate_statistics(&self) {
        for cell in self.statistics.values() {
            cell.invalidate();
        }
    }

    /// Drops every cache entry that involves image `id`.
    pub fn forget_image(&mut self, id: usize) {
        self.statistics
            .retain(|key, _| key.image != id && key.reference.is_none_or(|(reference, _)| reference != id));
    }

    /// Number of cached statistics entries.
    pub fn cached_statistics(&self) -> usize {
        self.statistics.len()
    }

    /// Composited values at pixel `(x, y)`, named by channel.
    ///
    /// Empty without an image or outside it.
    pub fn pixel_values(&self, x: usize, y: usize) -> Result<Vec<(String, f32)>> {
        match &self.image {
            Some(image) => composite_pixel(
                image,
                self.reference.as_deref(),
                &self.requested_group,
                self.config.metric,
                x,
                y,
            ),
            None => Ok(Vec::new()),
        }
    }

    fn composited(&self, priority: i32) -> Option<Task<Vec<Channel>>> {
        let image = self.image.clone()?;
        Some(channels_from_images(
            &self.pool,
            image,
            self.reference.clone(),
            &self.requested_group,
            self.config.metric,
            priority,
        ))
    }

    /// Interleaved RGBA `f32` pixels after exposure and offset.
    ///
    /// Alpha is passed through untouched. With `divide_alpha` colour is
    /// converted to straight alpha first. Empty without an image.
    pub fn get_hdr_image_data(&self, divide_alpha: bool, priority: i32) -> Task<Vec<f32>> {
        let Some(channels) = self.composited(priority) else {
            return Task::ready(Vec::new());
        };
        let config = self.config;
        let pool = self.pool.clone();
        self.pool.spawn(priority, async move {
            let channels = Arc::new(channels.await?);
            let layout = RgbaLayout::new(&channels);
            let count = channels.first().map_or(0, Channel::count);
            let chunks = pool
                .map_chunks(count, priority, move |range| {
                    let mut out = Vec::with_capacity(range.len() * 4);
                    for i in range {
                        let (rgb, alpha) = layout.pixel(&channels, i, divide_alpha);
                        out.extend(rgb.map(|v| config.adjust(v)));
                        out.push(alpha);
                    }
                    out
                })
                .await?;
            Ok(chunks.concat())
        })
    }

    /// Interleaved RGBA bytes of the fully tonemapped display.
    ///
    /// Empty without an image.
    pub fn get_ldr_image_data(&self, divide_alpha: bool, priority: i32) -> Task<Vec<u8>> {
        let Some(channels) = self.composited(priority) else {
            return Task::ready(Vec::new());
        };
        let config = self.config;
        let pool = self.pool.clone();
        self.pool.spawn(priority, async move {
            let channels = Arc::new(channels.await?);
            let layout = RgbaLayout::new(&channels);
            let count = channels.first().map_or(0, Channel::count);
            let chunks = pool
                .map_chunks(count, priority, move |range| {
                    let mut out = Vec::with_capacity(range.len() * 4);
                    for i in range {
                        let (rgb, alpha) = layout.pixel(&channels, i, divide_alpha);
                        out.extend(config.display_rgb(rgb).map(quantize));
                        out.push(quantize(alpha));
                    }
                    out
                })
                .await?;
            Ok(chunks.concat())
        })
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("config", &self.config)
            .field("image", &self.image.as_ref().map(|i| i.name()))
            .field("reference", &self.reference.as_ref().map(|i| i.name()))
            .field("requested_group", &self.requested_group)
            .field("cached_statistics", &self.statistics.len())
            .finish()
    }
}

#[inline]
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Which composited channels feed R, G, B and A.
#[derive(Debug, Clone, Copy)]
struct RgbaLayout {
    rgb: [Option<usize>; 3],
    alpha: Option<usize>,
}

impl RgbaLayout {
    fn new(channels: &[Channel]) -> Self {
        let colours: Vec<usize> = (0..channels.len())
            .filter(|&i| !Channel::is_alpha(channels[i].name()))
            .collect();
        let alpha = (0..channels.len()).find(|&i| Channel::is_alpha(channels[i].name()));
        let rgb = match colours.as_slice() {
            [] => [None; 3],
            [y] => [Some(*y); 3],
            [a, b] => [Some(*a), Some(*b), None],
            [r, g, b, ..] => [Some(*r), Some(*g), Some(*b)],
        };
        Self { rgb, alpha }
    }

    #[inline]
    fn pixel(&self, channels: &[Channel], i: usize, divide_alpha: bool) -> ([f32; 3], f32) {
        let alpha = self.alpha.map_or(1.0, |k| channels[k].eval(i));
        let mut rgb = self.rgb.map(|c| c.map_or(0.0, |k| channels[k].eval(i)));
        if divide_alpha && alpha != 0.0 {
            rgb = rgb.map(|v| v / alpha);
        }
        (rgb, alpha)
    }
}
