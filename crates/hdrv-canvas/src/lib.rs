//! # hdrv-canvas
//!
//! What the viewer shows and what it knows about it.
//!
//! - [`compose`] - Composites the requested channel group, optionally
//!   compared against a reference image with a [`Metric`]
//! - [`tonemap`] - Exposure, offset and the [`Tonemap`] display operators
//! - [`stats`] - Mean, min, max and histogram of the composited channels
//! - [`Canvas`] - Display state, the statistics cache and image export data
//!
//! ## Example
//!
//! ```rust,no_run
//! use hdrv_canvas::{Canvas, Tonemap};
//! use hdrv_io::{load_image, LoaderRegistry};
//! use hdrv_task::ThreadPool;
//!
//! let pool = ThreadPool::global().clone();
//! let image = load_image(&pool, LoaderRegistry::global(), "render.exr", "").wait()?;
//!
//! let image_len = image.count();
//! let mut canvas = Canvas::new(pool);
//! canvas.set_image(Some(image));
//! canvas.set_exposure(1.5);
//! canvas.set_tonemap(Tonemap::FalseColor);
//!
//! let stats = canvas.canvas_statistics(0).unwrap().compute(0).wait()?;
//! println!("mean {} min {} max {}", stats.mean, stats.min, stats.max);
//! let rgba8 = canvas.get_ldr_image_data(true, 0).wait()?;
//! assert_eq!(rgba8.len(), image_len * 4);
//! # Ok::<(), hdrv_core::Error>(())
//! ```

#![warn(missing_docs)]

pub mod canvas;
pub mod compose;
pub mod config;
pub mod metric;
pub mod stats;
pub mod tonemap;

pub use canvas::{Canvas, StatisticsCell, StatisticsKey};
pub use compose::{channels_from_images, composite_pixel};
pub use config::DisplayConfig;
pub use metric::{apply_metric, Metric, METRIC_EPSILON};
pub use stats::{compute_canvas_statistics, statistics_from_channels, CanvasStatistics, NUM_BUCKETS};
pub use tonemap::{apply_exposure_and_offset, apply_tonemap, false_color, Tonemap};
