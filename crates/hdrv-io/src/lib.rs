//! # hdrv-io
//!
//! Image acquisition for the hdrv viewer.
//!
//! - [`ImageLoader`] - Contract every format implements
//! - [`LoaderRegistry`] - Ordered loader set, probed in registration order
//! - [`load_image`] - Path to shared [`hdrv_core::Image`] as a pool task
//! - [`BackgroundImagesLoader`] - Non-blocking load queue for the UI thread
//! - [`save`] - PNG and Radiance HDR export
//!
//! # Supported Formats
//!
//! | Format       | Read | Write | Notes                                    |
//! |--------------|------|-------|------------------------------------------|
//! | OpenEXR      | yes  | no    | all parts, f16/f32/u32, premultiplied    |
//! | Radiance HDR | yes  | yes   | flat and RLE scanlines                   |
//! | PNG          | yes  | yes   | 8/16-bit, sRGB decoded, straight alpha   |
//!
//! # Example
//!
//! ```rust,no_run
//! use hdrv_io::{load_image, LoaderRegistry};
//! use hdrv_task::ThreadPool;
//!
//! let pool = ThreadPool::global();
//! let image = load_image(pool, LoaderRegistry::global(), "beauty.exr", "").wait()?;
//! println!("{image}");
//! # Ok::<(), hdrv_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod exr;
pub mod hdr;
pub mod load;
pub mod loader;
pub mod png;
pub mod registry;
pub mod save;

pub use load::{load_image, load_image_from_bytes, load_image_with_id, BackgroundImagesLoader, LoadEvent};
pub use loader::ImageLoader;
pub use registry::LoaderRegistry;
pub use save::ExportFormat;
