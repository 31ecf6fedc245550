//! # hdrv-core
//!
//! Core types for the hdrv HDR image viewer.
//!
//! - [`Channel`] - A named plane of `f32` samples
//! - [`ImageData`] - Transient decode result produced by a loader
//! - [`Image`] - Immutable, shared image with channel groups
//! - [`ChannelGroup`] - Channels of one layer in display order
//! - [`Error`] / [`Result`] - Error taxonomy shared by every hdrv crate
//! - [`transfer`] - sRGB encode/decode curves
//!
//! ## Crate Structure
//!
//! This crate has no internal dependencies. The other hdrv crates build on it:
//!
//! ```text
//! hdrv-core (this crate)
//!    ^
//!    +-- hdrv-task   (thread pool, tasks, lazy values)
//!    +-- hdrv-io     (loader registry, decoders)
//!    +-- hdrv-canvas (compositing, tonemapping, statistics)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channel;
pub mod error;
pub mod image;
pub mod transfer;

pub use channel::{matches_channel_selector, Channel};
pub use error::{Error, Result};
pub use image::{ChannelGroup, Image, ImageData};
