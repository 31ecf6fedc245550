//! Error types shared by every hdrv crate.
//!
//! The [`Error`] enum covers the failure modes of the viewer core:
//! - No loader recognises a file ([`UnsupportedFormat`](Error::UnsupportedFormat))
//! - A loader started decoding and the stream turned out malformed
//!   ([`DecodeFailure`](Error::DecodeFailure))
//! - A reference image cannot be compared against the displayed one
//!   ([`ChannelMismatch`](Error::ChannelMismatch))
//! - A background computation failed, panicked or was dropped
//!   ([`ComputationFailure`](Error::ComputationFailure))
//!
//! # Cloning
//!
//! A single failed task may have many awaiters (see `hdrv_task::Shared`), so
//! the error is `Clone`. I/O errors are kept behind an [`Arc`] for that reason.
//!
//! # Usage
//!
//! ```rust
//! use hdrv_core::{Error, Result};
//!
//! fn check_gamma(gamma: f32) -> Result<f32> {
//!     if !(gamma > 0.0) {
//!         return Err(Error::invalid_config(format!("gamma must be positive, got {gamma}")));
//!     }
//!     Ok(gamma)
//! }
//!
//! assert!(check_gamma(0.0).is_err());
//! ```

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading, compositing or analysing images.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No registered loader claimed the stream.
    #[error("unsupported format: no loader accepts '{path}'")]
    UnsupportedFormat {
        /// Source path of the rejected stream.
        path: String,
    },

    /// A loader accepted the stream but could not decode it.
    #[error("could not decode '{path}': {reason}")]
    DecodeFailure {
        /// Source path of the stream.
        path: String,
        /// Decoder-specific description.
        reason: String,
    },

    /// The reference image lacks a comparable channel set.
    #[error("channel mismatch: {0}")]
    ChannelMismatch(String),

    /// A background computation failed.
    ///
    /// Also produced when a task panics or is dropped before it completes.
    #[error("computation failed: {0}")]
    ComputationFailure(String),

    /// Decoded data violates an image invariant.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A configuration value is out of its domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error while reading or writing a file.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl Error {
    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(path: &Path) -> Self {
        Self::UnsupportedFormat {
            path: path.display().to_string(),
        }
    }

    /// Creates an [`Error::DecodeFailure`] error.
    #[inline]
    pub fn decode_failure(path: &Path, reason: impl Into<String>) -> Self {
        Self::DecodeFailure {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::ChannelMismatch`] error.
    #[inline]
    pub fn channel_mismatch(msg: impl Into<String>) -> Self {
        Self::ChannelMismatch(msg.into())
    }

    /// Creates an [`Error::ComputationFailure`] error.
    #[inline]
    pub fn computation(msg: impl Into<String>) -> Self {
        Self::ComputationFailure(msg.into())
    }

    /// Creates an [`Error::InvalidImage`] error.
    #[inline]
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Creates an [`Error::InvalidConfig`] error.
    #[inline]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns `true` if no loader accepted the input.
    #[inline]
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }

    /// Returns `true` if a loader failed mid-decode.
    #[inline]
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, Self::DecodeFailure { .. })
    }

    /// Returns `true` if this is a background computation failure.
    #[inline]
    pub fn is_computation_failure(&self) -> bool {
        matches!(self, Self::ComputationFailure(_))
    }

    /// Returns `true` if this is an I/O error.
    #[inline]
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
