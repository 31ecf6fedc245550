//! The loader contract every image format implements.
//!
//! A loader answers two questions about a byte stream: "is this mine?"
//! ([`ImageLoader::can_load_file`]) and "what does it contain?"
//! ([`ImageLoader::load`]). Probing must be cheap and side-effect free; it
//! only ever looks at the leading bytes. Decoding runs as a [`Task`] on the
//! pool and may fan out into sub-tasks of its own.

use std::path::Path;
use std::sync::Arc;

use hdrv_core::ImageData;
use hdrv_task::{Task, ThreadPool};

/// A format-specific image decoder.
pub trait ImageLoader: Send + Sync {
    /// Human-readable format name (`"OpenEXR"`, `"PNG"`).
    fn name(&self) -> &'static str;

    /// Whether this loader recognises the stream.
    ///
    /// `bytes` is the whole file; implementations inspect only its header.
    fn can_load_file(&self, bytes: &[u8]) -> bool;

    /// Decodes the stream on `pool`.
    ///
    /// Only channels matching `channel_selector` are decoded (see
    /// [`hdrv_core::matches_channel_selector`]). Malformed input resolves the
    /// task with [`hdrv_core::Error::DecodeFailure`].
    fn load(
        &self,
        data: Arc<[u8]>,
        path: &Path,
        channel_selector: &str,
        priority: i32,
        pool: &ThreadPool,
    ) -> Task<ImageData>;
}

