//! Ordered registry of image loaders.
//!
//! The registry probes a stream against each loader in registration order;
//! the first loader that claims the stream decodes it. If none does, loading
//! fails with [`Error::UnsupportedFormat`]. There is no fallback loader.
//!
//! # Architecture
//!
//! [`LoaderRegistry::global()`] holds the built-in loaders, registered once
//! on first use in the order OpenEXR, Radiance HDR, PNG. Custom registries
//! (tests, embedders with extra formats) are built with
//! [`LoaderRegistry::new`] and [`LoaderRegistry::register`].
//!
//! # Example
//!
//! ```rust
//! use hdrv_io::LoaderRegistry;
//!
//! let registry = LoaderRegistry::global();
//! assert_eq!(registry.names(), vec!["OpenEXR", "Radiance HDR", "PNG"]);
//!
//! let exr_header = [0x76, 0x2F, 0x31, 0x01];
//! assert_eq!(registry.find(&exr_header).map(|l| l.name()), Some("OpenEXR"));
//! assert!(registry.find(b"GIF89a").is_none());
//! ```

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use hdrv_core::{Error, ImageData};
use hdrv_task::{Task, ThreadPool};
use tracing::{debug, trace};

use crate::exr::ExrLoader;
use crate::hdr::HdrLoader;
use crate::loader::ImageLoader;
use crate::png::PngLoader;

/// Ordered set of [`ImageLoader`]s.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn ImageLoader>>,
}

impl LoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in loaders.
    pub fn with_builtin_loaders() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExrLoader));
        registry.register(Arc::new(HdrLoader));
        registry.register(Arc::new(PngLoader));
        registry
    }

    /// Returns the process-wide registry with the built-in loaders.
    pub fn global() -> &'static LoaderRegistry {
        static INSTANCE: OnceLock<LoaderRegistry> = OnceLock::new();
        INSTANCE.get_or_init(Self::with_builtin_loaders)
    }

    /// Appends a loader. Earlier loaders take precedence when probing.
    pub fn register(&mut self, loader: Arc<dyn ImageLoader>) {
        debug!(loader = loader.name(), "registering image loader");
        self.loaders.push(loader);
    }

    /// Loader names in probe order.
    pub fn names(&self) -> Vec<&'static str> {
        self.loaders.iter().map(|l| l.name()).collect()
    }

    /// Number of registered loaders.
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// Returns `true` if no loader is registered.
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// First loader that claims `bytes`.
    pub fn find(&self, bytes: &[u8]) -> Option<&Arc<dyn ImageLoader>> {
        self.loaders.iter().find(|loader| {
            let claimed = loader.can_load_file(bytes);
            trace!(loader = loader.name(), claimed, "probing");
            claimed
        })
    }

    /// Dispatches `data` to the first loader that claims it.
    ///
    /// Returns an already-failed task with [`Error::UnsupportedFormat`] when
    /// no loader accepts the stream.
    pub fn load(
        &self,
        data: Arc<[u8]>,
        path: &Path,
        channel_selector: &str,
        priority: i32,
        pool: &ThreadPool,
    ) -> Task<ImageData> {
        match self.find(&data) {
            Some(loader) => {
                debug!(loader = loader.name(), path = %path.display(), "loading");
                loader.load(Arc::clone(&data), path, channel_selector, priority, pool)
            }
            None => Task::failed(Error::unsupported_format(path)),
        }
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("loaders", &self.names())
            .finish()
    }
}
