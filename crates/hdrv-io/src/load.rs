//! Image acquisition pipeline.
//!
//! [`load_image`] turns a path into a shared [`Image`]: read the file, probe
//! the registry, await the loader, validate, premultiply and wrap. It runs
//! entirely on the pool at priority `-id`, so images requested earlier are
//! decoded first.
//!
//! [`BackgroundImagesLoader`] is the interactive thread's view of that
//! pipeline: it enqueues loads and later polls finished ones without ever
//! blocking.
//!
//! # Example
//!
//! ```rust,no_run
//! use hdrv_io::{BackgroundImagesLoader, LoadEvent};
//! use hdrv_task::ThreadPool;
//!
//! let loader = BackgroundImagesLoader::new(ThreadPool::global().clone());
//! loader.enqueue("render.exr", "", true);
//!
//! // Once per frame:
//! while let Some(event) = loader.try_pop() {
//!     match event {
//!         LoadEvent::Loaded { image, select } => println!("{image} (select: {select})"),
//!         LoadEvent::Failed { path, error } => eprintln!("{}: {error}", path.display()),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use hdrv_core::{Error, Image, Result};
use hdrv_task::{Task, ThreadPool};
use tracing::{error, info};

use crate::registry::LoaderRegistry;

/// Loads `path` under a freshly drawn image id.
pub fn load_image(
    pool: &ThreadPool,
    registry: &LoaderRegistry,
    path: impl Into<PathBuf>,
    channel_selector: &str,
) -> Task<Arc<Image>> {
    load_image_with_id(pool, registry, Image::draw_id(), path, channel_selector)
}

/// Loads `path` under an id drawn by the caller.
pub fn load_image_with_id(
    pool: &ThreadPool,
    registry: &LoaderRegistry,
    id: usize,
    path: impl Into<PathBuf>,
    channel_selector: &str,
) -> Task<Arc<Image>> {
    let path = path.into();
    let selector = channel_selector.to_string();
    let registry = registry.clone();
    let workers = pool.clone();
    pool.spawn(priority_for(id), async move {
        let data: Arc<[u8]> = std::fs::read(&path)?.into();
        decode_image(&workers, &registry, id, path, data, selector).await
    })
}

/// Decodes an in-memory stream as if it had been read from `path`.
pub fn load_image_from_bytes(
    pool: &ThreadPool,
    registry: &LoaderRegistry,
    path: impl Into<PathBuf>,
    data: Arc<[u8]>,
    channel_selector: &str,
) -> Task<Arc<Image>> {
    let id = Image::draw_id();
    let path = path.into();
    let selector = channel_selector.to_string();
    let registry = registry.clone();
    let workers = pool.clone();
    pool.spawn(priority_for(id), async move {
        decode_image(&workers, &registry, id, path, data, selector).await
    })
}

/// Earlier images are prioritised.
fn priority_for(id: usize) -> i32 {
    i32::try_from(id).map_or(i32::MIN, |id| -id)
}

async fn decode_image(
    pool: &ThreadPool,
    registry: &LoaderRegistry,
    id: usize,
    path: PathBuf,
    data: Arc<[u8]>,
    selector: String,
) -> Result<Arc<Image>> {
    let start = Instant::now();
    let priority = priority_for(id);

    let loader = registry
        .find(&data)
        .ok_or_else(|| Error::unsupported_format(&path))?;
    let loader_name = loader.name();
    let mut image_data = loader.load(Arc::clone(&data), &path, &selector, priority, pool).await?;
    drop(data);

    if image_data.channels.is_empty() && !selector.is_empty() {
        return Err(Error::invalid_image(format!("no channels match the selector '{selector}'")));
    }
    image_data.ensure_valid()?;
    if !image_data.has_premultiplied_alpha {
        image_data.multiply_alpha();
    }

    let image = Arc::new(Image::new(id, path, image_data, &selector)?);
    info!(
        image = image.name(),
        loader = loader_name,
        seconds = start.elapsed().as_secs_f64(),
        "loaded image"
    );
    Ok(image)
}

// ============================================================================
// Background loader
// ============================================================================

/// Outcome of one enqueued load.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// The image decoded successfully.
    Loaded {
        /// The new image.
        image: Arc<Image>,
        /// Whether the viewer should switch to it.
        select: bool,
    },
    /// The image could not be loaded. The viewer keeps its current state.
    Failed {
        /// Requested path.
        path: PathBuf,
        /// What went wrong.
        error: Error,
    },
}

/// Queue of asynchronous image loads polled from the interactive thread.
pub struct BackgroundImagesLoader {
    pool: ThreadPool,
    registry: LoaderRegistry,
    tx: Sender<LoadEvent>,
    rx: Mutex<Receiver<LoadEvent>>,
}

impl BackgroundImagesLoader {
    /// Creates a loader using the built-in formats.
    pub fn new(pool: ThreadPool) -> Self {
        Self::with_registry(pool, LoaderRegistry::global().clone())
    }

    /// Creates a loader using a custom registry.
    pub fn with_registry(pool: ThreadPool, registry: LoaderRegistry) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            pool,
            registry,
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Starts loading `path`. The outcome arrives through [`Self::try_pop`].
    pub fn enqueue(&self, path: impl AsRef<Path>, channel_selector: &str, select: bool) {
        let path = path.as_ref().to_path_buf();
        let id = Image::draw_id();
        let task = load_image_with_id(&self.pool, &self.registry, id, path.clone(), channel_selector);
        let tx = self.tx.clone();
        self.pool.spawn_detached(priority_for(id), async move {
            let event = match task.await {
                Ok(image) => LoadEvent::Loaded { image, select },
                Err(error) => {
                    error!(path = %path.display(), %error, "could not load image");
                    LoadEvent::Failed { path, error }
                }
            };
            // The receiver is gone only when the loader itself was dropped.
            let _ = tx.send(event);
        });
    }

    /// Next finished load, if any. Never blocks.
    pub fn try_pop(&self) -> Option<LoadEvent> {
        self.rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .try_recv()
            .ok()
    }
}
