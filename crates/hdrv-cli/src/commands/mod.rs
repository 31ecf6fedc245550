//! CLI command implementations

pub mod export;
pub mod info;
pub mod stats;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hdrv_canvas::Canvas;
use hdrv_core::Image;
use hdrv_io::{load_image, LoaderRegistry};
use hdrv_task::ThreadPool;

use crate::ViewArgs;

/// Load image from path
pub fn load(pool: &ThreadPool, path: &Path, channel_selector: &str) -> Result<Arc<Image>> {
    load_image(pool, LoaderRegistry::global(), path, channel_selector)
        .wait()
        .with_context(|| format!("Failed to load: {}", path.display()))
}

/// Builds a canvas showing the image (and reference) named by `args`.
pub fn open_canvas(pool: &ThreadPool, args: &ViewArgs) -> Result<Canvas> {
    // Both loads run concurrently; the primary image keeps the lower id.
    let image = load_image(pool, LoaderRegistry::global(), &args.input, &args.channels);
    let reference = args
        .reference
        .as_ref()
        .map(|path| load_image(pool, LoaderRegistry::global(), path, &args.channels));

    let image = image
        .wait()
        .with_context(|| format!("Failed to load: {}", args.input.display()))?;
    let reference = match (reference, &args.reference) {
        (Some(task), Some(path)) => {
            Some(task.wait().with_context(|| format!("Failed to load reference: {}", path.display()))?)
        }
        _ => None,
    };

    let mut canvas = Canvas::new(pool.clone());
    canvas.set_image(Some(image));
    canvas.set_reference(reference);
    canvas.set_requested_group(args.group.clone());
    canvas.set_metric(args.metric);
    Ok(canvas)
}

/// Human readable label of the group the canvas shows.
pub fn group_label(canvas: &Canvas) -> String {
    let Some(image) = canvas.image() else {
        return String::new();
    };
    canvas
        .effective_group()
        .and_then(|name| image.group(&name).map(|g| g.display_name()))
        .unwrap_or_default()
}

/// Format file size for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
