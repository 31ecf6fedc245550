//! OpenEXR format support.
//!
//! Reads every layer (part) of a scanline or tiled EXR at its largest
//! resolution level. Channel names are prefixed with the part's layer name,
//! so a part named `diffuse` holding `R,G,B` yields `diffuse.R`,
//! `diffuse.G`, `diffuse.B`. EXR stores premultiplied colour, which is the
//! viewer's internal representation.
//!
//! # Sample types
//!
//! - `f16` samples are widened with [`half`]'s slice conversion
//! - `f32` samples are taken as-is
//! - `u32` samples (object ids) are cast to `f32`
//!
//! Subsampled channels (chroma planes of YC images) are skipped with a
//! warning.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use exr::prelude::*;
use half::slice::HalfFloatSliceExt;
use hdrv_core::{matches_channel_selector, Channel, Error, ImageData};
use hdrv_task::{Task, ThreadPool};
use tracing::{debug, warn};

use crate::loader::ImageLoader;

const EXR_MAGIC: [u8; 4] = [0x76, 0x2F, 0x31, 0x01];

/// Loader for OpenEXR files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExrLoader;

impl ImageLoader for ExrLoader {
    fn name(&self) -> &'static str {
        "OpenEXR"
    }

    fn can_load_file(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&EXR_MAGIC)
    }

    fn load(
        &self,
        data: Arc<[u8]>,
        path: &Path,
        channel_selector: &str,
        priority: i32,
        pool: &ThreadPool,
    ) -> Task<ImageData> {
        let path = path.to_path_buf();
        let selector = channel_selector.to_string();
        let workers = pool.clone();

        pool.spawn(priority, async move {
            let image = read()
                .no_deep_data()
                .largest_resolution_level()
                .all_channels()
                .all_layers()
                .all_attributes()
                .non_parallel()
                .from_buffered(Cursor::new(data))
                .map_err(|e| Error::decode_failure(&path, e.to_string()))?;

            let mut size: Option<(usize, usize)> = None;
            let mut conversions = Vec::new();
            for layer in image.layer_data {
                let layer_size = (layer.size.width(), layer.size.height());
                let layer_name = layer.attributes.layer_name.as_ref().map(|t| t.to_string());

                match size {
                    None => size = Some(layer_size),
                    Some(first) if first != layer_size => {
                        warn!(
                            layer = layer_name.as_deref().unwrap_or(""),
                            "skipping layer whose size differs from the first layer"
                        );
                        continue;
                    }
                    Some(_) => {}
                }

                for channel in layer.channel_data.list {
                    let name = match &layer_name {
                        Some(layer) => format!("{}.{}", layer, channel.name),
                        None => channel.name.to_string(),
                    };
                    if !matches_channel_selector(&name, &selector) {
                        continue;
                    }
                    if channel.sampling != Vec2(1, 1) {
                        warn!(channel = %name, "skipping subsampled channel");
                        continue;
                    }

                    let (width, height) = layer_size;
                    let samples = channel.sample_data;
                    conversions.push(workers.spawn(priority, async move {
                        let data = flat_samples_to_f32(samples);
                        Channel::from_data(name, width, height, data)
                            .ok_or_else(|| Error::computation("EXR channel has an unexpected sample count"))
                    }));
                }
            }

            let mut channels = Vec::with_capacity(conversions.len());
            for conversion in conversions {
                channels.push(conversion.await?);
            }
            debug!(channels = channels.len(), "decoded EXR channels");
            Ok(ImageData::new(channels, true))
        })
    }
}

fn flat_samples_to_f32(samples: FlatSamples) -> Vec<f32> {
    match samples {
        FlatSamples::F16(values) => {
            let mut out = vec![0.0f32; values.len()];
            values.convert_to_f32_slice(&mut out);
            out
        }
        FlatSamples::F32(values) => values,
        FlatSamples::U32(values) => values.into_iter().map(|v| v as f32).collect(),
    }
}
