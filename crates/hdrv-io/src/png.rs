//! PNG format support.
//!
//! Decodes 8- and 16-bit grey, grey+alpha, RGB, RGBA and palette images into
//! linear float channels (`R,G,B[,A]` or `Y[,A]`), and writes 8-bit RGBA for
//! LDR export.
//!
//! Colour samples are sRGB-decoded to linear light; alpha stays linear and
//! straight, so the load pipeline premultiplies it afterwards.

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use std::sync::Arc;

use hdrv_core::transfer::{srgb8_to_linear_table, srgb_to_linear};
use hdrv_core::{matches_channel_selector, Channel, Error, ImageData, Result};
use hdrv_task::{Task, ThreadPool};
use tracing::debug;

use crate::loader::ImageLoader;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Loader for PNG files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngLoader;

impl ImageLoader for PngLoader {
    fn name(&self) -> &'static str {
        "PNG"
    }

    fn can_load_file(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&PNG_MAGIC)
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
        pool.spawn(priority, async move {
            decode(data, &selector).map_err(|reason| Error::decode_failure(&path, reason))
        })
    }
}

fn decode(data: Arc<[u8]>, selector: &str) -> std::result::Result<ImageData, String> {
    let mut decoder = png::Decoder::new(Cursor::new(data));
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info().map_err(|e| e.to_string())?;

    let buf_size = reader
        .output_buffer_size()
        .ok_or_else(|| "cannot determine output buffer size".to_string())?;
    let mut buf = vec![0u8; buf_size];
    let info = reader.next_frame(&mut buf).map_err(|e| e.to_string())?;
    let bytes = &buf[..info.buffer_size()];

    let width = info.width as usize;
    let height = info.height as usize;
    let names: &[&str] = match info.color_type {
        png::ColorType::Grayscale => &["Y"],
        png::ColorType::GrayscaleAlpha => &["Y", "A"],
        png::ColorType::Rgb => &["R", "G", "B"],
        png::ColorType::Rgba => &["R", "G", "B", "A"],
        png::ColorType::Indexed => return Err("palette was not expanded".into()),
    };
    debug!(width, height, color_type = ?info.color_type, bit_depth = ?info.bit_depth, "decoded PNG frame");

    let bytes_per_sample = match info.bit_depth {
        png::BitDepth::Eight => 1,
        png::BitDepth::Sixteen => 2,
        depth => return Err(format!("unsupported bit depth {depth:?}")),
    };
    let n = names.len();
    let expected = width * height * n * bytes_per_sample;
    if bytes.len() != expected {
        return Err(format!("expected {expected} bytes of pixel data, decoded {}", bytes.len()));
    }

    let table = srgb8_to_linear_table();
    // Colour samples are sRGB-encoded; alpha is stored linearly.
    let sample = |i: usize, is_alpha: bool| -> f32 {
        if bytes_per_sample == 1 {
            let v = bytes[i];
            if is_alpha {
                v as f32 / 255.0
            } else {
                table[v as usize]
            }
        } else {
            let v = u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]) as f32 / 65535.0;
            if is_alpha {
                v
            } else {
                srgb_to_linear(v)
            }
        }
    };

    let mut channels = Vec::with_capacity(n);
    for (c, &name) in names.iter().enumerate() {
        if !matches_channel_selector(name, selector) {
            continue;
        }
        let is_alpha = Channel::is_alpha(name);
        let plane: Vec<f32> = (0..width * height).map(|p| sample(p * n + c, is_alpha)).collect();
        let channel = Channel::from_data(name, width, height, plane).ok_or_else(|| "pixel count mismatch".to_string())?;
        channels.push(channel);
    }
    Ok(ImageData::new(channels, false))
}

/// Writes interleaved 8-bit RGBA pixels as a PNG file.
pub fn write(path: &Path, width: usize, height: usize, rgba: &[u8]) -> Result<()> {
    if rgba.len() != width * height * 4 {
        return Err(Error::invalid_image(format!(
            "expected {} bytes for {width}x{height} RGBA, got {}",
            width * height * 4,
            rgba.len()
        )));
    }
    let encode_err = |e: png::EncodingError| Error::invalid_image(format!("PNG encoding failed: {e}"));
    let width = u32::try_from(width).map_err(|_| Error::invalid_image("image too wide for PNG"))?;
    let height = u32::try_from(height).map_err(|_| Error::invalid_image("image too tall for PNG"))?;

    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::default());
    encoder.set_source_srgb(png::SrgbRenderingIntent::Perceptual);

    let mut png_writer = encoder.write_header().map_err(encode_err)?;
    png_writer.write_image_data(rgba).map_err(encode_err)?;
    png_writer.finish().map_err(encode_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn encode(width: usize, height: usize, rgba: &[u8]) -> Arc<[u8]> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.png");
        write(&path, width, height, rgba).unwrap();
        std::fs::read(&path).unwrap().into()
    }

    #[test]
    fn test_rgba_decodes_to_linear_straight_alpha() {
        let rgba = [255, 0, 128, 128, 0, 255, 0, 255];
        let data = encode(2, 1, &rgba);
        assert!(PngLoader.can_load_file(&data));

        let image = decode(data, "").unwrap();
        assert!(!image.has_premultiplied_alpha);
        let names: Vec<&str> = image.channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["R", "G", "B", "A"]);

        let r = image.channel("R").unwrap();
        assert_relative_eq!(r.eval(0), 1.0, epsilon = 1e-6);
        assert_eq!(r.eval(1), 0.0);
        let b = image.channel("B").unwrap();
        assert_relative_eq!(b.eval(0), srgb_to_linear(128.0 / 255.0), epsilon = 1e-6);
        let a = image.channel("A").unwrap();
        assert_relative_eq!(a.eval(0), 128.0 / 255.0, epsilon = 1e-6);
        assert_relative_eq!(a.eval(1), 1.0);
    }

    #[test]
    fn test_selector_limits_channels() {
        let data = encode(1, 1, &[10, 20, 30, 40]);
        let image = decode(data, "A").unwrap();
        assert_eq!(image.channels.len(), 1);
        assert_eq!(image.channels[0].name(), "A");
    }

    #[test]
    fn test_corrupt_stream_is_rejected() {
        let data = encode(4, 4, &[7; 64]);
        let truncated: Arc<[u8]> = data[..data.len() / 2].into();
        assert!(decode(truncated, "").is_err());
    }

    #[test]
    fn test_write_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let err = write(&dir.path().join("x.png"), 2, 2, &[0; 15]).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }
}
