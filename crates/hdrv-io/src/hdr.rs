//! Radiance HDR (RGBE) format support.
//!
//! Reads flat and run-length encoded scanlines into three float channels
//! `R`, `G`, `B`, and writes RLE-compressed RGBE for HDR export.
//!
//! Decoding is split in two phases: the byte stream is parsed into packed
//! RGBE quadruplets on one worker, then the RGBE to float conversion fans
//! out over the pool with [`ThreadPool::map_chunks`].

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use hdrv_core::{matches_channel_selector, Channel, Error, ImageData, Result};
use hdrv_task::{Task, ThreadPool};
use tracing::debug;

use crate::loader::ImageLoader;

const HDR_MAGIC: &str = "#?";

/// Longest scanline RLE can describe.
const MAX_RLE_WIDTH: usize = 0x7fff;

// ============================================================================
// Loader
// ============================================================================

/// Loader for Radiance `.hdr` / `.pic` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct HdrLoader;

impl ImageLoader for HdrLoader {
    fn name(&self) -> &'static str {
        "Radiance HDR"
    }

    fn can_load_file(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(HDR_MAGIC.as_bytes())
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
            let mut reader = Cursor::new(&data[..]);
            let (width, height) =
                read_header(&mut reader).map_err(|e| Error::decode_failure(&path, e.to_string()))?;
            let available = data.len().saturating_sub(reader.position() as usize);
            if min_payload_len(width, height).is_none_or(|needed| needed > available) {
                return Err(Error::decode_failure(
                    &path,
                    format!("{width}x{height} pixels do not fit in {available} bytes of scanline data"),
                ));
            }
            let rgbe: Arc<[u8]> = read_rgbe(&mut reader, width, height)
                .map_err(|e| Error::decode_failure(&path, e.to_string()))?
                .into();
            debug!(width, height, "decoded RGBE scanlines");

            let planes = workers
                .map_chunks(width * height, priority, move |range| {
                    let mut planes: [Vec<f32>; 3] = Default::default();
                    for plane in &mut planes {
                        plane.reserve(range.len());
                    }
                    for px in rgbe[range.start * 4..range.end * 4].chunks_exact(4) {
                        let rgb = rgbe_to_f32(px[0], px[1], px[2], px[3]);
                        for (plane, v) in planes.iter_mut().zip(rgb) {
                            plane.push(v);
                        }
                    }
                    planes
                })
                .await?;

            let mut channels = Vec::with_capacity(3);
            for (c, name) in ["R", "G", "B"].into_iter().enumerate() {
                if !matches_channel_selector(name, &selector) {
                    continue;
                }
                let samples: Vec<f32> = planes.iter().flat_map(|p| p[c].iter().copied()).collect();
                let channel = Channel::from_data(name, width, height, samples)
                    .ok_or_else(|| Error::decode_failure(&path, "pixel count mismatch"))?;
                channels.push(channel);
            }
            Ok(ImageData::new(channels, true))
        })
    }
}

// ============================================================================
// Reading
// ============================================================================

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn read_header<R: BufRead>(reader: &mut R) -> io::Result<(usize, usize)> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if !trim_line(&line).starts_with(HDR_MAGIC) {
        return Err(invalid("HDR magic not found"));
    }

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(invalid("missing HDR resolution line"));
        }
        let line = trim_line(&line);
        if line.starts_with('+') || line.starts_with('-') {
            return parse_resolution(line).ok_or_else(|| invalid("invalid HDR resolution line"));
        }
        if let Some(("FORMAT", value)) = line.split_once('=').map(|(k, v)| (k.trim(), v.trim())) {
            if value != "32-bit_rle_rgbe" && value != "32-bit_rle_xyze" {
                return Err(invalid(format!("unsupported HDR pixel format '{value}'")));
            }
        }
    }
}

/// Fewest bytes that can encode `width x height` pixels, flat or RLE.
fn min_payload_len(width: usize, height: usize) -> Option<usize> {
    let flat = width.checked_mul(4)?;
    let per_line = if (8..=MAX_RLE_WIDTH).contains(&width) {
        // Scanline header, then every channel as runs of at most 127.
        flat.min(4 + 8 * width.div_ceil(127))
    } else {
        flat
    };
    per_line.checked_mul(height)
}

fn read_rgbe<R: Read>(reader: &mut R, width: usize, height: usize) -> io::Result<Vec<u8>> {
    let len = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| invalid(format!("HDR resolution {width}x{height} is too large")))?;
    let mut rgbe = Vec::new();
    rgbe.try_reserve_exact(len)
        .map_err(|_| invalid(format!("cannot allocate {len} bytes for {width}x{height} HDR pixels")))?;
    rgbe.resize(len, 0);
    if rgbe.is_empty() {
        return Ok(rgbe);
    }

    let mut first = [0u8; 4];
    reader.read_exact(&mut first)?;

    let use_rle = (8..=MAX_RLE_WIDTH).contains(&width)
        && first[0] == 2
        && first[1] == 2
        && (((first[2] as usize) << 8) | first[3] as usize) == width;

    if use_rle {
        let mut header = first;
        for (y, scanline) in rgbe.chunks_exact_mut(width * 4).enumerate() {
            if y > 0 {
                reader.read_exact(&mut header)?;
            }
            decode_rle_scanline(reader, width, scanline, header)?;
        }
    } else {
        rgbe[..4].copy_from_slice(&first);
        reader.read_exact(&mut rgbe[4..])?;
    }
    Ok(rgbe)
}

fn decode_rle_scanline<R: Read>(reader: &mut R, width: usize, out: &mut [u8], header: [u8; 4]) -> io::Result<()> {
    if header[0] != 2 || header[1] != 2 {
        return Err(invalid("HDR RLE header invalid"));
    }
    let encoded_width = ((header[2] as usize) << 8) | (header[3] as usize);
    if encoded_width != width {
        return Err(invalid("HDR RLE width mismatch"));
    }

    let mut channel = vec![0u8; width];
    for c in 0..4 {
        let mut idx = 0usize;
        while idx < width {
            let mut count = [0u8; 1];
            reader.read_exact(&mut count)?;
            let count = count[0] as usize;
            if count > 128 {
                let run = count - 128;
                if idx + run > width {
                    return Err(invalid("HDR RLE run overflows scanline"));
                }
                let mut value = [0u8; 1];
                reader.read_exact(&mut value)?;
                channel[idx..idx + run].fill(value[0]);
                idx += run;
            } else {
                if count == 0 || idx + count > width {
                    return Err(invalid("HDR RLE literal overflows scanline"));
                }
                reader.read_exact(&mut channel[idx..idx + count])?;
                idx += count;
            }
        }

        for (x, &v) in channel.iter().enumerate() {
            out[x * 4 + c] = v;
        }
    }
    Ok(())
}

/// Converts one RGBE quadruplet to linear floats.
#[inline]
pub fn rgbe_to_f32(r: u8, g: u8, b: u8, e: u8) -> [f32; 3] {
    if e == 0 {
        return [0.0; 3];
    }
    let f = 2.0_f32.powi(e as i32 - 136);
    [r as f32 * f, g as f32 * f, b as f32 * f]
}

fn parse_resolution(line: &str) -> Option<(usize, usize)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 {
        return None;
    }

    let mut width = 0usize;
    let mut height = 0usize;
    for pair in parts.chunks_exact(2) {
        let value: usize = pair[1].parse().ok()?;
        if pair[0].ends_with('X') {
            width = value;
        } else if pair[0].ends_with('Y') {
            height = value;
        }
    }

    (width > 0 && height > 0).then_some((width, height))
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

// ============================================================================
// Writing
// ============================================================================

/// Writes interleaved float pixels as an RLE Radiance HDR file.
///
/// `pixels` holds `channels` samples per pixel. The first three channels are
/// written as RGB; one- or two-channel input is written as grey.
pub fn write(path: &Path, width: usize, height: usize, channels: usize, pixels: &[f32]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_to(&mut writer, width, height, channels, pixels)?;
    writer.flush()?;
    Ok(())
}

/// Same as [`write`], targeting any writer.
pub fn write_to<W: Write>(writer: &mut W, width: usize, height: usize, channels: usize, pixels: &[f32]) -> Result<()> {
    if channels == 0 || width == 0 || height == 0 || pixels.len() != width * height * channels {
        return Err(Error::invalid_image(format!(
            "expected {} samples for {width}x{height}x{channels}, got {}",
            width * height * channels,
            pixels.len()
        )));
    }

    writeln!(writer, "{HDR_MAGIC}RADIANCE")?;
    writeln!(writer, "FORMAT=32-bit_rle_rgbe")?;
    writeln!(writer, "SOFTWARE=hdrv {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(writer)?;
    writeln!(writer, "-Y {height} +X {width}")?;

    let use_rle = (8..=MAX_RLE_WIDTH).contains(&width);
    let mut scanline = vec![0u8; width * 4];
    for row in pixels.chunks_exact(width * channels) {
        for (x, px) in row.chunks_exact(channels).enumerate() {
            let rgbe = if channels >= 3 {
                f32_to_rgbe(px[0], px[1], px[2])
            } else {
                f32_to_rgbe(px[0], px[0], px[0])
            };
            scanline[x * 4..x * 4 + 4].copy_from_slice(&rgbe);
        }

        if use_rle {
            writer.write_all(&[2, 2, (width >> 8) as u8, (width & 0xff) as u8])?;
            encode_rle_scanline(writer, width, &scanline)?;
        } else {
            writer.write_all(&scanline)?;
        }
    }
    Ok(())
}

fn encode_rle_scanline<W: Write>(writer: &mut W, width: usize, scanline: &[u8]) -> io::Result<()> {
    let mut channel = vec![0u8; width];
    for c in 0..4 {
        for (x, v) in channel.iter_mut().enumerate() {
            *v = scanline[x * 4 + c];
        }
        writer.write_all(&encode_rle_channel(&channel))?;
    }
    Ok(())
}

fn encode_rle_channel(data: &[u8]) -> Vec<u8> {
    let run_at = |i: usize| {
        let mut run = 1usize;
        while i + run < data.len() && run < 127 && data[i] == data[i + run] {
            run += 1;
        }
        run
    };

    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0usize;
    while i < data.len() {
        let run = run_at(i);
        if run >= 4 {
            out.push((128 + run) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < data.len() && i - start < 128 && run_at(i) < 4 {
            i += 1;
        }
        out.push((i - start) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out
}

fn f32_to_rgbe(r: f32, g: f32, b: f32) -> [u8; 4] {
    // NaN.max(0.0) is 0.0, so non-finite negatives and NaNs encode as black.
    let r = r.max(0.0);
    let g = g.max(0.0);
    let b = b.max(0.0);
    let max = r.max(g).max(b);
    if max < 1.0e-32 || !max.is_finite() {
        return [0, 0, 0, 0];
    }

    let (m, e) = frexp(max);
    let scale = m * 256.0 / max;
    [
        (r * scale).clamp(0.0, 255.0) as u8,
        (g * scale).clamp(0.0, 255.0) as u8,
        (b * scale).clamp(0.0, 255.0) as u8,
        (e + 128).clamp(0, 255) as u8,
    ]
}

fn frexp(x: f32) -> (f32, i32) {
    let e = x.abs().log2().floor() as i32 + 1;
    (x / 2.0_f32.powi(e), e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn decode(bytes: &[u8]) -> io::Result<(usize, usize, Vec<u8>)> {
        let mut reader = Cursor::new(bytes);
        let (w, h) = read_header(&mut reader)?;
        Ok((w, h, read_rgbe(&mut reader, w, h)?))
    }

    #[test]
    fn parse_resolution_line() {
        assert_eq!(parse_resolution("-Y 2 +X 3"), Some((3, 2)));
        assert_eq!(parse_resolution("+X 4 -Y 5"), Some((4, 5)));
        assert_eq!(parse_resolution("-Y 0 +X 5"), None);
        assert_eq!(parse_resolution("-Y 2"), None);
    }

    #[test]
    fn rgbe_conversion() {
        assert_eq!(rgbe_to_f32(0, 0, 0, 0), [0.0; 3]);
        // Mantissa 128 with exponent 129 encodes 1.0.
        assert_eq!(rgbe_to_f32(128, 64, 0, 129), [1.0, 0.5, 0.0]);
        assert_eq!(f32_to_rgbe(1.0, 0.5, 0.0), [128, 64, 0, 129]);
        assert_eq!(f32_to_rgbe(-1.0, f32::NAN, 0.0), [0, 0, 0, 0]);
    }

    #[test]
    fn rle_channel_runs_and_literals() {
        let data = [7u8, 7, 7, 7, 7, 1, 2, 3];
        let encoded = encode_rle_channel(&data);
        assert_eq!(encoded, vec![128 + 5, 7, 3, 1, 2, 3]);
    }

    #[test]
    fn hdr_write_then_decode_rle() {
        let (w, h) = (16, 2);
        let pixels: Vec<f32> = (0..w * h * 3).map(|i| (i % 7) as f32 * 0.25).collect();
        let mut bytes = Vec::new();
        write_to(&mut bytes, w, h, 3, &pixels).unwrap();

        let (dw, dh, rgbe) = decode(&bytes).unwrap();
        assert_eq!((dw, dh), (w, h));
        for (i, px) in rgbe.chunks_exact(4).enumerate() {
            let rgb = rgbe_to_f32(px[0], px[1], px[2], px[3]);
            for c in 0..3 {
                assert_relative_eq!(rgb[c], pixels[i * 3 + c], epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn hdr_flat_scanlines_below_rle_width() {
        let pixels = vec![0.5f32; 4 * 3 * 3];
        let mut bytes = Vec::new();
        write_to(&mut bytes, 4, 3, 3, &pixels).unwrap();
        let (_, _, rgbe) = decode(&bytes).unwrap();
        assert_eq!(rgbe.len(), 4 * 3 * 4);
        assert_eq!(rgbe_to_f32(rgbe[0], rgbe[1], rgbe[2], rgbe[3]), [0.5; 3]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let pixels = vec![1.0f32; 16 * 4 * 3];
        let mut bytes = Vec::new();
        write_to(&mut bytes, 16, 4, 3, &pixels).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn zero_length_literal_is_rejected() {
        let mut bytes = b"#?RADIANCE\n\n-Y 1 +X 8\n".to_vec();
        bytes.extend_from_slice(&[2, 2, 0, 8, 0]);
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn overflowing_resolution_is_rejected() {
        let side = usize::MAX / 2;
        let err = read_rgbe(&mut Cursor::new(&[][..]), side, side).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(min_payload_len(side, side), None);
    }

    #[test]
    fn payload_bounds() {
        assert_eq!(min_payload_len(4, 3), Some(48));
        // RLE-eligible widths can be far smaller than the flat size.
        assert_eq!(min_payload_len(254, 2), Some(2 * (4 + 16)));
        assert_eq!(min_payload_len(0x8000, 1), Some(0x8000 * 4));
    }

    #[test]
    fn write_rejects_wrong_sample_count() {
        let mut bytes = Vec::new();
        assert!(write_to(&mut bytes, 2, 2, 3, &[0.0; 5]).is_err());
    }
}
