//! Export targets for canvas output.
//!
//! The viewer can write what it displays in two forms: tonemapped 8-bit PNG
//! or linear Radiance HDR. The format is chosen from the file extension.

use std::path::Path;

use hdrv_core::{Error, Result};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// 8-bit sRGB PNG with alpha, fed from tonemapped LDR data.
    Png,
    /// Radiance RGBE, fed from linear HDR data.
    Hdr,
}

impl ExportFormat {
    /// Picks the format from `path`'s extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Ok(Self::Png),
            "hdr" | "pic" => Ok(Self::Hdr),
            _ => Err(Error::unsupported_format(path)),
        }
    }

    /// Whether the format stores tonemapped display values.
    pub fn is_ldr(self) -> bool {
        matches!(self, Self::Png)
    }
}

/// Writes interleaved 8-bit RGBA as PNG.
pub fn save_ldr(path: &Path, width: usize, height: usize, rgba: &[u8]) -> Result<()> {
    crate::png::write(path, width, height, rgba)
}

/// Writes interleaved float RGBA as Radiance HDR. Alpha is dropped.
pub fn save_hdr(path: &Path, width: usize, height: usize, rgba: &[f32]) -> Result<()> {
    crate::hdr::write(path, width, height, 4, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("out.PNG")).unwrap(), ExportFormat::Png);
        assert_eq!(ExportFormat::from_path(Path::new("a/b.hdr")).unwrap(), ExportFormat::Hdr);
        assert!(ExportFormat::from_path(Path::new("out.jpg")).unwrap_err().is_unsupported_format());
        assert!(ExportFormat::from_path(Path::new("noext")).is_err());
        assert!(ExportFormat::Png.is_ldr());
        assert!(!ExportFormat::Hdr.is_ldr());
    }
}
