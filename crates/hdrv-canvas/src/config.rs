//! Display configuration.

use hdrv_core::{Error, Result};

use crate::metric::Metric;
use crate::tonemap::{apply_exposure_and_offset, apply_tonemap, Tonemap};

/// Everything the interactive thread can tweak about how pixels are shown.
///
/// `Copy`, so background tasks take a snapshot instead of sharing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayConfig {
    /// Exposure in stops.
    pub exposure: f32,
    /// Constant added after exposure.
    pub offset: f32,
    /// Gamma of the [`Tonemap::Gamma`] operator.
    pub gamma: f32,
    /// Display transform.
    pub tonemap: Tonemap,
    /// Comparison metric used when a reference image is set.
    pub metric: Metric,
    /// Clamp displayed values to `[0, 1]`.
    pub clip_to_ldr: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            offset: 0.0,
            gamma: 2.2,
            tonemap: Tonemap::Srgb,
            metric: Metric::Error,
            clip_to_ldr: false,
        }
    }
}

impl DisplayConfig {
    /// Checks that the gamma is usable.
    pub fn validate(&self) -> Result<()> {
        validate_gamma(self.gamma)
    }

    /// Applies exposure and offset to a colour sample, then clips if enabled.
    #[inline]
    pub fn adjust(&self, value: f32) -> f32 {
        let v = apply_exposure_and_offset(value, self.exposure, self.offset);
        if self.clip_to_ldr { v.clamp(0.0, 1.0) } else { v }
    }

    /// Full display transform of one linear RGB triple.
    pub fn display_rgb(&self, rgb: [f32; 3]) -> [f32; 3] {
        let adjusted = rgb.map(|v| apply_exposure_and_offset(v, self.exposure, self.offset));
        let out = apply_tonemap(adjusted, self.gamma, self.tonemap);
        if self.clip_to_ldr { out.map(|v| v.clamp(0.0, 1.0)) } else { out }
    }
}

pub(crate) fn validate_gamma(gamma: f32) -> Result<()> {
    if gamma.is_finite() && gamma > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(format!("gamma must be positive and finite, got {gamma}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DisplayConfig::default();
        assert_eq!(config.gamma, 2.2);
        assert_eq!(config.tonemap, Tonemap::Srgb);
        assert_eq!(config.metric, Metric::Error);
        assert!(!config.clip_to_ldr);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gamma_validation() {
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let config = DisplayConfig { gamma: bad, ..Default::default() };
            assert!(config.validate().is_err(), "gamma {bad} accepted");
        }
    }

    #[test]
    fn test_clip() {
        let mut config = DisplayConfig { exposure: 2.0, ..Default::default() };
        assert_eq!(config.adjust(0.5), 2.0);
        config.clip_to_ldr = true;
        assert_eq!(config.adjust(0.5), 1.0);
        assert_eq!(config.adjust(-0.5), 0.0);

        config.tonemap = Tonemap::Gamma;
        assert_eq!(config.display_rgb([1.0, -1.0, 0.0]), [1.0, 0.0, 0.0]);
    }
}
