//! Display transforms.
//!
//! Exposure and offset are applied first (`2^exposure * v + offset`), then one
//! of the [`Tonemap`] operators maps linear RGB to display values:
//!
//! - **SRGB** - the IEC 61966-2-1 encoding curve, per channel
//! - **Gamma** - `sign(v) * |v|^(1/gamma)`, per channel
//! - **FalseColor** - the mean of the channels on a log2 axis through the
//!   Turbo colour ramp
//! - **PositiveNegative** - negative magnitude in red, positive in green
//!
//! Values outside `[0, 1]` survive the operators unless clipping is enabled
//! in the [`DisplayConfig`](crate::DisplayConfig).

use std::fmt;
use std::str::FromStr;

use hdrv_core::transfer::linear_to_srgb;
use hdrv_core::Error;

/// Tonemapping operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tonemap {
    /// Standard sRGB encoding.
    #[default]
    Srgb,
    /// Power curve with the configured gamma.
    Gamma,
    /// Logarithmic magnitude through a colour ramp.
    FalseColor,
    /// Diverging red (negative) / green (positive) map.
    PositiveNegative,
}

impl Tonemap {
    /// Every operator, in menu order.
    pub const ALL: [Tonemap; 4] = [
        Tonemap::Srgb,
        Tonemap::Gamma,
        Tonemap::FalseColor,
        Tonemap::PositiveNegative,
    ];

    /// Abbreviation used on the command line.
    pub fn short_name(self) -> &'static str {
        match self {
            Tonemap::Srgb => "SRGB",
            Tonemap::Gamma => "GAMMA",
            Tonemap::FalseColor => "FC",
            Tonemap::PositiveNegative => "PN",
        }
    }

    /// Human readable name.
    pub fn label(self) -> &'static str {
        match self {
            Tonemap::Srgb => "sRGB",
            Tonemap::Gamma => "Gamma",
            Tonemap::FalseColor => "False-color",
            Tonemap::PositiveNegative => "Positive / negative",
        }
    }
}

impl fmt::Display for Tonemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Tonemap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['_', ' '], "-").as_str() {
            "SRGB" => Ok(Tonemap::Srgb),
            "GAMMA" => Ok(Tonemap::Gamma),
            "FC" | "FALSE-COLOR" | "FALSECOLOR" => Ok(Tonemap::FalseColor),
            "PN" | "POSITIVE-NEGATIVE" => Ok(Tonemap::PositiveNegative),
            _ => Err(Error::invalid_config(format!(
                "unknown tonemap '{s}' (expected SRGB, GAMMA, FC or PN)"
            ))),
        }
    }
}

/// `2^exposure * value + offset`.
#[inline]
pub fn apply_exposure_and_offset(value: f32, exposure: f32, offset: f32) -> f32 {
    exposure.exp2() * value + offset
}

/// Maps one linear RGB triple to display values.
pub fn apply_tonemap(rgb: [f32; 3], gamma: f32, mode: Tonemap) -> [f32; 3] {
    match mode {
        Tonemap::Srgb => rgb.map(linear_to_srgb),
        Tonemap::Gamma => {
            let inv = 1.0 / gamma;
            rgb.map(|v| v.signum() * v.abs().powf(inv))
        }
        Tonemap::FalseColor => {
            let mean = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
            false_color((mean + 0.03125).log2() / 10.0 + 0.5)
        }
        Tonemap::PositiveNegative => {
            let negative = rgb.iter().map(|v| v.min(0.0)).sum::<f32>() / 3.0;
            let positive = rgb.iter().map(|v| v.max(0.0)).sum::<f32>() / 3.0;
            [-2.0 * negative, 2.0 * positive, 0.0]
        }
    }
}

/// Turbo colour ramp, polynomial approximation.
///
/// `x` is clamped to `[0, 1]`; NaN maps to the start of the ramp.
pub fn false_color(x: f32) -> [f32; 3] {
    const RED: ([f32; 4], [f32; 2]) = (
        [0.135_721_38, 4.615_392_6, -42.660_324, 132.131_08],
        [-152.942_4, 59.286_38],
    );
    const GREEN: ([f32; 4], [f32; 2]) = (
        [0.091_402_61, 2.194_188_4, 4.842_966_6, -14.185_033],
        [4.277_298_7, 2.829_566],
    );
    const BLUE: ([f32; 4], [f32; 2]) = (
        [0.106_673_3, 12.641_946, -60.582_047, 110.362_77],
        [-89.903_11, 27.348_25],
    );

    let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
    let x2 = x * x;
    let v4 = [1.0, x, x2, x2 * x];
    let v2 = [x2 * x2, x2 * x2 * x];
    let eval = |(c4, c2): ([f32; 4], [f32; 2])| {
        let value = c4.iter().zip(v4).map(|(c, v)| c * v).sum::<f32>() + c2[0] * v2[0] + c2[1] * v2[1];
        value.clamp(0.0, 1.0)
    };
    [eval(RED), eval(GREEN), eval(BLUE)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    // The sRGB curve's two segments meet with a step of a few 1e-8.
    const SEAM: f32 = 1e-6;

    #[test]
    fn test_srgb_endpoints() {
        let out = apply_tonemap([0.0, 1.0, 0.18], 2.2, Tonemap::Srgb);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(out[2], 0.4614, epsilon = 1e-3);
    }

    #[test]
    fn test_gamma_preserves_sign() {
        let out = apply_tonemap([4.0, -4.0, 0.0], 2.0, Tonemap::Gamma);
        assert_relative_eq!(out[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(out[1], -2.0, epsilon = 1e-6);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn test_positive_negative() {
        let out = apply_tonemap([-0.3, 0.6, 0.0], 2.2, Tonemap::PositiveNegative);
        assert_relative_eq!(out[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(out[1], 0.4, epsilon = 1e-6);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn test_false_color_ramp() {
        // Blue in the lower range, green in the middle, red at the top.
        let low = false_color(0.0);
        let blue = false_color(0.1);
        assert!(blue[2] > blue[0] && blue[2] > blue[1]);
        let green = false_color(0.5);
        assert!(green[1] > green[0] && green[1] > green[2]);
        let high = false_color(1.0);
        assert!(high[0] > high[1] && high[0] > high[2]);
        assert!(low.iter().all(|&v| v < 0.2));
        assert_eq!(false_color(f32::NAN), low);
        assert_eq!(false_color(-3.0), low);

        // A mean of 1 sits slightly above the middle of the log axis.
        let mid = apply_tonemap([1.0, 1.0, 1.0], 2.2, Tonemap::FalseColor);
        assert_eq!(mid, false_color((1.03125f32).log2() / 10.0 + 0.5));
        for v in mid {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_exposure_and_offset() {
        assert_eq!(apply_exposure_and_offset(0.5, 1.0, 0.0), 1.0);
        assert_eq!(apply_exposure_and_offset(0.5, -1.0, 0.25), 0.5);
        assert_eq!(apply_exposure_and_offset(2.0, 0.0, -1.0), 1.0);
    }

    #[test]
    fn test_parse() {
        assert_eq!("fc".parse::<Tonemap>().unwrap(), Tonemap::FalseColor);
        assert_eq!("Positive-Negative".parse::<Tonemap>().unwrap(), Tonemap::PositiveNegative);
        assert!("aces".parse::<Tonemap>().is_err());
        for mode in Tonemap::ALL {
            assert_eq!(mode.to_string().parse::<Tonemap>().unwrap(), mode);
        }
    }

    proptest! {
        #[test]
        fn srgb_is_monotonic(a in 0.0f32..100.0, b in 0.0f32..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let out_lo = apply_tonemap([lo; 3], 2.2, Tonemap::Srgb);
            let out_hi = apply_tonemap([hi; 3], 2.2, Tonemap::Srgb);
            for c in 0..3 {
                prop_assert!(out_hi[c] + SEAM >= out_lo[c]);
            }
        }

        #[test]
        fn gamma_is_monotonic(a in 0.0f32..100.0, b in 0.0f32..100.0, gamma in 0.1f32..8.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let out_lo = apply_tonemap([lo; 3], gamma, Tonemap::Gamma);
            let out_hi = apply_tonemap([hi; 3], gamma, Tonemap::Gamma);
            for c in 0..3 {
                prop_assert!(out_hi[c] >= out_lo[c]);
            }
        }
    }
}
