//! sRGB transfer functions.
//!
//! PNG loading decodes 8/16-bit sRGB samples to linear light with
//! [`srgb_to_linear`]; the SRGB tonemap encodes linear values for display
//! with [`linear_to_srgb`].
//!
//! # Reference
//!
//! IEC 61966-2-1:1999

/// sRGB EOTF: decodes an sRGB-encoded value to linear light.
///
/// ```text
/// if V <= 0.04045:  L = V / 12.92
/// else:             L = ((V + 0.055) / 1.055)^2.4
/// ```
///
/// ```rust
/// use hdrv_core::transfer::srgb_to_linear;
///
/// assert!((srgb_to_linear(0.5) - 0.214).abs() < 0.01);
/// ```
#[inline]
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB OETF: encodes linear light as sRGB.
///
/// ```text
/// if L <= 0.0031308:  V = L * 12.92
/// else:               V = 1.055 * L^(1/2.4) - 0.055
/// ```
///
/// Negative inputs stay on the linear segment, so the curve is monotonic over
/// the whole real line.
#[inline]
pub fn linear_to_srgb(l: f32) -> f32 {
    if l <= 0.0031308 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

/// Linear values of all 256 8-bit sRGB codes.
pub fn srgb8_to_linear_table() -> [f32; 256] {
    std::array::from_fn(|i| srgb_to_linear(i as f32 / 255.0))
}
