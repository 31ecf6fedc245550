//! Pointwise comparison metrics.
//!
//! A metric maps a value and the co-located reference value to a difference
//! signal. The relative metrics divide by the reference magnitude plus
//! [`METRIC_EPSILON`], so a zero reference produces a large but finite
//! result.
//!
//! | Metric | Short | Formula |
//! |--------|-------|---------|
//! | Error | `E` | `v - r` |
//! | Absolute error | `AE` | `\|v - r\|` |
//! | Squared error | `SE` | `(v - r)²` |
//! | Relative absolute error | `RAE` | `\|v - r\| / (\|r\| + ε)` |
//! | Relative squared error | `RSE` | `(v - r)² / (r² + ε)` |

use std::fmt;
use std::str::FromStr;

use hdrv_core::Error;

/// Guards the relative metrics against division by zero.
pub const METRIC_EPSILON: f32 = 0.01;

/// Comparison metric applied between an image and its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    /// Signed difference.
    #[default]
    Error,
    /// Magnitude of the difference.
    AbsoluteError,
    /// Squared difference.
    SquaredError,
    /// Absolute difference relative to the reference magnitude.
    RelativeAbsoluteError,
    /// Squared difference relative to the squared reference.
    RelativeSquaredError,
}

impl Metric {
    /// Every metric, in menu order.
    pub const ALL: [Metric; 5] = [
        Metric::Error,
        Metric::AbsoluteError,
        Metric::SquaredError,
        Metric::RelativeAbsoluteError,
        Metric::RelativeSquaredError,
    ];

    /// Applies the metric to one sample.
    #[inline]
    pub fn apply(self, value: f32, reference: f32) -> f32 {
        let diff = value - reference;
        match self {
            Metric::Error => diff,
            Metric::AbsoluteError => diff.abs(),
            Metric::SquaredError => diff * diff,
            Metric::RelativeAbsoluteError => diff.abs() / (reference.abs() + METRIC_EPSILON),
            Metric::RelativeSquaredError => diff * diff / (reference * reference + METRIC_EPSILON),
        }
    }

    /// Abbreviation used on the command line and in the UI.
    pub fn short_name(self) -> &'static str {
        match self {
            Metric::Error => "E",
            Metric::AbsoluteError => "AE",
            Metric::SquaredError => "SE",
            Metric::RelativeAbsoluteError => "RAE",
            Metric::RelativeSquaredError => "RSE",
        }
    }

    /// Human readable name.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Error => "Error",
            Metric::AbsoluteError => "Absolute Error",
            Metric::SquaredError => "Squared Error",
            Metric::RelativeAbsoluteError => "Relative Absolute Error",
            Metric::RelativeSquaredError => "Relative Squared Error",
        }
    }
}

/// Free-function form of [`Metric::apply`].
#[inline]
pub fn apply_metric(value: f32, reference: f32, metric: Metric) -> f32 {
    metric.apply(value, reference)
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['_', ' '], "-").as_str() {
            "E" | "ERROR" => Ok(Metric::Error),
            "AE" | "ABSOLUTE-ERROR" => Ok(Metric::AbsoluteError),
            "SE" | "SQUARED-ERROR" => Ok(Metric::SquaredError),
            "RAE" | "RELATIVE-ABSOLUTE-ERROR" => Ok(Metric::RelativeAbsoluteError),
            "RSE" | "RELATIVE-SQUARED-ERROR" => Ok(Metric::RelativeSquaredError),
            _ => Err(Error::invalid_config(format!(
                "unknown metric '{s}' (expected E, AE, SE, RAE or RSE)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_formulas() {
        assert_eq!(Metric::Error.apply(3.0, 5.0), -2.0);
        assert_eq!(Metric::AbsoluteError.apply(3.0, 5.0), 2.0);
        assert_eq!(Metric::SquaredError.apply(3.0, 5.0), 4.0);
        assert_relative_eq!(Metric::RelativeAbsoluteError.apply(3.0, 5.0), 2.0 / 5.01);
        assert_relative_eq!(Metric::RelativeSquaredError.apply(3.0, 5.0), 4.0 / 25.01);
    }

    #[test]
    fn test_zero_reference_stays_finite() {
        let rae = apply_metric(5.0, 0.0, Metric::RelativeAbsoluteError);
        assert!(rae.is_finite());
        assert_relative_eq!(rae, 500.0, max_relative = 1e-5);

        let rse = apply_metric(5.0, 0.0, Metric::RelativeSquaredError);
        assert!(rse.is_finite());
        assert_relative_eq!(rse, 2500.0, max_relative = 1e-5);
    }

    #[test]
    fn test_parse() {
        assert_eq!("rae".parse::<Metric>().unwrap(), Metric::RelativeAbsoluteError);
        assert_eq!("Squared-Error".parse::<Metric>().unwrap(), Metric::SquaredError);
        assert_eq!("absolute_error".parse::<Metric>().unwrap(), Metric::AbsoluteError);
        assert!("mse".parse::<Metric>().is_err());
        for metric in Metric::ALL {
            assert_eq!(metric.to_string().parse::<Metric>().unwrap(), metric);
        }
    }

    proptest! {
        #[test]
        fn identical_inputs_have_zero_error(v in -1.0e6f32..1.0e6) {
            prop_assert_eq!(apply_metric(v, v, Metric::Error), 0.0);
            prop_assert_eq!(apply_metric(v, v, Metric::SquaredError), 0.0);
            prop_assert_eq!(apply_metric(v, v, Metric::AbsoluteError), 0.0);
            prop_assert_eq!(apply_metric(v, v, Metric::RelativeAbsoluteError), 0.0);
        }

        #[test]
        fn unsigned_metrics_are_non_negative(v in -1.0e3f32..1.0e3, r in -1.0e3f32..1.0e3) {
            for metric in [
                Metric::AbsoluteError,
                Metric::SquaredError,
                Metric::RelativeAbsoluteError,
                Metric::RelativeSquaredError,
            ] {
                let out = metric.apply(v, r);
                prop_assert!(out >= 0.0 && out.is_finite(), "{metric:?}({v}, {r}) = {out}");
            }
        }
    }
}
