//! Ground-truth labels from sampling temperature
//!
//! A sample is labelled LOW when `t <= low_max` and HIGH when `t >= high_min`.
//! Temperatures strictly between the two thresholds fall in the indeterminate
//! band and are excluded from every evaluation.
//!
//! ```
//! use introspection::core::label::{derive_label, Thresholds};
//! use introspection::core::Judgment;
//!
//! let thresholds = Thresholds::new(0.5, 0.8).unwrap();
//! assert_eq!(thresholds.label(0.2), Some(Judgment::Low));
//! assert_eq!(thresholds.label(0.6), None);
//! assert_eq!(derive_label(1.0, 0.5, 0.8), Some(Judgment::High));
//! ```

use crate::core::model::Judgment;
use serde::{Deserialize, Serialize};

/// Default upper bound of the LOW band
pub const DEFAULT_LOW_MAX: f64 = 0.5;

/// Default lower bound of the HIGH band
pub const DEFAULT_HIGH_MIN: f64 = 0.8;

/// Invalid threshold pair
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdError {
    /// One of the thresholds is NaN or infinite
    NotFinite { low_max: f64, high_min: f64 },
    /// `low_max` must be strictly smaller than `high_min`
    Overlapping { low_max: f64, high_min: f64 },
}

impl std::fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdError::NotFinite { low_max, high_min } => write!(
                f,
                "thresholds must be finite (low-max={}, high-min={})",
                low_max, high_min
            ),
            ThresholdError::Overlapping { low_max, high_min } => write!(
                f,
                "low-max ({}) must be smaller than high-min ({})",
                low_max, high_min
            ),
        }
    }
}

impl std::error::Error for ThresholdError {}

/// Classify a temperature against explicit thresholds
///
/// Callers are expected to have validated `low_max < high_min`; use
/// [`Thresholds`] to get that check for free.
pub fn derive_label(temperature: f64, low_max: f64, high_min: f64) -> Option<Judgment> {
    if temperature <= low_max {
        Some(Judgment::Low)
    } else if temperature >= high_min {
        Some(Judgment::High)
    } else {
        None
    }
}

/// A validated threshold pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    low_max: f64,
    high_min: f64,
}

impl Thresholds {
    /// Validate and build a threshold pair
    pub fn new(low_max: f64, high_min: f64) -> Result<Self, ThresholdError> {
        if !low_max.is_finite() || !high_min.is_finite() {
            return Err(ThresholdError::NotFinite { low_max, high_min });
        }
        if low_max >= high_min {
            return Err(ThresholdError::Overlapping { low_max, high_min });
        }
        Ok(Self { low_max, high_min })
    }

    pub fn low_max(&self) -> f64 {
        self.low_max
    }

    pub fn high_min(&self) -> f64 {
        self.high_min
    }

    /// Label a temperature, or `None` inside the indeterminate band
    pub fn label(&self, temperature: f64) -> Option<Judgment> {
        derive_label(temperature, self.low_max, self.high_min)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_max: DEFAULT_LOW_MAX,
            high_min: DEFAULT_HIGH_MIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(derive_label(0.5, 0.5, 0.8), Some(Judgment::Low));
        assert_eq!(derive_label(0.8, 0.5, 0.8), Some(Judgment::High));
    }

    #[test]
    fn test_band_is_excluded() {
        for t in [0.51, 0.6, 0.7, 0.79] {
            assert_eq!(derive_label(t, 0.5, 0.8), None, "t={}", t);
        }
    }

    #[test]
    fn test_extremes() {
        assert_eq!(derive_label(0.0, 0.5, 0.8), Some(Judgment::Low));
        assert_eq!(derive_label(2.0, 0.5, 0.8), Some(Judgment::High));
    }

    #[test]
    fn test_rejects_overlapping_thresholds() {
        let err = Thresholds::new(0.8, 0.5).unwrap_err();
        assert!(matches!(err, ThresholdError::Overlapping { .. }));
        assert!(Thresholds::new(0.5, 0.5).is_err());
    }

    #[test]
    fn test_rejects_nan() {
        assert!(matches!(
            Thresholds::new(f64::NAN, 0.8),
            Err(ThresholdError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.low_max(), 0.5);
        assert_eq!(t.high_min(), 0.8);
    }
}
