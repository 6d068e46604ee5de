// This is free and unencumbered software released into the public domain.

use crate::shared::CameraError;

/// Added to the device's shortest exposure to form the slider minimum.
pub const EXPOSURE_FLOOR_MARGIN: f64 = 0.0001;

/// The slider maximum is the device's longest exposure divided by this.
pub const EXPOSURE_CEILING_DIVISOR: f64 = 200.0;

/// A closed `[minimum, maximum]` interval reported by a capture device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureRange {
    pub minimum: f64,
    pub maximum: f64,
}

impl CaptureRange {
    pub fn new(minimum: f64, maximum: f64) -> Result<Self, CameraError> {
        if !minimum.is_finite() || !maximum.is_finite() {
            return Err(CameraError::invalid_config(format!(
                "range bounds must be finite, got [{minimum}, {maximum}]"
            )));
        }
        if minimum > maximum {
            return Err(CameraError::invalid_config(format!(
                "range minimum {minimum} exceeds maximum {maximum}"
            )));
        }
        Ok(Self { minimum, maximum })
    }

    /// The lens position range shared by every device.
    pub const fn unit() -> Self {
        Self {
            minimum: 0.0,
            maximum: 1.0,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.minimum;
        }
        value.clamp(self.minimum, self.maximum)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.minimum <= value && value <= self.maximum
    }

    pub fn is_degenerate(&self) -> bool {
        self.minimum >= self.maximum
    }

    /// Narrows a device exposure-duration range (seconds) to the range a
    /// handheld exposure slider works in.
    ///
    /// The result is `[minimum + 0.0001, maximum / 200]`. When a device's
    /// ceiling is so short that the upper bound would fall below the lower
    /// one, the range collapses to the lower bound.
    pub fn exposure_slider(&self) -> Self {
        let minimum = self.minimum + EXPOSURE_FLOOR_MARGIN;
        let maximum = self.maximum / EXPOSURE_CEILING_DIVISOR;
        Self {
            minimum,
            maximum: maximum.max(minimum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(matches!(
            CaptureRange::new(10.0, 1.0),
            Err(CameraError::InvalidConfig(_))
        ));
        assert!(CaptureRange::new(f64::NAN, 1.0).is_err());
        assert!(CaptureRange::new(5.0, 5.0).is_ok());
    }

    #[test]
    fn clamps_to_nearest_bound() {
        let iso = CaptureRange::new(32.0, 3200.0).unwrap();
        assert_eq!(iso.clamp(4000.0), 3200.0);
        assert_eq!(iso.clamp(1.0), 32.0);
        assert_eq!(iso.clamp(100.0), 100.0);
        assert_eq!(iso.clamp(f64::NAN), 32.0);
    }

    #[test]
    fn derives_exposure_slider_range() {
        let device = CaptureRange::new(0.00005, 1.0).unwrap();
        let slider = device.exposure_slider();
        assert!(approx(slider.minimum, 0.00015));
        assert!(approx(slider.maximum, 0.005));
        assert!(slider.minimum < slider.maximum);
    }

    #[test]
    fn exposure_slider_is_non_empty_for_realistic_ceilings() {
        for max in [0.05, 0.5, 1.0, 30.0] {
            let device = CaptureRange::new(0.000_014, max).unwrap();
            let slider = device.exposure_slider();
            assert!(slider.minimum < slider.maximum, "ceiling {max}");
        }
    }

    #[test]
    fn exposure_slider_collapses_for_tiny_ceilings() {
        let device = CaptureRange::new(0.001, 0.01).unwrap();
        let slider = device.exposure_slider();
        assert!(slider.is_degenerate());
        assert!(approx(slider.maximum, slider.minimum));
    }
}
