use crate::error::{DeviceError, Result};

/// Reject `value` unless it is finite and inside `[min, max]`.
#[inline]
pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(DeviceError::Validation {
            field,
            value,
            min,
            max,
        })
    }
}

/// Reject non-finite or non-positive volumes.
#[inline]
pub fn check_volume(volume: f64) -> Result<f64> {
    if volume.is_finite() && volume > 0.0 {
        Ok(volume)
    } else {
        Err(DeviceError::InvalidVolume(volume))
    }
}

/// Fraction of nominal flow capacity achieved at a drive frequency.
///
/// Flat at 1.0 across 100..=150 Hz, falling linearly to 0.5 at 0 Hz below that
/// band and to 0.5 at 800 Hz above it.
#[inline]
pub fn frequency_factor(hz: f64) -> f64 {
    if hz < 100.0 {
        0.5 + 0.5 * (hz / 100.0)
    } else if hz > 150.0 {
        1.0 - 0.5 * ((hz - 150.0) / 650.0).min(1.0)
    } else {
        1.0
    }
}
