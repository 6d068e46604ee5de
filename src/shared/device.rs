// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraError, CaptureRange, ParameterKind};
use core::time::Duration;
use scopeguard::defer;

/// Frame rates closer than this are considered equal.
const FRAME_RATE_TOLERANCE: f64 = 1e-3;

/// One capture format offered by a device.
///
/// ISO and exposure limits belong to the format, so switching the active
/// format can change them.
#[derive(Clone, Debug, PartialEq)]
pub struct FormatInfo {
    pub width: u32,
    pub height: u32,
    /// Upper bound of each supported frame-rate range.
    pub max_frame_rates: Vec<f64>,
    pub iso: CaptureRange,
    /// Exposure duration limits, in seconds.
    pub exposure: CaptureRange,
}

impl FormatInfo {
    pub fn supports(&self, width: u32, height: u32, fps: f64) -> bool {
        self.width == width
            && self.height == height
            && self
                .max_frame_rates
                .iter()
                .any(|rate| (rate - fps).abs() < FRAME_RATE_TOLERANCE)
    }
}

/// A handle to the hardware capture device.
///
/// Setters must only be called between `lock_for_configuration` and
/// `unlock_for_configuration`; use [`with_configuration_lock`] rather than
/// calling the pair directly.
pub trait CaptureDevice: dogma::Named + Send + Sync {
    /// Valid range for `kind` under the active format.
    fn active_range(&self, kind: ParameterKind) -> CaptureRange;

    /// Value the device currently applies for `kind`.
    fn current_value(&self, kind: ParameterKind) -> f64;

    fn formats(&self) -> Vec<FormatInfo>;

    fn supports_locked_focus(&self) -> bool {
        true
    }

    fn lock_for_configuration(&self) -> Result<(), CameraError>;

    fn unlock_for_configuration(&self);

    /// Activates `formats()[index]` and pins the frame duration to `1/fps`.
    fn set_active_format(&self, index: usize, fps: f64) -> Result<(), CameraError>;

    /// Switches focus to locked mode at the given lens position.
    fn set_focus_locked(&self, lens_position: f64) -> Result<(), CameraError>;

    /// Switches exposure to custom mode with the given duration and ISO.
    fn set_custom_exposure(&self, duration: Duration, iso: f64) -> Result<(), CameraError>;
}

/// Runs `f` inside a scoped configuration transaction.
///
/// The device is unlocked on every exit path, including when `f` fails or
/// panics.
pub fn with_configuration_lock<T>(
    device: &dyn CaptureDevice,
    f: impl FnOnce(&dyn CaptureDevice) -> Result<T, CameraError>,
) -> Result<T, CameraError> {
    device.lock_for_configuration()?;
    defer! {
        device.unlock_for_configuration();
    }
    f(device)
}

/// Finds the first format with exactly `width`×`height` and a frame-rate
/// range topping out at `fps`.
pub fn find_format(formats: &[FormatInfo], width: u32, height: u32, fps: f64) -> Option<usize> {
    formats.iter().position(|f| f.supports(width, height, fps))
}

/// Selects and activates the requested capture format.
pub fn apply_format(
    device: &dyn CaptureDevice,
    width: u32,
    height: u32,
    fps: f64,
) -> Result<FormatInfo, CameraError> {
    let formats = device.formats();
    let Some(index) = find_format(&formats, width, height, fps) else {
        return Err(CameraError::FormatUnavailable { width, height, fps });
    };

    with_configuration_lock(device, |d| d.set_active_format(index, fps))?;
    Ok(formats[index].clone())
}
