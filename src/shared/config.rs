// This is free and unencumbered software released into the public domain.

use crate::shared::DEFAULT_EXPOSURE_SECONDS;
use derive_more::Display;
use std::path::PathBuf;

/// Target capture format: 3840×2160 at 60 fps.
pub const TARGET_WIDTH: u32 = 3840;
pub const TARGET_HEIGHT: u32 = 2160;
pub const TARGET_FPS: f64 = 60.0;

/// How the host lays out the capture screen.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum LayoutVariant {
    /// Full-screen controller with right-aligned sliders; the preview is
    /// rotated a quarter turn counter-clockwise.
    #[default]
    #[display("standalone")]
    Standalone,
    /// Controller embedded in a declarative view that fills the safe area
    /// and handles orientation itself.
    #[display("embedded")]
    Embedded,
}

impl LayoutVariant {
    /// Preview layer rotation in radians.
    pub fn rotation_offset(&self) -> f64 {
        match self {
            LayoutVariant::Standalone => -core::f64::consts::FRAC_PI_2,
            LayoutVariant::Embedded => 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Unique ID or localized name; `None` picks the default video device.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub layout: LayoutVariant,
    pub default_exposure_seconds: f64,
    pub rotation_offset: f64,
    pub recording_dir: PathBuf,
    pub event_buffer: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::for_layout(LayoutVariant::default())
    }
}

impl CameraConfig {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            ..Default::default()
        }
    }

    pub fn for_layout(layout: LayoutVariant) -> Self {
        Self {
            device: None,
            width: TARGET_WIDTH,
            height: TARGET_HEIGHT,
            fps: TARGET_FPS,
            layout,
            default_exposure_seconds: DEFAULT_EXPOSURE_SECONDS,
            rotation_offset: layout.rotation_offset(),
            recording_dir: std::env::temp_dir(),
            event_buffer: 16,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Switches layout and resets the rotation offset to the layout's own.
    pub fn with_layout(mut self, layout: LayoutVariant) -> Self {
        self.layout = layout;
        self.rotation_offset = layout.rotation_offset();
        self
    }

    pub fn with_default_exposure(mut self, seconds: f64) -> Self {
        self.default_exposure_seconds = seconds;
        self
    }

    pub fn with_rotation_offset(mut self, radians: f64) -> Self {
        self.rotation_offset = radians;
        self
    }

    pub fn with_recording_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recording_dir = dir.into();
        self
    }

    pub fn with_event_buffer(mut self, n: usize) -> Self {
        self.event_buffer = n.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_4k60() {
        let config = CameraConfig::default();
        assert_eq!((config.width, config.height), (3840, 2160));
        assert_eq!(config.fps, 60.0);
        assert_eq!(config.default_exposure_seconds, 0.002);
        assert_eq!(config.layout, LayoutVariant::Standalone);
    }

    #[test]
    fn layout_sets_rotation() {
        let config = CameraConfig::default().with_layout(LayoutVariant::Embedded);
        assert_eq!(config.rotation_offset, 0.0);
        let config = config.with_layout(LayoutVariant::Standalone);
        assert!((config.rotation_offset + core::f64::consts::FRAC_PI_2).abs() < 1e-12);
        let config = config.with_rotation_offset(1.0);
        assert_eq!(config.rotation_offset, 1.0);
    }
}
