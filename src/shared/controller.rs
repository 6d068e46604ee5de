// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraError, CaptureDevice, CaptureRange, ParameterKind, ParameterSetting, snap_focus,
    with_configuration_lock,
};
use core::time::Duration;
use dogma::Named;
use std::sync::{Arc, RwLock};

/// Receives the formatted label text after every successful change.
pub type LabelSink = Arc<dyn Fn(ParameterKind, &str) + Send + Sync + 'static>;

/// Translates UI control positions into device focus, ISO, and exposure
/// settings.
///
/// Ranges are read from the device on every call, so they follow changes of
/// the active capture format. A failed configuration lock is returned to the
/// caller and no label is published, keeping labels in step with the device.
pub struct ParameterController {
    device: Arc<dyn CaptureDevice>,
    sinks: RwLock<Vec<LabelSink>>,
}

impl core::fmt::Debug for ParameterController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParameterController")
            .field("device", &self.device.name())
            .finish_non_exhaustive()
    }
}

impl ParameterController {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &Arc<dyn CaptureDevice> {
        &self.device
    }

    pub fn add_label_sink(&self, sink: LabelSink) {
        if let Ok(mut g) = self.sinks.write() {
            g.push(sink);
        }
    }

    /// Registers a sink for a single parameter.
    pub fn on_label(&self, kind: ParameterKind, f: impl Fn(&str) + Send + Sync + 'static) {
        self.add_label_sink(Arc::new(move |k, text| {
            if k == kind {
                f(text)
            }
        }));
    }

    /// Always `[0, 1]`.
    pub fn focus_range(&self) -> CaptureRange {
        self.device.active_range(ParameterKind::FocusPosition)
    }

    pub fn iso_range(&self) -> CaptureRange {
        self.device.active_range(ParameterKind::Iso)
    }

    /// The device's full exposure-duration range, in seconds.
    pub fn device_exposure_range(&self) -> CaptureRange {
        self.device.active_range(ParameterKind::ExposureDuration)
    }

    /// The narrowed exposure range the slider should span, in seconds.
    pub fn exposure_range(&self) -> CaptureRange {
        self.device_exposure_range().exposure_slider()
    }

    pub fn slider_range(&self, kind: ParameterKind) -> CaptureRange {
        match kind {
            ParameterKind::Iso => self.iso_range(),
            ParameterKind::ExposureDuration => self.exposure_range(),
            ParameterKind::FocusPosition => self.focus_range(),
        }
    }

    /// Current device values, in `ParameterKind::ALL` order.
    pub fn settings(&self) -> [ParameterSetting; 3] {
        ParameterKind::ALL.map(|kind| ParameterSetting::new(kind, self.device.current_value(kind)))
    }

    pub fn set(&self, kind: ParameterKind, raw: f64) -> Result<f64, CameraError> {
        match kind {
            ParameterKind::Iso => self.set_iso(raw),
            ParameterKind::ExposureDuration => self.set_exposure_duration(raw),
            ParameterKind::FocusPosition => self.set_focus(raw),
        }
    }

    /// Snaps `raw` to the 1/50 grid and applies it as a locked lens position.
    pub fn set_focus(&self, raw: f64) -> Result<f64, CameraError> {
        let value = snap_focus(raw);
        self.apply(ParameterKind::FocusPosition, value, |d| d.set_focus_locked(value))
    }

    /// Applies a custom exposure with the new ISO and the current duration.
    pub fn set_iso(&self, raw: f64) -> Result<f64, CameraError> {
        let value = self.iso_range().clamp(raw);
        self.apply(ParameterKind::Iso, value, |d| {
            let range = d.active_range(ParameterKind::ExposureDuration);
            let seconds = range.clamp(d.current_value(ParameterKind::ExposureDuration));
            d.set_custom_exposure(Duration::from_secs_f64(seconds), value)
        })
    }

    /// Applies a custom exposure with the new duration and the current ISO.
    pub fn set_exposure_duration(&self, seconds: f64) -> Result<f64, CameraError> {
        let device_range = self.device_exposure_range();
        let value = device_range.clamp(device_range.exposure_slider().clamp(seconds));
        self.apply(ParameterKind::ExposureDuration, value, |d| {
            let iso = d.active_range(ParameterKind::Iso).clamp(d.current_value(ParameterKind::Iso));
            d.set_custom_exposure(Duration::from_secs_f64(value), iso)
        })
    }

    /// Sends the label for `setting` to every sink.
    pub fn publish(&self, setting: ParameterSetting) {
        let text = setting.label();
        // sinks may register further sinks, so none run under the lock
        let list: Vec<LabelSink> = match self.sinks.read() {
            Ok(g) => g.clone(),
            Err(_) => return,
        };
        for s in list.iter() {
            (s)(setting.kind, &text);
        }
    }

    fn apply(
        &self,
        kind: ParameterKind,
        value: f64,
        write: impl FnOnce(&dyn CaptureDevice) -> Result<(), CameraError>,
    ) -> Result<f64, CameraError> {
        match with_configuration_lock(self.device.as_ref(), write) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                asimov_module::tracing::debug!(target: "asimov_camera_module", parameter = %kind, value, "applied");

                self.publish(ParameterSetting::new(kind, value));
                Ok(value)
            },
            Err(err) => {
                #[cfg(feature = "tracing")]
                asimov_module::tracing::warn!(target: "asimov_camera_module", parameter = %kind, %err, "device configuration failed");

                Err(err)
            },
        }
    }
}
