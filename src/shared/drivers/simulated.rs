// This is free and unencumbered software released into the public domain.

//! An in-process capture device and session used where no native backend is
//! available, and by the test suites.

use crate::shared::{
    CameraBackend, CameraError, CaptureBackend, CaptureDevice, CaptureRange, CapturedPhoto,
    Completer, FormatInfo, Orientation, ParameterKind, PhotoSettings, RecordedClip,
    RecordingSettings,
};
use alloc::borrow::Cow;
use core::time::Duration;
use std::{
    any::Any,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

const RANGE_TOLERANCE: f64 = 1e-9;

#[derive(Debug)]
struct DeviceState {
    active_format: usize,
    frame_rate: f64,
    locked: bool,
    iso: f64,
    exposure_seconds: f64,
    lens_position: f64,
    focus_locked: bool,
    exposure_custom: bool,
}

#[derive(Debug)]
pub struct SimulatedDevice {
    formats: Vec<FormatInfo>,
    state: Mutex<DeviceState>,
    fail_locks: AtomicBool,
    lock_count: AtomicUsize,
    locked_focus_supported: bool,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// A rear camera offering 1080p and 2160p formats, starting on 1080p.
    pub fn new() -> Self {
        Self::with_formats(default_formats())
    }

    /// A device with a single 2160p60 format reporting the given ranges.
    pub fn with_ranges(iso: CaptureRange, exposure: CaptureRange) -> Self {
        Self::with_formats(vec![FormatInfo {
            width: 3840,
            height: 2160,
            max_frame_rates: vec![60.0],
            iso,
            exposure,
        }])
    }

    /// An empty list falls back to the default formats.
    pub fn with_formats(formats: Vec<FormatInfo>) -> Self {
        let formats = if formats.is_empty() { default_formats() } else { formats };
        let first = &formats[0];
        let state = DeviceState {
            active_format: 0,
            frame_rate: first.max_frame_rates.first().copied().unwrap_or(30.0),
            locked: false,
            iso: first.iso.clamp(100.0),
            exposure_seconds: first.exposure.clamp(1.0 / 60.0),
            lens_position: 1.0,
            focus_locked: false,
            exposure_custom: false,
        };
        Self {
            formats,
            state: Mutex::new(state),
            fail_locks: AtomicBool::new(false),
            lock_count: AtomicUsize::new(0),
            locked_focus_supported: true,
        }
    }

    pub fn without_locked_focus(mut self) -> Self {
        self.locked_focus_supported = false;
        self
    }

    /// Makes every subsequent configuration lock attempt fail.
    pub fn fail_configuration_locks(&self, fail: bool) {
        self.fail_locks.store(fail, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// Number of successful configuration locks so far.
    pub fn lock_count(&self) -> usize {
        self.lock_count.load(Ordering::SeqCst)
    }

    pub fn active_format(&self) -> FormatInfo {
        self.formats[self.state().active_format].clone()
    }

    pub fn frame_rate(&self) -> f64 {
        self.state().frame_rate
    }

    pub fn focus_locked(&self) -> bool {
        self.state().focus_locked
    }

    pub fn exposure_is_custom(&self) -> bool {
        self.state().exposure_custom
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn locked_state(&self) -> Result<MutexGuard<'_, DeviceState>, CameraError> {
        let state = self.state();
        if !state.locked {
            return Err(CameraError::NotConfigured);
        }
        Ok(state)
    }
}

fn default_formats() -> Vec<FormatInfo> {
    vec![
        FormatInfo {
            width: 1920,
            height: 1080,
            max_frame_rates: vec![30.0, 60.0],
            iso: CaptureRange {
                minimum: 25.0,
                maximum: 2000.0,
            },
            exposure: CaptureRange {
                minimum: 0.000_014,
                maximum: 0.5,
            },
        },
        FormatInfo {
            width: 3840,
            height: 2160,
            max_frame_rates: vec![30.0, 60.0],
            iso: CaptureRange {
                minimum: 32.0,
                maximum: 3200.0,
            },
            exposure: CaptureRange {
                minimum: 0.000_05,
                maximum: 1.0,
            },
        },
    ]
}

fn check_range(kind: ParameterKind, range: &CaptureRange, value: f64) -> Result<(), CameraError> {
    if value < range.minimum - RANGE_TOLERANCE || value > range.maximum + RANGE_TOLERANCE {
        return Err(CameraError::invalid_config(format!(
            "{kind} value {value} outside [{}, {}]",
            range.minimum, range.maximum
        )));
    }
    Ok(())
}

impl dogma::Named for SimulatedDevice {
    fn name(&self) -> Cow<'_, str> {
        "simulated".into()
    }
}

impl CaptureDevice for SimulatedDevice {
    fn active_range(&self, kind: ParameterKind) -> CaptureRange {
        let format = &self.formats[self.state().active_format];
        match kind {
            ParameterKind::Iso => format.iso,
            ParameterKind::ExposureDuration => format.exposure,
            ParameterKind::FocusPosition => CaptureRange::unit(),
        }
    }

    fn current_value(&self, kind: ParameterKind) -> f64 {
        let state = self.state();
        match kind {
            ParameterKind::Iso => state.iso,
            ParameterKind::ExposureDuration => state.exposure_seconds,
            ParameterKind::FocusPosition => state.lens_position,
        }
    }

    fn formats(&self) -> Vec<FormatInfo> {
        self.formats.clone()
    }

    fn supports_locked_focus(&self) -> bool {
        self.locked_focus_supported
    }

    fn lock_for_configuration(&self) -> Result<(), CameraError> {
        if self.fail_locks.load(Ordering::SeqCst) {
            return Err(CameraError::configuration_lock("device busy"));
        }
        self.state().locked = true;
        self.lock_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.state().locked = false;
    }

    fn set_active_format(&self, index: usize, fps: f64) -> Result<(), CameraError> {
        let mut state = self.locked_state()?;
        let format = self
            .formats
            .get(index)
            .ok_or_else(|| CameraError::invalid_config(format!("no format at index {index}")))?;
        state.active_format = index;
        state.frame_rate = fps;
        state.iso = format.iso.clamp(state.iso);
        state.exposure_seconds = format.exposure.clamp(state.exposure_seconds);
        Ok(())
    }

    fn set_focus_locked(&self, lens_position: f64) -> Result<(), CameraError> {
        if !self.locked_focus_supported {
            return Err(CameraError::unsupported("locked focus mode"));
        }
        let mut state = self.locked_state()?;
        check_range(ParameterKind::FocusPosition, &CaptureRange::unit(), lens_position)?;
        state.lens_position = lens_position;
        state.focus_locked = true;
        Ok(())
    }

    fn set_custom_exposure(&self, duration: Duration, iso: f64) -> Result<(), CameraError> {
        let mut state = self.locked_state()?;
        let format = &self.formats[state.active_format];
        let seconds = duration.as_secs_f64();
        check_range(ParameterKind::ExposureDuration, &format.exposure, seconds)?;
        check_range(ParameterKind::Iso, &format.iso, iso)?;
        state.exposure_seconds = seconds;
        state.iso = iso;
        state.exposure_custom = true;
        Ok(())
    }
}

/// Downscale applied to simulated stills so tests stay fast.
const PHOTO_SCALE: u32 = 40;

/// A gradient JPEG as a sensor mounted a quarter turn off would deliver it:
/// landscape pixels tagged [`Orientation::Right`].
fn sensor_jpeg(width: u32, height: u32) -> Result<CapturedPhoto, CameraError> {
    let (width, height) = ((width / PHOTO_SCALE).max(1), (height / PHOTO_SCALE).max(1));
    let pixels = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    });
    let mut data = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut data, image::ImageFormat::Jpeg)
        .map_err(|e| CameraError::driver("encoding photo", e))?;
    Ok(CapturedPhoto {
        data: data.into_inner(),
        width,
        height,
        orientation: Orientation::Right,
    })
}

struct ActiveRecording {
    path: PathBuf,
    done: Completer<RecordedClip>,
}

/// Session graph counterpart of [`SimulatedDevice`].
#[derive(Default)]
pub struct SimulatedBackend {
    running: AtomicBool,
    start_failure: Mutex<Option<String>>,
    start_delay: Duration,
    recording: Mutex<Option<ActiveRecording>>,
    photos_taken: AtomicUsize,
}

impl core::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("running", &self.is_running())
            .field("recording", &self.is_recording())
            .finish()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `start_running` take `delay` before the session is up, like a
    /// slow hardware start.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Makes the next `start_running` call fail with `message`.
    pub fn fail_next_start(&self, message: impl Into<String>) {
        *self.start_failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(message.into());
    }

    pub fn photos_taken(&self) -> usize {
        self.photos_taken.load(Ordering::SeqCst)
    }

    fn recording(&self) -> MutexGuard<'_, Option<ActiveRecording>> {
        self.recording.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl dogma::Named for SimulatedBackend {
    fn name(&self) -> Cow<'_, str> {
        "simulated".into()
    }
}

impl CaptureBackend for SimulatedBackend {
    fn backend(&self) -> CameraBackend {
        CameraBackend::Simulated
    }

    fn start_running(&self) -> Result<(), CameraError> {
        if !self.start_delay.is_zero() {
            std::thread::sleep(self.start_delay);
        }
        let failure = self.start_failure.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(message) = failure {
            return Err(CameraError::other(message));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_running(&self) -> Result<(), CameraError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn capture_photo(&self, settings: &PhotoSettings, done: Completer<CapturedPhoto>) {
        if !self.is_running() {
            done.fail(CameraError::other("capture session is not running"));
            return;
        }
        self.photos_taken.fetch_add(1, Ordering::SeqCst);
        let (width, height) = settings.max_dimensions;
        std::thread::spawn(move || match sensor_jpeg(width, height) {
            Ok(photo) => done.succeed(photo),
            Err(error) => done.fail(error),
        });
    }

    fn start_recording(
        &self,
        path: &Path,
        _settings: &RecordingSettings,
        done: Completer<RecordedClip>,
    ) -> Result<(), CameraError> {
        if !self.is_running() {
            return Err(CameraError::other("capture session is not running"));
        }
        let mut recording = self.recording();
        if recording.is_some() {
            return Err(CameraError::AlreadyRecording);
        }
        fs::write(path, b"ftypqt  ").map_err(|e| CameraError::driver("creating movie file", e))?;
        *recording = Some(ActiveRecording {
            path: path.to_path_buf(),
            done,
        });
        Ok(())
    }

    fn stop_recording(&self) -> Result<(), CameraError> {
        let active = self.recording().take().ok_or(CameraError::NotRecording)?;
        active.done.succeed(RecordedClip { path: active.path });
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording().is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
