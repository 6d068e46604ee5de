// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraConfig, CameraError, CameraEvent, CaptureBackend, CaptureDevice, Completion,
    CompletionResult, FormatInfo, INITIAL_FOCUS, MediaKind, MediaLibrary,
    ParameterController, ParameterKind, ParameterSetting, PhotoSettings, RecordedClip,
    RecordingSettings, SavedAsset, CapturedPhoto, apply_format, completion, report_error,
    report_warning, with_configuration_lock,
};
use core::time::Duration;
use derive_more::Display;
use dogma::Named;
use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        mpsc::{Receiver, SyncSender, sync_channel},
    },
    thread::JoinHandle,
};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ControlMode {
    /// Device defaults; only seen before setup completes.
    #[display("auto")]
    Auto,
    /// Focus locked and exposure custom for the rest of the session.
    #[display("locked-manual")]
    LockedManual,
}

/// The three manual settings plus the requested capture format.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSettings {
    pub iso: ParameterSetting,
    pub exposure: ParameterSetting,
    pub focus: ParameterSetting,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug)]
pub enum RecordingToggle {
    Started {
        path: PathBuf,
        completion: Completion<SavedAsset>,
    },
    Stopped,
}

/// One capture screen: device, session graph, manual controls, and the
/// library finished media goes to.
pub struct CaptureSession {
    config: CameraConfig,
    device: Arc<dyn CaptureDevice>,
    backend: Arc<dyn CaptureBackend>,
    library: Arc<dyn MediaLibrary>,
    controller: ParameterController,
    mode: ControlMode,
    format: Option<FormatInfo>,
    events_tx: SyncSender<CameraEvent>,
    events_rx: Receiver<CameraEvent>,
    pending_start: Mutex<Option<JoinHandle<()>>>,
}

impl core::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("mode", &self.mode)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Selects the configured format and puts the device into locked manual
    /// mode. The session is not started; call [`CaptureSession::start`].
    pub fn open(
        config: CameraConfig,
        device: Arc<dyn CaptureDevice>,
        backend: Arc<dyn CaptureBackend>,
        library: Arc<dyn MediaLibrary>,
    ) -> Result<Self, CameraError> {
        let (events_tx, events_rx) = sync_channel(config.event_buffer.max(1));

        let format = match apply_format(device.as_ref(), config.width, config.height, config.fps) {
            Ok(format) => Some(format),
            Err(err @ CameraError::FormatUnavailable { .. }) => {
                #[cfg(feature = "tracing")]
                asimov_module::tracing::warn!(target: "asimov_camera_module", %err, "keeping the active format");

                report_warning(&events_tx, backend.backend(), err.to_string());
                None
            },
            Err(err) => return Err(err),
        };

        let controller = ParameterController::new(Arc::clone(&device));
        let mut session = Self {
            config,
            device,
            backend,
            library,
            controller,
            mode: ControlMode::Auto,
            format,
            events_tx,
            events_rx,
            pending_start: Mutex::new(None),
        };
        session.enter_manual_mode()?;
        Ok(session)
    }

    fn enter_manual_mode(&mut self) -> Result<(), CameraError> {
        let iso = self.device.active_range(ParameterKind::Iso).minimum;
        let exposure = self
            .device
            .active_range(ParameterKind::ExposureDuration)
            .clamp(self.config.default_exposure_seconds);

        with_configuration_lock(self.device.as_ref(), |d| {
            if d.supports_locked_focus() {
                d.set_focus_locked(INITIAL_FOCUS)?;
            }
            d.set_custom_exposure(Duration::from_secs_f64(exposure), iso)
        })?;

        self.mode = ControlMode::LockedManual;

        #[cfg(feature = "tracing")]
        asimov_module::tracing::info!(
            target: "asimov_camera_module",
            device = %self.device.name(),
            iso,
            exposure,
            "entered locked manual mode"
        );

        Ok(())
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn controller(&self) -> &ParameterController {
        &self.controller
    }

    pub fn backend(&self) -> &Arc<dyn CaptureBackend> {
        &self.backend
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// The format selected at setup, or `None` when the device had no match
    /// and kept its previous format.
    pub fn active_format(&self) -> Option<&FormatInfo> {
        self.format.as_ref()
    }

    /// Rotation the host should apply to its preview layer, in radians.
    pub fn preview_rotation(&self) -> f64 {
        self.config.rotation_offset
    }

    /// Session notifications, buffered up to `CameraConfig::event_buffer`.
    ///
    /// Delivery is lossy: events posted while the buffer is full are
    /// dropped, and the operation that raised them still completes. Hosts
    /// that only use completions need not drain this.
    pub fn events(&self) -> &Receiver<CameraEvent> {
        &self.events_rx
    }

    pub fn settings(&self) -> CaptureSettings {
        let [iso, exposure, focus] = self.controller.settings();
        CaptureSettings {
            iso,
            exposure,
            focus,
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
        }
    }

    /// Sends the current value of every parameter to the label sinks.
    pub fn publish_labels(&self) {
        for setting in self.controller.settings() {
            self.controller.publish(setting);
        }
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }

    /// Starts the session on a background thread and returns immediately.
    ///
    /// The outcome arrives on [`CaptureSession::events`] as
    /// [`CameraEvent::Started`] or [`CameraEvent::Error`].
    pub fn start(&self) -> Result<(), CameraError> {
        let backend = Arc::clone(&self.backend);
        let events_tx = self.events_tx.clone();
        let handle = std::thread::Builder::new()
            .name("capture-session-start".into())
            .spawn(move || {
                let kind = backend.backend();
                match backend.start_running() {
                    Ok(()) => {
                        let _ = events_tx.try_send(CameraEvent::Started { backend: kind });
                    },
                    Err(error) => {
                        #[cfg(feature = "tracing")]
                        asimov_module::tracing::error!(target: "asimov_camera_module", %error, "capture session failed to start");

                        report_error(&events_tx, kind, error);
                    },
                }
            })
            .map_err(|e| CameraError::driver("spawning the session start thread", e))?;

        let previous = self
            .pending_start
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            let _ = previous.join();
        }
        Ok(())
    }

    /// Stops any recording in progress, then the session.
    ///
    /// A start still in flight is waited for first, so the session cannot
    /// come up after it has been stopped.
    pub fn stop(&mut self) -> Result<(), CameraError> {
        let pending = self.pending_start.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(pending) = pending {
            let _ = pending.join();
        }
        if self.backend.is_recording() {
            self.backend.stop_recording()?;
        }
        if self.backend.is_running() {
            self.backend.stop_running()?;
            let _ = self.events_tx.try_send(CameraEvent::Stopped {
                backend: self.backend.backend(),
            });
        }
        Ok(())
    }

    /// Captures a still at the configured size with flash off and saves it
    /// upright to the media library.
    pub fn capture_photo(&self) -> Completion<SavedAsset> {
        let (done, completion) = completion();
        let library = Arc::clone(&self.library);
        let events_tx = self.events_tx.clone();
        let backend = self.backend.backend();

        let done = done.map_with(move |result: CompletionResult<CapturedPhoto>| {
            let photo = result?.to_upright()?;
            let asset = library.save_photo(&photo)?;
            let _ = events_tx.try_send(CameraEvent::Saved {
                backend,
                kind: MediaKind::Photo,
                asset: asset.clone(),
            });
            Ok(asset)
        });

        let settings = PhotoSettings::new(self.config.width, self.config.height);
        self.backend.capture_photo(&settings, done);
        completion
    }

    pub fn is_recording(&self) -> bool {
        self.backend.is_recording()
    }

    /// Starts a recording to a fresh `.mov` file, or stops the current one.
    ///
    /// The completion of a started recording resolves once the clip is
    /// finished and saved to the media library.
    pub fn toggle_recording(&mut self) -> Result<RecordingToggle, CameraError> {
        if self.backend.is_recording() {
            self.backend.stop_recording()?;
            return Ok(RecordingToggle::Stopped);
        }

        let path = self
            .config
            .recording_dir
            .join(format!("{}.mov", Uuid::new_v4()));
        let (done, completion) = completion();
        let library = Arc::clone(&self.library);
        let events_tx = self.events_tx.clone();
        let backend = self.backend.backend();

        let done = done.map_with(move |result: CompletionResult<RecordedClip>| {
            let clip = result?;
            let asset = library.save_video(&clip)?;
            let _ = events_tx.try_send(CameraEvent::Saved {
                backend,
                kind: MediaKind::Video,
                asset: asset.clone(),
            });
            Ok(asset)
        });

        self.backend
            .start_recording(&path, &RecordingSettings::default(), done)?;
        let _ = self.events_tx.try_send(CameraEvent::RecordingStarted { backend });
        Ok(RecordingToggle::Started { path, completion })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{
        DirectoryLibrary, LayoutVariant,
        drivers::simulated::{SimulatedBackend, SimulatedDevice},
    };
    use std::sync::Mutex;

    struct Fixture {
        _dir: tempfile::TempDir,
        device: Arc<SimulatedDevice>,
        backend: Arc<SimulatedBackend>,
        session: CaptureSession,
    }

    fn open_with(device: SimulatedDevice, config: CameraConfig) -> Fixture {
        open_on(device, SimulatedBackend::new(), config)
    }

    fn open_on(device: SimulatedDevice, backend: SimulatedBackend, config: CameraConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let device = Arc::new(device);
        let backend = Arc::new(backend);
        let library = Arc::new(DirectoryLibrary::new(dir.path().join("library")));
        let session = CaptureSession::open(
            config.with_recording_dir(dir.path()),
            Arc::clone(&device) as Arc<dyn CaptureDevice>,
            Arc::clone(&backend) as Arc<dyn CaptureBackend>,
            library,
        )
        .unwrap();
        Fixture {
            _dir: dir,
            device,
            backend,
            session,
        }
    }

    fn open() -> Fixture {
        open_with(SimulatedDevice::new(), CameraConfig::default())
    }

    fn wait_started(session: &CaptureSession) {
        match session.events().recv_timeout(Duration::from_secs(5)).unwrap() {
            CameraEvent::Started { .. } => {},
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn opens_in_locked_manual_mode_with_hardware_defaults() {
        let f = open();
        assert_eq!(f.session.mode(), ControlMode::LockedManual);
        assert_eq!(f.session.active_format().unwrap().width, 3840);
        assert_eq!(f.device.frame_rate(), 60.0);

        let settings = f.session.settings();
        assert_eq!(settings.iso.value, 32.0);
        assert!((settings.exposure.value - 0.002).abs() < 1e-9);
        assert_eq!(settings.focus.value, 0.5);
        assert_eq!((settings.width, settings.height, settings.fps), (3840, 2160, 60.0));
        assert!(f.device.focus_locked());
        assert!(f.device.exposure_is_custom());
        assert!(!f.device.is_locked());
        assert!(!f.session.is_running());
    }

    #[test]
    fn default_exposure_is_clamped_into_the_device_range() {
        let device = SimulatedDevice::with_ranges(
            crate::shared::CaptureRange::new(50.0, 1600.0).unwrap(),
            crate::shared::CaptureRange::new(0.005, 0.25).unwrap(),
        );
        let f = open_with(device, CameraConfig::default());
        assert!((f.session.settings().exposure.value - 0.005).abs() < 1e-9);
        assert_eq!(f.session.settings().iso.value, 50.0);
    }

    #[test]
    fn missing_format_keeps_the_current_one() {
        let f = open_with(SimulatedDevice::new(), CameraConfig::new(640, 480, 30.0));
        assert!(f.session.active_format().is_none());
        assert_eq!(f.device.active_format().width, 1920);
        assert!(matches!(
            f.session.events().try_recv().unwrap(),
            CameraEvent::Warning { .. }
        ));
        assert_eq!(f.session.mode(), ControlMode::LockedManual);
    }

    #[test]
    fn skips_focus_lock_when_unsupported() {
        let f = open_with(SimulatedDevice::new().without_locked_focus(), CameraConfig::default());
        assert!(!f.device.focus_locked());
        assert!(f.device.exposure_is_custom());
    }

    #[test]
    fn setup_lock_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = Arc::new(SimulatedDevice::new());
        device.fail_configuration_locks(true);
        let result = CaptureSession::open(
            CameraConfig::default(),
            device,
            Arc::new(SimulatedBackend::new()),
            Arc::new(DirectoryLibrary::new(dir.path())),
        );
        assert!(matches!(result, Err(CameraError::ConfigurationLock(_))));
    }

    #[test]
    fn start_runs_in_the_background() {
        let f = open();
        f.session.start().unwrap();
        wait_started(&f.session);
        assert!(f.backend.is_running());
    }

    #[test]
    fn dropping_during_a_slow_start_leaves_the_camera_stopped() {
        let Fixture {
            _dir,
            backend,
            session,
            ..
        } = open_on(
            SimulatedDevice::new(),
            SimulatedBackend::new().with_start_delay(Duration::from_millis(300)),
            CameraConfig::default(),
        );
        session.start().unwrap();
        drop(session);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!backend.is_running());
    }

    #[test]
    fn stop_waits_for_a_pending_start() {
        let mut f = open_on(
            SimulatedDevice::new(),
            SimulatedBackend::new().with_start_delay(Duration::from_millis(200)),
            CameraConfig::default(),
        );
        f.session.start().unwrap();
        f.session.stop().unwrap();
        assert!(!f.backend.is_running());
        assert!(matches!(
            f.session.events().try_recv().unwrap(),
            CameraEvent::Started { .. }
        ));
        assert!(matches!(
            f.session.events().try_recv().unwrap(),
            CameraEvent::Stopped { .. }
        ));
    }

    #[test]
    fn full_event_buffer_does_not_block_captures() {
        let f = open_with(SimulatedDevice::new(), CameraConfig::default().with_event_buffer(1));
        f.session.start().unwrap();
        wait_started(&f.session);
        for _ in 0..3 {
            f.session.capture_photo().wait().unwrap();
        }
        assert_eq!(f.backend.photos_taken(), 3);
        assert!(matches!(
            f.session.events().try_recv().unwrap(),
            CameraEvent::Saved { .. }
        ));
        assert!(f.session.events().try_recv().is_err());
    }

    #[test]
    fn start_failure_arrives_as_an_event() {
        let f = open();
        f.backend.fail_next_start("camera in use");
        f.session.start().unwrap();
        match f.session.events().recv_timeout(Duration::from_secs(5)).unwrap() {
            CameraEvent::Error { error, .. } => assert_eq!(error.to_string(), "camera in use"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn photo_is_saved_upright() {
        let f = open();
        f.session.start().unwrap();
        wait_started(&f.session);

        let asset = f.session.capture_photo().wait().unwrap();
        assert_eq!(asset.kind, MediaKind::Photo);
        // the simulated sensor delivers landscape pixels tagged Right
        let stored = image::open(&asset.identifier).unwrap();
        assert_eq!((stored.width(), stored.height()), (54, 96));
        assert_eq!(f.backend.photos_taken(), 1);
    }

    #[test]
    fn photo_before_start_fails() {
        let f = open();
        assert!(f.session.capture_photo().wait().is_err());
    }

    #[test]
    fn recording_toggles_and_saves() {
        let mut f = open();
        f.session.start().unwrap();
        wait_started(&f.session);

        let RecordingToggle::Started { path, completion } = f.session.toggle_recording().unwrap()
        else {
            panic!("expected a new recording");
        };
        assert_eq!(path.extension().unwrap(), "mov");
        assert!(f.session.is_recording());
        assert!(completion.try_take().is_none());

        assert!(matches!(f.session.toggle_recording().unwrap(), RecordingToggle::Stopped));
        assert!(!f.session.is_recording());

        let asset = completion.wait().unwrap();
        assert_eq!(asset.kind, MediaKind::Video);
        assert!(asset.identifier.ends_with(path.file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn labels_reach_registered_sinks() {
        let f = open_with(
            SimulatedDevice::new(),
            CameraConfig::default().with_layout(LayoutVariant::Embedded),
        );
        assert_eq!(f.session.preview_rotation(), 0.0);

        let labels = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&labels);
        f.session.controller().add_label_sink(Arc::new(move |kind, text| {
            sink.lock().unwrap().push(format!("{kind}={text}"));
        }));
        f.session.publish_labels();
        assert_eq!(
            *labels.lock().unwrap(),
            vec!["ISO=32", "Exposure=2.00 ms", "Focus=0.50"]
        );
    }

    #[test]
    fn stop_ends_recording_and_session() {
        let mut f = open();
        f.session.start().unwrap();
        wait_started(&f.session);
        let _ = f.session.toggle_recording().unwrap();
        f.session.stop().unwrap();
        assert!(!f.backend.is_recording());
        assert!(!f.backend.is_running());
    }
}
