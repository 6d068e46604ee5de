// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraBackend, CameraError, CaptureBackend, CaptureDevice, CaptureRange, CapturedPhoto,
    Completer, FormatInfo, Orientation, ParameterKind, PhotoSettings, RecordedClip,
    RecordingSettings,
};
use alloc::borrow::Cow;
use core::{ffi::c_void, time::Duration};
use objc2::{
    AllocAnyThread, DefinedClass, define_class, msg_send,
    rc::Retained,
    runtime::{NSObjectProtocol, ProtocolObject},
};
use objc2_av_foundation::{
    AVCaptureConnection, AVCaptureDevice, AVCaptureDeviceFormat, AVCaptureDeviceInput,
    AVCaptureDevicePosition, AVCaptureDeviceTypeBuiltInWideAngleCamera, AVCaptureFileOutput,
    AVCaptureFileOutputRecordingDelegate, AVCaptureFlashMode, AVCaptureFocusMode,
    AVCaptureMovieFileOutput, AVCapturePhoto, AVCapturePhotoCaptureDelegate,
    AVCapturePhotoOutput, AVCapturePhotoSettings, AVCaptureSession, AVCaptureSessionPresetHigh,
    AVCaptureVideoStabilizationMode, AVMediaTypeVideo,
};
use objc2_core_media::{CMTime, CMVideoDimensions, CMVideoFormatDescriptionGetDimensions};
use objc2_foundation::{NSArray, NSError, NSObject, NSString, NSURL};
use std::{
    any::Any,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

/// Exposure durations are handed to AVFoundation with nanosecond precision.
const NANOSECOND_TIMESCALE: i32 = 1_000_000_000;

fn error_message(error: &NSError) -> String {
    error.localizedDescription().to_string()
}

fn seconds(time: CMTime) -> f64 {
    unsafe { time.seconds() }
}

fn format_info(format: &AVCaptureDeviceFormat) -> FormatInfo {
    unsafe {
        let desc = format.formatDescription();
        let dimensions = CMVideoFormatDescriptionGetDimensions(&desc);
        let max_frame_rates = format
            .videoSupportedFrameRateRanges()
            .iter()
            .map(|range| range.maxFrameRate())
            .collect();
        FormatInfo {
            width: dimensions.width as u32,
            height: dimensions.height as u32,
            max_frame_rates,
            iso: CaptureRange {
                minimum: format.minISO() as f64,
                maximum: format.maxISO() as f64,
            },
            exposure: CaptureRange {
                minimum: seconds(format.minExposureDuration()),
                maximum: seconds(format.maxExposureDuration()),
            },
        }
    }
}

/// The rear wide-angle camera, or a device picked by unique ID or name.
#[derive(Debug)]
pub struct AvfCaptureDevice {
    device: Retained<AVCaptureDevice>,
}

// AVCaptureDevice property access and configuration locking are thread-safe.
unsafe impl Send for AvfCaptureDevice {}
unsafe impl Sync for AvfCaptureDevice {}

impl AvfCaptureDevice {
    pub fn find(device_id: Option<&str>) -> Result<Self, CameraError> {
        unsafe {
            let media_type = AVMediaTypeVideo.ok_or(CameraError::NoCamera)?;

            let device = match device_id.filter(|id| !id.is_empty()) {
                None => AVCaptureDevice::defaultDeviceWithDeviceType_mediaType_position(
                    AVCaptureDeviceTypeBuiltInWideAngleCamera,
                    Some(media_type),
                    AVCaptureDevicePosition::Back,
                )
                .or_else(|| AVCaptureDevice::defaultDeviceWithMediaType(media_type)),
                Some(id) => {
                    AVCaptureDevice::deviceWithUniqueID(&NSString::from_str(id)).or_else(|| {
                        AVCaptureDevice::devicesWithMediaType(media_type)
                            .iter()
                            .find(|d| d.localizedName().to_string() == id)
                    })
                },
            };

            device
                .map(|device| Self { device })
                .ok_or(CameraError::NoCamera)
        }
    }

    pub fn raw(&self) -> &AVCaptureDevice {
        &self.device
    }
}

impl dogma::Named for AvfCaptureDevice {
    fn name(&self) -> Cow<'_, str> {
        unsafe { self.device.localizedName() }.to_string().into()
    }
}

impl CaptureDevice for AvfCaptureDevice {
    fn active_range(&self, kind: ParameterKind) -> CaptureRange {
        if kind == ParameterKind::FocusPosition {
            return CaptureRange::unit();
        }
        let format = format_info(&unsafe { self.device.activeFormat() });
        match kind {
            ParameterKind::Iso => format.iso,
            _ => format.exposure,
        }
    }

    fn current_value(&self, kind: ParameterKind) -> f64 {
        unsafe {
            match kind {
                ParameterKind::Iso => self.device.ISO() as f64,
                ParameterKind::ExposureDuration => seconds(self.device.exposureDuration()),
                ParameterKind::FocusPosition => self.device.lensPosition() as f64,
            }
        }
    }

    fn formats(&self) -> Vec<FormatInfo> {
        unsafe { self.device.formats() }
            .iter()
            .map(|format| format_info(&format))
            .collect()
    }

    fn supports_locked_focus(&self) -> bool {
        unsafe {
            self.device.isFocusModeSupported(AVCaptureFocusMode::Locked)
                && self.device.isLockingFocusWithCustomLensPositionSupported()
        }
    }

    fn lock_for_configuration(&self) -> Result<(), CameraError> {
        unsafe { self.device.lockForConfiguration() }
            .map_err(|error| CameraError::configuration_lock(error_message(&error)))
    }

    fn unlock_for_configuration(&self) {
        unsafe { self.device.unlockForConfiguration() }
    }

    fn set_active_format(&self, index: usize, fps: f64) -> Result<(), CameraError> {
        unsafe {
            let format = self
                .device
                .formats()
                .iter()
                .nth(index)
                .ok_or_else(|| CameraError::invalid_config(format!("no format at index {index}")))?;
            self.device.setActiveFormat(&format);

            let duration = CMTime::new(1, fps.round() as i32);
            self.device.setActiveVideoMinFrameDuration(duration);
            self.device.setActiveVideoMaxFrameDuration(duration);
        }
        Ok(())
    }

    fn set_focus_locked(&self, lens_position: f64) -> Result<(), CameraError> {
        if !self.supports_locked_focus() {
            return Err(CameraError::unsupported("locked focus mode"));
        }
        unsafe {
            self.device
                .setFocusModeLockedWithLensPosition_completionHandler(lens_position as f32, None);
        }
        Ok(())
    }

    fn set_custom_exposure(&self, duration: Duration, iso: f64) -> Result<(), CameraError> {
        unsafe {
            let duration = CMTime::with_seconds(duration.as_secs_f64(), NANOSECOND_TIMESCALE);
            self.device
                .setExposureModeCustomWithDuration_ISO_completionHandler(duration, iso as f32, None);
        }
        Ok(())
    }
}

pub struct PhotoDelegateIvars {
    done: Mutex<Option<Completer<CapturedPhoto>>>,
}

define_class!(
    #[unsafe(super(NSObject))]
    #[name = "AsimovPhotoCaptureDelegate"]
    #[ivars = PhotoDelegateIvars]
    struct AvfPhotoDelegate;

    unsafe impl NSObjectProtocol for AvfPhotoDelegate {}

    unsafe impl AVCapturePhotoCaptureDelegate for AvfPhotoDelegate {
        #[unsafe(method(captureOutput:didFinishProcessingPhoto:error:))]
        fn did_finish_processing_photo(
            &self,
            _output: &AVCapturePhotoOutput,
            photo: &AVCapturePhoto,
            error: Option<&NSError>,
        ) {
            let Some(done) = self.ivars().done.lock().unwrap_or_else(|p| p.into_inner()).take()
            else {
                return;
            };
            if let Some(error) = error {
                done.fail(CameraError::other(error_message(error)));
                return;
            }
            unsafe {
                let Some(data) = photo.fileDataRepresentation() else {
                    done.fail(CameraError::other("photo has no file data"));
                    return;
                };
                let CMVideoDimensions { width, height } = photo.resolvedSettings().photoDimensions();
                done.succeed(CapturedPhoto {
                    data: data.to_vec(),
                    width: width as u32,
                    height: height as u32,
                    orientation: Orientation::Right,
                });
            }
        }
    }
);

impl AvfPhotoDelegate {
    fn new(done: Completer<CapturedPhoto>) -> Retained<Self> {
        let this = Self::alloc().set_ivars(PhotoDelegateIvars {
            done: Mutex::new(Some(done)),
        });
        unsafe { msg_send![super(this), init] }
    }

    fn is_finished(&self) -> bool {
        self.ivars().done.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }
}

pub struct RecordingDelegateIvars {
    path: PathBuf,
    done: Mutex<Option<Completer<RecordedClip>>>,
}

define_class!(
    #[unsafe(super(NSObject))]
    #[name = "AsimovRecordingDelegate"]
    #[ivars = RecordingDelegateIvars]
    struct AvfRecordingDelegate;

    unsafe impl NSObjectProtocol for AvfRecordingDelegate {}

    unsafe impl AVCaptureFileOutputRecordingDelegate for AvfRecordingDelegate {
        #[unsafe(method(captureOutput:didFinishRecordingToOutputFileAtURL:fromConnections:error:))]
        fn did_finish_recording(
            &self,
            _output: &AVCaptureFileOutput,
            _url: &NSURL,
            _connections: &NSArray<AVCaptureConnection>,
            error: Option<&NSError>,
        ) {
            let Some(done) = self.ivars().done.lock().unwrap_or_else(|p| p.into_inner()).take()
            else {
                return;
            };
            match error {
                Some(error) => done.fail(CameraError::other(error_message(error))),
                None => done.succeed(RecordedClip {
                    path: self.ivars().path.clone(),
                }),
            }
        }
    }
);

impl AvfRecordingDelegate {
    fn new(path: PathBuf, done: Completer<RecordedClip>) -> Retained<Self> {
        let this = Self::alloc().set_ivars(RecordingDelegateIvars {
            path,
            done: Mutex::new(Some(done)),
        });
        unsafe { msg_send![super(this), init] }
    }
}

/// Capture session with the device input, a photo output, and a movie file
/// output.
pub struct AvfCaptureBackend {
    session: Retained<AVCaptureSession>,
    photo_output: Retained<AVCapturePhotoOutput>,
    movie_output: Retained<AVCaptureMovieFileOutput>,
    // outputs hold their delegates weakly
    photo_delegates: Mutex<Vec<Retained<AvfPhotoDelegate>>>,
    recording_delegate: Mutex<Option<Retained<AvfRecordingDelegate>>>,
}

// AVCaptureSession and its outputs may be driven from any queue.
unsafe impl Send for AvfCaptureBackend {}
unsafe impl Sync for AvfCaptureBackend {}

impl AvfCaptureBackend {
    pub fn new(device: &AvfCaptureDevice) -> Result<Self, CameraError> {
        unsafe {
            let session = AVCaptureSession::new();
            session.beginConfiguration();
            if let Some(preset) = AVCaptureSessionPresetHigh {
                if session.canSetSessionPreset(preset) {
                    session.setSessionPreset(preset);
                }
            }

            let input = AVCaptureDeviceInput::deviceInputWithDevice_error(device.raw())
                .map_err(|error| CameraError::other(error_message(&error)))?;
            if !session.canAddInput(&input) {
                session.commitConfiguration();
                return Err(CameraError::unsupported("camera input rejected by session"));
            }
            session.addInput(&input);

            let photo_output = AVCapturePhotoOutput::new();
            let movie_output = AVCaptureMovieFileOutput::new();
            for output in [
                Retained::into_super(photo_output.clone()),
                Retained::into_super(Retained::into_super(movie_output.clone())),
            ] {
                if !session.canAddOutput(&output) {
                    session.commitConfiguration();
                    return Err(CameraError::unsupported("capture output rejected by session"));
                }
                session.addOutput(&output);
            }

            session.commitConfiguration();

            Ok(Self {
                session,
                photo_output,
                movie_output,
                photo_delegates: Mutex::new(Vec::new()),
                recording_delegate: Mutex::new(None),
            })
        }
    }

    /// Raw `AVCaptureSession*` for the host's preview layer.
    pub fn session_ptr(&self) -> *mut c_void {
        Retained::as_ptr(&self.session) as *mut c_void
    }

    fn photo_delegates(&self) -> MutexGuard<'_, Vec<Retained<AvfPhotoDelegate>>> {
        self.photo_delegates.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl dogma::Named for AvfCaptureBackend {
    fn name(&self) -> Cow<'_, str> {
        "avf".into()
    }
}

impl CaptureBackend for AvfCaptureBackend {
    fn backend(&self) -> CameraBackend {
        CameraBackend::Avf
    }

    fn start_running(&self) -> Result<(), CameraError> {
        unsafe { self.session.startRunning() };
        if !self.is_running() {
            return Err(CameraError::other("capture session did not start"));
        }
        Ok(())
    }

    fn stop_running(&self) -> Result<(), CameraError> {
        unsafe { self.session.stopRunning() };
        Ok(())
    }

    fn is_running(&self) -> bool {
        unsafe { self.session.isRunning() }
    }

    fn capture_photo(&self, settings: &PhotoSettings, done: Completer<CapturedPhoto>) {
        unsafe {
            let photo_settings = AVCapturePhotoSettings::photoSettings();
            photo_settings.setFlashMode(match settings.flash {
                crate::shared::FlashMode::Off => AVCaptureFlashMode::Off,
                crate::shared::FlashMode::On => AVCaptureFlashMode::On,
                crate::shared::FlashMode::Auto => AVCaptureFlashMode::Auto,
            });
            // must not exceed what the output is configured for
            let supported = self.photo_output.maxPhotoDimensions();
            let (width, height) = settings.max_dimensions;
            photo_settings.setMaxPhotoDimensions(CMVideoDimensions {
                width: (width as i32).min(supported.width),
                height: (height as i32).min(supported.height),
            });

            let delegate = AvfPhotoDelegate::new(done);
            let mut delegates = self.photo_delegates();
            delegates.retain(|d| !d.is_finished());
            self.photo_output
                .capturePhotoWithSettings_delegate(&photo_settings, ProtocolObject::from_ref(&*delegate));
            delegates.push(delegate);
        }
    }

    fn start_recording(
        &self,
        path: &Path,
        settings: &RecordingSettings,
        done: Completer<RecordedClip>,
    ) -> Result<(), CameraError> {
        if self.is_recording() {
            return Err(CameraError::AlreadyRecording);
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| CameraError::invalid_config("recording path is not UTF-8"))?;

        unsafe {
            let media_type = AVMediaTypeVideo.ok_or(CameraError::NoCamera)?;
            let connection = self
                .movie_output
                .connectionWithMediaType(media_type)
                .ok_or_else(|| CameraError::other("movie output has no video connection"))?;
            connection.setVideoRotationAngle(settings.video_rotation_angle);
            if connection.isVideoStabilizationSupported() {
                connection.setPreferredVideoStabilizationMode(if settings.stabilization {
                    AVCaptureVideoStabilizationMode::Auto
                } else {
                    AVCaptureVideoStabilizationMode::Off
                });
            }

            let url = NSURL::fileURLWithPath(&NSString::from_str(path_str));
            let delegate = AvfRecordingDelegate::new(path.to_path_buf(), done);
            self.movie_output.startRecordingToOutputFileURL_recordingDelegate(
                &url,
                ProtocolObject::from_ref(&*delegate),
            );
            *self.recording_delegate.lock().unwrap_or_else(|p| p.into_inner()) = Some(delegate);
        }
        Ok(())
    }

    fn stop_recording(&self) -> Result<(), CameraError> {
        if !self.is_recording() {
            return Err(CameraError::NotRecording);
        }
        unsafe { self.movie_output.stopRecording() };
        Ok(())
    }

    fn is_recording(&self) -> bool {
        unsafe { self.movie_output.isRecording() }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
