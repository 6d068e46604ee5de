// This is free and unencumbered software released into the public domain.

// C ABI over a capture session, for hosts written in Swift or Objective-C.

use crate::shared::{
    CameraConfig, CameraError, CaptureSession, Completion, DirectoryLibrary, LayoutVariant,
    ParameterKind, RecordingToggle, SavedAsset, open_session,
};
use core::ffi::{c_char, c_double, c_void};
use core::ptr;
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::sync::Arc;

/// Called with the formatted label after every parameter change.
///
/// `text` is only valid for the duration of the callback.
pub type AsimovCameraLabelCallback =
    extern "C" fn(parameter: AsimovCameraParameter, text: *const c_char, user_data: *mut c_void);

/// Called once a photo or video has been saved, or has failed.
///
/// `identifier` is NULL on failure and only valid for the duration of the
/// callback.
pub type AsimovCameraAssetCallback = extern "C" fn(
    code: AsimovCameraErrorCode,
    identifier: *const c_char,
    user_data: *mut c_void,
);

/// Error codes returned by the FFI API.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsimovCameraErrorCode {
    Ok = 0,
    NoDriver = 1,
    NoCamera = 2,
    DriverError = 3,
    InvalidArgument = 4,
    Unsupported = 5,
    ConfigurationLock = 6,
    FormatUnavailable = 7,
    InvalidState = 8,
    Closed = 9,
}

impl From<CameraError> for AsimovCameraErrorCode {
    fn from(err: CameraError) -> Self {
        use AsimovCameraErrorCode::*;
        match err {
            CameraError::NoDriver => NoDriver,
            CameraError::NoCamera => NoCamera,
            CameraError::InvalidConfig(_) => InvalidArgument,
            CameraError::Unsupported(_) => Unsupported,
            CameraError::NotConfigured | CameraError::ConfigurationLock(_) => ConfigurationLock,
            CameraError::FormatUnavailable { .. } => FormatUnavailable,
            CameraError::AlreadyRecording | CameraError::NotRecording => InvalidState,
            CameraError::Closed => Closed,
            CameraError::DriverError { .. } | CameraError::Other(_) => DriverError,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsimovCameraParameter {
    Iso = 0,
    Exposure = 1,
    Focus = 2,
}

impl From<AsimovCameraParameter> for ParameterKind {
    fn from(parameter: AsimovCameraParameter) -> Self {
        match parameter {
            AsimovCameraParameter::Iso => ParameterKind::Iso,
            AsimovCameraParameter::Exposure => ParameterKind::ExposureDuration,
            AsimovCameraParameter::Focus => ParameterKind::FocusPosition,
        }
    }
}

impl From<ParameterKind> for AsimovCameraParameter {
    fn from(kind: ParameterKind) -> Self {
        match kind {
            ParameterKind::Iso => AsimovCameraParameter::Iso,
            ParameterKind::ExposureDuration => AsimovCameraParameter::Exposure,
            ParameterKind::FocusPosition => AsimovCameraParameter::Focus,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsimovCameraLayout {
    Standalone = 0,
    Embedded = 1,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AsimovCameraRange {
    pub minimum: c_double,
    pub maximum: c_double,
}

/// Internal handle we keep on the Rust side.
///
/// Swift only sees this as an opaque `void*`.
pub struct AsimovCameraHandle {
    pub session: CaptureSession,
}

/// Convert a C string pointer into a Rust `String`.
///
/// - `NULL` is treated as an empty string.
/// - Returns `InvalidArgument` if the C string is not valid UTF-8.
fn c_str_to_string(s: *const c_char) -> Result<String, AsimovCameraErrorCode> {
    if s.is_null() {
        return Ok(String::new());
    }

    unsafe {
        CStr::from_ptr(s)
            .to_str()
            .map(|s| s.to_owned())
            .map_err(|_| AsimovCameraErrorCode::InvalidArgument)
    }
}

fn handle_mut<'a>(handle: *mut c_void) -> Option<&'a mut AsimovCameraHandle> {
    unsafe { (handle as *mut AsimovCameraHandle).as_mut() }
}

fn into_code(result: Result<(), CameraError>) -> AsimovCameraErrorCode {
    result
        .map(|_| AsimovCameraErrorCode::Ok)
        .unwrap_or_else(Into::into)
}

/// Waits for `completion` on a helper thread and reports it to `callback`.
fn deliver_asset(
    completion: Completion<SavedAsset>,
    callback: AsimovCameraAssetCallback,
    user_data: *mut c_void,
) -> AsimovCameraErrorCode {
    // Store the pointer as plain bits so the closure only captures a `usize`.
    let user_bits = user_data as usize;
    let spawned = std::thread::Builder::new()
        .name("asimov-camera-asset".into())
        .spawn(move || {
            let user_ptr = user_bits as *mut c_void;
            match completion.wait() {
                Ok(asset) => match CString::new(asset.identifier) {
                    Ok(identifier) => {
                        callback(AsimovCameraErrorCode::Ok, identifier.as_ptr(), user_ptr)
                    },
                    Err(_) => callback(AsimovCameraErrorCode::DriverError, ptr::null(), user_ptr),
                },
                Err(err) => callback(err.into(), ptr::null(), user_ptr),
            }
        });
    match spawned {
        Ok(_) => AsimovCameraErrorCode::Ok,
        Err(_) => AsimovCameraErrorCode::DriverError,
    }
}

/// Open a camera, select the 4K60 format, and lock it into manual mode.
///
/// Parameters:
/// - `device`: device ID or name; NULL or "" = default rear camera.
/// - `layout`: preview layout, which sets the preview rotation.
/// - `media_dir`: directory finished photos and videos are saved to;
///   NULL = a directory under the system temp dir.
/// - `out_handle`: [out] pointer to receive an opaque camera handle.
///
/// The session is not started; call [`asimov_camera_start`].
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_open(
    device: *const c_char,
    layout: AsimovCameraLayout,
    media_dir: *const c_char,
    out_handle: *mut *mut c_void,
) -> AsimovCameraErrorCode {
    if out_handle.is_null() {
        return AsimovCameraErrorCode::InvalidArgument;
    }

    let device = match c_str_to_string(device) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let media_dir = match c_str_to_string(media_dir) {
        Ok(s) if s.is_empty() => std::env::temp_dir().join("asimov-camera"),
        Ok(s) => PathBuf::from(s),
        Err(e) => return e,
    };

    let layout = match layout {
        AsimovCameraLayout::Standalone => LayoutVariant::Standalone,
        AsimovCameraLayout::Embedded => LayoutVariant::Embedded,
    };
    let mut config = CameraConfig::for_layout(layout);
    if !device.is_empty() {
        config = config.with_device(device);
    }

    match open_session(config, Arc::new(DirectoryLibrary::new(media_dir))) {
        Ok(session) => {
            let handle = Box::new(AsimovCameraHandle { session });
            unsafe {
                *out_handle = Box::into_raw(handle) as *mut c_void;
            }
            AsimovCameraErrorCode::Ok
        },
        Err(e) => e.into(),
    }
}

/// Start the capture session in the background.
///
/// Returns as soon as the start has been scheduled.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_start(handle: *mut c_void) -> AsimovCameraErrorCode {
    match handle_mut(handle) {
        Some(handle) => into_code(handle.session.start()),
        None => AsimovCameraErrorCode::InvalidArgument,
    }
}

/// Stop any recording and the capture session. Calling `stop` multiple times
/// is safe.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_stop(handle: *mut c_void) -> AsimovCameraErrorCode {
    match handle_mut(handle) {
        Some(handle) => into_code(handle.session.stop()),
        None => AsimovCameraErrorCode::InvalidArgument,
    }
}

/// Free the camera handle and all associated resources.
///
/// After this call, the `handle` must not be used again.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_free(handle: *mut c_void) {
    if handle.is_null() {
        return;
    }

    unsafe {
        drop(Box::from_raw(handle as *mut AsimovCameraHandle));
    }
}

/// Register a label callback and immediately publish the current labels to
/// it.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_set_label_callback(
    handle: *mut c_void,
    callback: AsimovCameraLabelCallback,
    user_data: *mut c_void,
) -> AsimovCameraErrorCode {
    let Some(handle) = handle_mut(handle) else {
        return AsimovCameraErrorCode::InvalidArgument;
    };

    let user_bits = user_data as usize;
    handle
        .session
        .controller()
        .add_label_sink(Arc::new(move |kind: ParameterKind, text: &str| {
            if let Ok(text) = CString::new(text) {
                callback(kind.into(), text.as_ptr(), user_bits as *mut c_void);
            }
        }));
    handle.session.publish_labels();
    AsimovCameraErrorCode::Ok
}

/// Apply a slider value. `out_applied` (optional) receives the value the
/// device was actually set to after clamping or snapping.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_set_parameter(
    handle: *mut c_void,
    parameter: AsimovCameraParameter,
    value: c_double,
    out_applied: *mut c_double,
) -> AsimovCameraErrorCode {
    let Some(handle) = handle_mut(handle) else {
        return AsimovCameraErrorCode::InvalidArgument;
    };

    match handle.session.controller().set(parameter.into(), value) {
        Ok(applied) => {
            if !out_applied.is_null() {
                unsafe { *out_applied = applied };
            }
            AsimovCameraErrorCode::Ok
        },
        Err(e) => e.into(),
    }
}

/// The range the slider for `parameter` should span. Exposure is in seconds.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_get_range(
    handle: *mut c_void,
    parameter: AsimovCameraParameter,
    out_range: *mut AsimovCameraRange,
) -> AsimovCameraErrorCode {
    let Some(handle) = handle_mut(handle) else {
        return AsimovCameraErrorCode::InvalidArgument;
    };
    if out_range.is_null() {
        return AsimovCameraErrorCode::InvalidArgument;
    }

    let range = handle.session.controller().slider_range(parameter.into());
    unsafe {
        *out_range = AsimovCameraRange {
            minimum: range.minimum,
            maximum: range.maximum,
        };
    }
    AsimovCameraErrorCode::Ok
}

#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_get_value(
    handle: *mut c_void,
    parameter: AsimovCameraParameter,
    out_value: *mut c_double,
) -> AsimovCameraErrorCode {
    let Some(handle) = handle_mut(handle) else {
        return AsimovCameraErrorCode::InvalidArgument;
    };
    if out_value.is_null() {
        return AsimovCameraErrorCode::InvalidArgument;
    }

    let kind = ParameterKind::from(parameter);
    let [iso, exposure, focus] = handle.session.controller().settings();
    let value = match kind {
        ParameterKind::Iso => iso.value,
        ParameterKind::ExposureDuration => exposure.value,
        ParameterKind::FocusPosition => focus.value,
    };
    unsafe { *out_value = value };
    AsimovCameraErrorCode::Ok
}

/// Rotation the host should apply to its preview, in radians.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_preview_rotation(handle: *mut c_void) -> c_double {
    handle_mut(handle)
        .map(|handle| handle.session.preview_rotation())
        .unwrap_or(0.0)
}

/// Capture a photo. `callback` fires on a background thread once the photo
/// is saved.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_capture_photo(
    handle: *mut c_void,
    callback: AsimovCameraAssetCallback,
    user_data: *mut c_void,
) -> AsimovCameraErrorCode {
    let Some(handle) = handle_mut(handle) else {
        return AsimovCameraErrorCode::InvalidArgument;
    };

    deliver_asset(handle.session.capture_photo(), callback, user_data)
}

/// Start or stop recording.
///
/// When a recording starts, `callback` fires once it has been stopped and
/// saved. `out_recording` (optional) receives whether a recording is now in
/// progress.
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_toggle_recording(
    handle: *mut c_void,
    callback: AsimovCameraAssetCallback,
    user_data: *mut c_void,
    out_recording: *mut bool,
) -> AsimovCameraErrorCode {
    let Some(handle) = handle_mut(handle) else {
        return AsimovCameraErrorCode::InvalidArgument;
    };

    let toggle = match handle.session.toggle_recording() {
        Ok(toggle) => toggle,
        Err(e) => return e.into(),
    };
    let recording = matches!(toggle, RecordingToggle::Started { .. });
    if !out_recording.is_null() {
        unsafe { *out_recording = recording };
    }
    match toggle {
        RecordingToggle::Started { completion, .. } => deliver_asset(completion, callback, user_data),
        RecordingToggle::Stopped => AsimovCameraErrorCode::Ok,
    }
}

/// Get the underlying `AVCaptureSession*` for the host's preview layer, or
/// NULL when the session is not AVFoundation-backed.
///
/// The session is owned by Rust and stays valid until
/// [`asimov_camera_free`] is called.
#[cfg(all(feature = "avf", any(target_os = "ios", target_os = "macos")))]
#[unsafe(no_mangle)]
pub extern "C" fn asimov_camera_get_session(handle: *mut c_void) -> *mut c_void {
    use crate::shared::drivers::avf::AvfCaptureBackend;

    let Some(handle) = handle_mut(handle) else {
        return ptr::null_mut();
    };
    handle
        .session
        .backend()
        .as_any()
        .downcast_ref::<AvfCaptureBackend>()
        .map(AvfCaptureBackend::session_ptr)
        .unwrap_or(ptr::null_mut())
}

#[cfg(all(test, not(all(feature = "avf", any(target_os = "ios", target_os = "macos")))))]
mod tests {
    use super::*;
    use std::sync::{Mutex, mpsc};
    use std::time::Duration;

    extern "C" fn record_label(
        parameter: AsimovCameraParameter,
        text: *const c_char,
        user_data: *mut c_void,
    ) {
        let labels = unsafe { &*(user_data as *const Mutex<Vec<(AsimovCameraParameter, String)>>) };
        let text = unsafe { CStr::from_ptr(text) }.to_str().unwrap().to_string();
        labels.lock().unwrap().push((parameter, text));
    }

    extern "C" fn send_asset(
        code: AsimovCameraErrorCode,
        identifier: *const c_char,
        user_data: *mut c_void,
    ) {
        let tx = unsafe { &*(user_data as *const Mutex<mpsc::Sender<(AsimovCameraErrorCode, bool)>>) };
        let _ = tx.lock().unwrap().send((code, !identifier.is_null()));
    }

    fn open(media_dir: &CStr) -> *mut c_void {
        let mut handle = ptr::null_mut();
        let code = asimov_camera_open(
            ptr::null(),
            AsimovCameraLayout::Standalone,
            media_dir.as_ptr(),
            &mut handle,
        );
        assert_eq!(code, AsimovCameraErrorCode::Ok);
        assert!(!handle.is_null());
        handle
    }

    #[test]
    fn null_arguments_are_rejected() {
        assert_eq!(
            asimov_camera_open(ptr::null(), AsimovCameraLayout::Standalone, ptr::null(), ptr::null_mut()),
            AsimovCameraErrorCode::InvalidArgument
        );
        assert_eq!(
            asimov_camera_start(ptr::null_mut()),
            AsimovCameraErrorCode::InvalidArgument
        );
        asimov_camera_free(ptr::null_mut());
    }

    #[test]
    fn unknown_device_is_reported() {
        let device = CString::new("Studio Display Camera").unwrap();
        let mut handle = ptr::null_mut();
        let code = asimov_camera_open(
            device.as_ptr(),
            AsimovCameraLayout::Embedded,
            ptr::null(),
            &mut handle,
        );
        assert_eq!(code, AsimovCameraErrorCode::NoCamera);
        assert!(handle.is_null());
    }

    #[test]
    fn parameters_ranges_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let media_dir = CString::new(dir.path().to_str().unwrap()).unwrap();
        let handle = open(&media_dir);

        let labels: Mutex<Vec<(AsimovCameraParameter, String)>> = Mutex::new(Vec::new());
        let user_data = &labels as *const _ as *mut c_void;
        assert_eq!(
            asimov_camera_set_label_callback(handle, record_label, user_data),
            AsimovCameraErrorCode::Ok
        );
        assert_eq!(labels.lock().unwrap().len(), 3);

        let mut range = AsimovCameraRange { minimum: 0.0, maximum: 0.0 };
        asimov_camera_get_range(handle, AsimovCameraParameter::Iso, &mut range);
        assert_eq!(range, AsimovCameraRange { minimum: 32.0, maximum: 3200.0 });

        let mut applied = 0.0;
        let code = asimov_camera_set_parameter(handle, AsimovCameraParameter::Iso, 4000.0, &mut applied);
        assert_eq!(code, AsimovCameraErrorCode::Ok);
        assert_eq!(applied, 3200.0);

        asimov_camera_set_parameter(handle, AsimovCameraParameter::Focus, 0.53, &mut applied);
        let mut focus = 0.0;
        asimov_camera_get_value(handle, AsimovCameraParameter::Focus, &mut focus);
        assert!((focus - 0.54).abs() < 1e-12);

        {
            let labels = labels.lock().unwrap();
            assert_eq!(labels[3], (AsimovCameraParameter::Iso, "3200".to_string()));
            assert_eq!(labels[4], (AsimovCameraParameter::Focus, "0.54".to_string()));
        }

        assert_eq!(asimov_camera_preview_rotation(handle), -core::f64::consts::FRAC_PI_2);
        asimov_camera_free(handle);
    }

    #[test]
    fn photo_and_recording_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let media_dir = CString::new(dir.path().to_str().unwrap()).unwrap();
        let handle = open(&media_dir);
        assert_eq!(asimov_camera_start(handle), AsimovCameraErrorCode::Ok);

        let (tx, rx) = mpsc::channel::<(AsimovCameraErrorCode, bool)>();
        let tx = Mutex::new(tx);
        let user_data = &tx as *const _ as *mut c_void;

        // the session starts in the background
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !handle_mut(handle).unwrap().session.is_running() {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(
            asimov_camera_capture_photo(handle, send_asset, user_data),
            AsimovCameraErrorCode::Ok
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (AsimovCameraErrorCode::Ok, true)
        );

        let mut recording = false;
        asimov_camera_toggle_recording(handle, send_asset, user_data, &mut recording);
        assert!(recording);
        asimov_camera_toggle_recording(handle, send_asset, user_data, &mut recording);
        assert!(!recording);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (AsimovCameraErrorCode::Ok, true)
        );

        assert_eq!(asimov_camera_stop(handle), AsimovCameraErrorCode::Ok);
        asimov_camera_free(handle);
    }
}
