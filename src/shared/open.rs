// This is free and unencumbered software released into the public domain.

use super::{
    CameraConfig, CameraError, CaptureBackend, CaptureDevice, CaptureSession, MediaLibrary,
};
use std::sync::Arc;

/// Opens the default capture backend for this target and sets up a session
/// on it.
pub fn open_session(
    config: CameraConfig,
    library: Arc<dyn MediaLibrary>,
) -> Result<CaptureSession, CameraError> {
    let (device, backend) = open_backend(&config)?;

    #[cfg(feature = "tracing")]
    asimov_module::tracing::debug!(
        target: "asimov_camera_module",
        backend = %dogma::Named::name(backend.as_ref()),
        device = %dogma::Named::name(device.as_ref()),
        "opened capture backend"
    );

    CaptureSession::open(config, device, backend, library)
}

cfg_if::cfg_if! {
    if #[cfg(all(feature = "avf", any(target_os = "ios", target_os = "macos")))] {
        fn open_backend(
            config: &CameraConfig,
        ) -> Result<(Arc<dyn CaptureDevice>, Arc<dyn CaptureBackend>), CameraError> {
            use super::drivers::avf::{AvfCaptureBackend, AvfCaptureDevice};

            let device = AvfCaptureDevice::find(config.device.as_deref())?;
            let backend = AvfCaptureBackend::new(&device)?;
            Ok((
                Arc::new(device) as Arc<dyn CaptureDevice>,
                Arc::new(backend) as Arc<dyn CaptureBackend>,
            ))
        }
    } else {
        fn open_backend(
            config: &CameraConfig,
        ) -> Result<(Arc<dyn CaptureDevice>, Arc<dyn CaptureBackend>), CameraError> {
            use super::drivers::simulated::{SimulatedBackend, SimulatedDevice};

            match config.device.as_deref() {
                None | Some("") | Some("simulated") => Ok((
                    Arc::new(SimulatedDevice::new()) as Arc<dyn CaptureDevice>,
                    Arc::new(SimulatedBackend::new()) as Arc<dyn CaptureBackend>,
                )),
                Some(_) => Err(CameraError::NoCamera),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{ControlMode, DirectoryLibrary};

    #[cfg(not(all(feature = "avf", any(target_os = "ios", target_os = "macos"))))]
    #[test]
    fn opens_the_simulated_backend() {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(DirectoryLibrary::new(dir.path()));
        let session = open_session(CameraConfig::default(), library.clone()).unwrap();
        assert_eq!(session.mode(), ControlMode::LockedManual);
        assert_eq!(session.backend().backend(), crate::shared::CameraBackend::Simulated);

        let missing = open_session(CameraConfig::default().with_device("FaceTime HD"), library);
        assert!(matches!(missing, Err(CameraError::NoCamera)));
    }
}
