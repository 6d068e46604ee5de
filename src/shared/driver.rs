// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraError, CapturedPhoto, Completer, MediaKind, PhotoSettings, RecordedClip,
    RecordingSettings, SavedAsset,
};
use derive_more::Display;
use std::{any::Any, path::Path, sync::mpsc::SyncSender};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CameraBackend {
    #[display("avf")]
    Avf,
    #[display("simulated")]
    Simulated,
}

#[derive(Debug)]
pub enum CameraEvent {
    Started {
        backend: CameraBackend,
    },
    Stopped {
        backend: CameraBackend,
    },
    RecordingStarted {
        backend: CameraBackend,
    },
    Saved {
        backend: CameraBackend,
        kind: MediaKind,
        asset: SavedAsset,
    },
    Warning {
        backend: CameraBackend,
        message: String,
    },
    Error {
        backend: CameraBackend,
        error: CameraError,
    },
}

/// The capture session graph: device input plus photo and movie outputs.
///
/// Implementations are shared with the background thread that starts the
/// session, so every method takes `&self`.
pub trait CaptureBackend: dogma::Named + Send + Sync {
    fn backend(&self) -> CameraBackend;

    fn start_running(&self) -> Result<(), CameraError>;

    fn stop_running(&self) -> Result<(), CameraError> {
        Ok(())
    }

    fn is_running(&self) -> bool;

    /// Requests a still photo; `done` resolves when the photo is processed.
    fn capture_photo(&self, settings: &PhotoSettings, done: Completer<CapturedPhoto>);

    /// Starts writing a movie to `path`; `done` resolves when the file is
    /// finished after [`CaptureBackend::stop_recording`].
    fn start_recording(
        &self,
        path: &Path,
        settings: &RecordingSettings,
        done: Completer<RecordedClip>,
    ) -> Result<(), CameraError>;

    fn stop_recording(&self) -> Result<(), CameraError>;

    fn is_recording(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

pub fn report_warning(events_tx: &SyncSender<CameraEvent>, backend: CameraBackend, message: impl Into<String>) {
    let _ = events_tx.try_send(CameraEvent::Warning {
        backend,
        message: message.into(),
    });
}

pub fn report_error(events_tx: &SyncSender<CameraEvent>, backend: CameraBackend, error: CameraError) {
    let _ = events_tx.try_send(CameraEvent::Error { backend, error });
}
