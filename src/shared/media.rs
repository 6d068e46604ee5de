// This is free and unencumbered software released into the public domain.

use crate::shared::CameraError;
use derive_more::Display;
use image::{DynamicImage, ImageFormat};
use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum FlashMode {
    #[default]
    #[display("off")]
    Off,
    #[display("on")]
    On,
    #[display("auto")]
    Auto,
}

/// How the stored pixels must be turned to display upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Up,
    Down,
    /// Turn a quarter counter-clockwise.
    Left,
    /// Turn a quarter clockwise.
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoSettings {
    pub max_dimensions: (u32, u32),
    pub flash: FlashMode,
}

impl PhotoSettings {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            max_dimensions: (width, height),
            flash: FlashMode::Off,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordingSettings {
    /// Rotation applied to the recorded video connection, in degrees.
    pub video_rotation_angle: f64,
    pub stabilization: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            video_rotation_angle: 0.0,
            stabilization: false,
        }
    }
}

/// Encoded photo bytes as delivered by the backend.
#[derive(Clone, Debug)]
pub struct CapturedPhoto {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

impl CapturedPhoto {
    /// Returns the photo with its pixels rotated upright and re-encoded as
    /// JPEG. An upright photo is returned unchanged.
    pub fn to_upright(&self) -> Result<CapturedPhoto, CameraError> {
        if self.orientation == Orientation::Up {
            return Ok(self.clone());
        }
        let decoded = image::load_from_memory(&self.data)
            .map_err(|e| CameraError::driver("decoding photo", e))?;
        let rotated = match self.orientation {
            Orientation::Up => decoded,
            Orientation::Down => decoded.rotate180(),
            Orientation::Left => decoded.rotate270(),
            Orientation::Right => decoded.rotate90(),
        };
        let (width, height) = (rotated.width(), rotated.height());
        let mut data = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(rotated.to_rgb8())
            .write_to(&mut data, ImageFormat::Jpeg)
            .map_err(|e| CameraError::driver("encoding photo", e))?;
        Ok(CapturedPhoto {
            data: data.into_inner(),
            width,
            height,
            orientation: Orientation::Up,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedClip {
    pub path: PathBuf,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum MediaKind {
    #[display("photo")]
    Photo,
    #[display("video")]
    Video,
}

/// A photo or video stored by a [`MediaLibrary`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedAsset {
    pub kind: MediaKind,
    /// Library-specific identifier; a file path for [`DirectoryLibrary`].
    pub identifier: String,
}

/// Destination for finished photos and video clips.
///
/// Photos are stored upright whatever their [`Orientation`].
pub trait MediaLibrary: Send + Sync {
    fn save_photo(&self, photo: &CapturedPhoto) -> Result<SavedAsset, CameraError>;
    fn save_video(&self, clip: &RecordedClip) -> Result<SavedAsset, CameraError>;
}

/// Stores media as files in one directory.
#[derive(Clone, Debug)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), CameraError> {
        fs::create_dir_all(&self.root).map_err(|e| CameraError::driver("creating media directory", e))
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn save_photo(&self, photo: &CapturedPhoto) -> Result<SavedAsset, CameraError> {
        self.ensure_root()?;
        let photo = photo.to_upright()?;
        let path = self.root.join(format!("{}.jpg", Uuid::new_v4()));
        fs::write(&path, &photo.data).map_err(|e| CameraError::driver("writing photo", e))?;
        Ok(SavedAsset {
            kind: MediaKind::Photo,
            identifier: path.display().to_string(),
        })
    }

    fn save_video(&self, clip: &RecordedClip) -> Result<SavedAsset, CameraError> {
        self.ensure_root()?;
        let file_name = clip
            .path
            .file_name()
            .ok_or_else(|| CameraError::invalid_config("recorded clip has no file name"))?;
        let path = self.root.join(file_name);
        if path != clip.path {
            // rename fails across filesystems
            if fs::rename(&clip.path, &path).is_err() {
                fs::copy(&clip.path, &path).map_err(|e| CameraError::driver("copying video", e))?;
                let _ = fs::remove_file(&clip.path);
            }
        }
        Ok(SavedAsset {
            kind: MediaKind::Video,
            identifier: path.display().to_string(),
        })
    }
}
