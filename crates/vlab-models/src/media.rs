//! Media source descriptions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff", "gif"];

/// Whether a media item is a video or a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Guess the media kind from a file extension. Anything that is not a
    /// known image extension is treated as video.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let is_image = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);

        if is_image {
            MediaKind::Image
        } else {
            MediaKind::Video
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Probed, read-only description of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    /// Source file path
    pub path: PathBuf,
    /// Video or image
    pub kind: MediaKind,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (video only)
    pub fps: Option<f64>,
    /// Number of frames; 0 when unknown (video only)
    pub frame_count: u64,
}

impl MediaSource {
    /// Describe a video source.
    pub fn video(path: impl Into<PathBuf>, width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Video,
            width,
            height,
            fps: Some(fps),
            frame_count,
        }
    }

    /// Describe a still image.
    pub fn image(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            kind: MediaKind::Image,
            width,
            height,
            fps: None,
            frame_count: 1,
        }
    }

    /// Frame rate, falling back to 30 fps when the container did not report one.
    pub fn fps_or_default(&self) -> f64 {
        match self.fps {
            Some(fps) if fps > 0.0 && fps.is_finite() => fps,
            _ => 30.0,
        }
    }
}
