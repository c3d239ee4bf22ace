//! Media backends: open frame sources and sinks for a path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vlab_models::MediaSource;

use crate::command::resolve_binary;
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;
use crate::sink::{FfmpegSink, FrameSink, IntermediateCodec};
use crate::source::{FfmpegSource, FrameSource};

/// Opens decoders and encoders for the stream processor.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Probe and open a source for sequential decoding.
    async fn open_source(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;

    /// Open an intermediate sink sized like `info`.
    async fn open_sink(&self, path: &Path, info: &MediaSource) -> MediaResult<Box<dyn FrameSink>>;
}

/// Backend configuration.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackendConfig {
    /// FFmpeg executable; resolved from `PATH` when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// FFprobe executable; resolved from `PATH` when unset
    pub ffprobe_path: Option<PathBuf>,
    pub intermediate: IntermediateCodec,
}

/// Backend that decodes and encodes through FFmpeg subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    intermediate: IntermediateCodec,
}

impl FfmpegBackend {
    /// Resolve executables once, at construction.
    pub fn new(config: FfmpegBackendConfig) -> MediaResult<Self> {
        let ffmpeg = resolve_binary(config.ffmpeg_path.as_deref(), "ffmpeg")
            .ok_or(MediaError::FfmpegNotFound)?;
        let ffprobe = resolve_binary(config.ffprobe_path.as_deref(), "ffprobe")
            .ok_or(MediaError::FfprobeNotFound)?;
        Ok(Self {
            ffmpeg,
            ffprobe,
            intermediate: config.intermediate,
        })
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    /// Probe a media file.
    pub async fn probe(&self, path: &Path) -> MediaResult<MediaSource> {
        probe_media(&self.ffprobe, path).await
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn open_source(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let info = self.probe(path).await?;
        Ok(Box::new(FfmpegSource::spawn(&self.ffmpeg, info)?))
    }

    async fn open_sink(&self, path: &Path, info: &MediaSource) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(
            FfmpegSink::spawn(&self.ffmpeg, path, info, &self.intermediate).await?,
        ))
    }
}
