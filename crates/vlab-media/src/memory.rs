//! In-memory backend for synthetic sources.
//!
//! Sources are registered frame lists keyed by path. Sinks write each
//! frame's raw RGB bytes to the requested file, so size checks and file
//! moves behave as with a real encoder, and keep a copy of every frame for
//! inspection.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use vlab_models::MediaSource;

use crate::backend::MediaBackend;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::sink::{check_frame_size, FrameSink};
use crate::source::FrameSource;

type WrittenFrames = Arc<Mutex<HashMap<PathBuf, Vec<Frame>>>>;

/// Backend serving registered in-memory clips.
#[derive(Default)]
pub struct MemoryBackend {
    clips: Mutex<HashMap<PathBuf, (MediaSource, Vec<Frame>)>>,
    written: WrittenFrames,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip under `info.path`.
    pub fn insert(&self, info: MediaSource, frames: Vec<Frame>) {
        let mut clips = self.clips.lock().unwrap_or_else(|p| p.into_inner());
        clips.insert(info.path.clone(), (info, frames));
    }

    /// Frames written so far to a sink at `path`.
    pub fn written_frames(&self, path: &Path) -> Vec<Frame> {
        let written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        written.get(path).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MediaBackend for MemoryBackend {
    async fn open_source(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let clips = self.clips.lock().unwrap_or_else(|p| p.into_inner());
        let (info, frames) = clips
            .get(path)
            .cloned()
            .ok_or_else(|| MediaError::source_unreadable(path, "no such clip"))?;
        Ok(Box::new(MemorySource {
            info,
            frames: frames.into(),
        }))
    }

    async fn open_sink(&self, path: &Path, info: &MediaSource) -> MediaResult<Box<dyn FrameSink>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MediaError::sink_unopenable(path, e.to_string()))?;
            }
        }
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| MediaError::sink_unopenable(path, e.to_string()))?;
        {
            let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
            written.insert(path.to_path_buf(), Vec::new());
        }
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            width: info.width,
            height: info.height,
            file: Some(file),
            written: self.written.clone(),
        }))
    }
}

/// Source yielding registered frames in order.
pub struct MemorySource {
    info: MediaSource,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(info: MediaSource, frames: Vec<Frame>) -> Self {
        Self {
            info,
            frames: frames.into(),
        }
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    fn info(&self) -> &MediaSource {
        &self.info
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    async fn close(&mut self) -> MediaResult<()> {
        self.frames.clear();
        Ok(())
    }
}

/// Sink writing raw frame bytes to a file.
pub struct MemorySink {
    path: PathBuf,
    width: u32,
    height: u32,
    file: Option<tokio::fs::File>,
    written: WrittenFrames,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        check_frame_size(frame, self.width, self.height)?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| MediaError::internal("Write after sink was finished"))?;
        file.write_all(frame.as_bytes()).await?;
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        written.entry(self.path.clone()).or_default().push(frame.clone());
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
