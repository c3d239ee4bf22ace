//! Shared helpers for vlab-media integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use vlab_media::{
    Detector, Frame, MediaResult, MemoryBackend, ProgressSink, ReencodeOutcome, Reencoder,
    StreamConfig, StreamProcessor,
};
use vlab_models::{Detection, MediaSource, ProgressReport};

/// Frame whose pixel (0, 0) red channel holds `tag`, over a moving gradient.
pub fn tagged_frame(tag: u8, width: u32, height: u32) -> Frame {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if x == 0 && y == 0 {
            Rgb([tag, 0, 0])
        } else {
            Rgb([
                ((x * 5 + u32::from(tag) * 3) % 256) as u8,
                ((y * 7) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        }
    });
    Frame::from_rgb(img)
}

/// Read back the tag written by [`tagged_frame`].
pub fn frame_tag(frame: &Frame) -> u8 {
    frame.as_rgb().get_pixel(0, 0)[0]
}

/// `count` tagged frames.
pub fn synthetic_frames(count: u8, width: u32, height: u32) -> Vec<Frame> {
    (0..count).map(|i| tagged_frame(i, width, height)).collect()
}

/// Register a synthetic clip at `dir/name` and return its path.
pub fn insert_clip(
    backend: &MemoryBackend,
    dir: &Path,
    name: &str,
    frames: Vec<Frame>,
    reported_total: u64,
) -> PathBuf {
    let path = dir.join(name);
    let (width, height) = frames.first().map(Frame::dimensions).unwrap_or((16, 16));
    backend.insert(
        MediaSource::video(&path, width, height, 25.0, reported_total),
        frames,
    );
    path
}

/// Stream processor over the memory backend with no flush delay.
pub fn processor<R: Reencoder>(
    backend: Arc<MemoryBackend>,
    reencoder: R,
) -> StreamProcessor<MemoryBackend, R> {
    StreamProcessor::new(backend, Arc::new(reencoder)).with_config(StreamConfig {
        flush_delay: Duration::ZERO,
        ..Default::default()
    })
}

/// Encoder that is never available.
pub struct FailingReencoder;

#[async_trait]
impl Reencoder for FailingReencoder {
    async fn reencode(&self, _intermediate: &Path, _final_path: &Path) -> ReencodeOutcome {
        ReencodeOutcome::Failed("ffmpeg: not found".into())
    }
}

/// Encoder that copies the intermediate into place and removes it.
pub struct CopyReencoder;

#[async_trait]
impl Reencoder for CopyReencoder {
    async fn reencode(&self, intermediate: &Path, final_path: &Path) -> ReencodeOutcome {
        match tokio::fs::copy(intermediate, final_path).await {
            Ok(_) => {
                let _ = tokio::fs::remove_file(intermediate).await;
                ReencodeOutcome::Encoded
            }
            Err(e) => ReencodeOutcome::Failed(e.to_string()),
        }
    }
}

/// Encoder that claims success but writes a truncated 10-byte file.
pub struct TruncatingReencoder;

#[async_trait]
impl Reencoder for TruncatingReencoder {
    async fn reencode(&self, intermediate: &Path, final_path: &Path) -> ReencodeOutcome {
        let _ = tokio::fs::write(final_path, [0u8; 10]).await;
        let _ = tokio::fs::remove_file(intermediate).await;
        ReencodeOutcome::Encoded
    }
}

/// Progress sink keeping every report.
#[derive(Default)]
pub struct RecordingProgress {
    reports: Mutex<Vec<ProgressReport>>,
}

impl RecordingProgress {
    pub fn reports(&self) -> Vec<ProgressReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.reports().iter().map(|r| r.percent).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, report: ProgressReport) {
        self.reports.lock().unwrap().push(report);
    }
}

/// Detector returning fixed detections per frame tag; tags listed in
/// `failing` return an inference error.
#[derive(Default)]
pub struct ScriptedDetector {
    pub by_tag: HashMap<u8, Vec<Detection>>,
    pub failing: Vec<u8>,
}

impl Detector for ScriptedDetector {
    fn infer(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let tag = frame_tag(frame);
        if self.failing.contains(&tag) {
            return Err(vlab_media::MediaError::inference_failed(format!("frame {tag}")));
        }
        Ok(self.by_tag.get(&tag).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
