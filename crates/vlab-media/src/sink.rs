//! Frame sinks: sequential encoders for the intermediate file.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::debug;
use vlab_models::encoding::{INTERMEDIATE_QSCALE, INTERMEDIATE_VIDEO_CODEC};
use vlab_models::MediaSource;

use crate::command::spawn_stderr_tail;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// A sequential frame encoder.
///
/// Every frame must have the dimensions the sink was opened with.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the output. Called once, after the last frame.
    async fn finish(&mut self) -> MediaResult<()>;
}

/// Codec settings for the intermediate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateCodec {
    pub codec: String,
    pub qscale: u8,
}

impl Default for IntermediateCodec {
    fn default() -> Self {
        Self {
            codec: INTERMEDIATE_VIDEO_CODEC.to_string(),
            qscale: INTERMEDIATE_QSCALE,
        }
    }
}

/// Error if a frame does not match the dimensions a sink was opened with.
pub fn check_frame_size(frame: &Frame, width: u32, height: u32) -> MediaResult<()> {
    if frame.dimensions() != (width, height) {
        return Err(MediaError::internal(format!(
            "Frame size changed from {}x{} to {}x{}",
            width,
            height,
            frame.width(),
            frame.height()
        )));
    }
    Ok(())
}

/// Encodes frames fed through an FFmpeg `rawvideo` stdin pipe.
pub struct FfmpegSink {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    frames_written: u64,
}

impl FfmpegSink {
    /// Spawn an encoder writing to `path` at the source's size and rate.
    pub async fn spawn(
        ffmpeg: &Path,
        path: &Path,
        info: &MediaSource,
        codec: &IntermediateCodec,
    ) -> MediaResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MediaError::sink_unopenable(path, e.to_string()))?;
            }
        }
        // Fail early on unwritable destinations instead of on the first frame
        tokio::fs::File::create(path)
            .await
            .map_err(|e| MediaError::sink_unopenable(path, e.to_string()))?;

        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", info.width, info.height)])
            .args(["-r", &format!("{}", info.fps_or_default())])
            .args(["-i", "-"])
            .args(["-c:v", &codec.codec, "-q:v", &codec.qscale.to_string()])
            .args(["-pix_fmt", "yuv420p", "-an"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::sink_unopenable(path, format!("failed to spawn encoder: {}", e))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::sink_unopenable(path, "failed to capture encoder stdin"))?;
        let stderr_task = child.stderr.take().map(spawn_stderr_tail);

        debug!(path = %path.display(), codec = %codec.codec, "Intermediate encoder started");

        Ok(Self {
            path: path.to_path_buf(),
            width: info.width,
            height: info.height,
            child: Some(child),
            stdin: Some(stdin),
            stderr_task,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

#[async_trait]
impl FrameSink for FfmpegSink {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        check_frame_size(frame, self.width, self.height)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("Write after sink was finished"))?;
        stdin.write_all(frame.as_bytes()).await.map_err(|e| {
            MediaError::ffmpeg_failed(format!("Intermediate encoder rejected frame: {}", e), None, None)
        })?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.ok();
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("Intermediate encoder failed for {}", self.path.display()),
                Some(stderr),
                status.code(),
            ));
        }
        debug!(path = %self.path.display(), frames = self.frames_written, "Intermediate file closed");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    /// Stand-in encoder that floods stderr before it reads any input.
    fn noisy_encoder(dir: &Path) -> PathBuf {
        let path = dir.join("noisy-ffmpeg");
        std::fs::write(
            &path,
            "#!/bin/sh\nyes 'encoder warning' | head -n 50000 >&2\ncat > /dev/null\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_chatty_encoder_does_not_stall_writes() {
        let dir = TempDir::new().unwrap();
        let encoder = noisy_encoder(dir.path());
        let output = dir.path().join("temp_out.mp4");
        let info = MediaSource::video(dir.path().join("in.mp4"), 32, 24, 25.0, 200);
        let mut sink = FfmpegSink::spawn(&encoder, &output, &info, &IntermediateCodec::default())
            .await
            .unwrap();

        let frame = Frame::blank(32, 24);
        tokio::time::timeout(Duration::from_secs(20), async {
            for _ in 0..200 {
                sink.write_frame(&frame).await.unwrap();
            }
            sink.finish().await.unwrap();
        })
        .await
        .expect("encoder pipes stalled");
        assert_eq!(sink.frames_written(), 200);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let err = check_frame_size(&Frame::blank(8, 8), 16, 8).unwrap_err();
        assert!(matches!(err, MediaError::Internal(_)));
    }
}
