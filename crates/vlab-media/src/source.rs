//! Frame sources: sequential decoders yielding one frame at a time.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vlab_models::MediaSource;

use crate::command::spawn_stderr_tail;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// A sequential frame decoder.
///
/// Only one frame is held in memory at a time. Dropping a source releases
/// its decoder.
#[async_trait]
pub trait FrameSource: Send {
    /// Probed description of the source.
    fn info(&self) -> &MediaSource;

    /// Next decoded frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Release the decoder.
    async fn close(&mut self) -> MediaResult<()>;
}

/// Decodes a video through an FFmpeg `rawvideo`/`rgb24` pipe.
pub struct FfmpegSource {
    info: MediaSource,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    frame_bytes: usize,
    frames_read: u64,
}

impl FfmpegSource {
    /// Spawn the decoder for an already probed source.
    pub fn spawn(ffmpeg: &Path, info: MediaSource) -> MediaResult<Self> {
        let path: PathBuf = info.path.clone();
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(&path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::source_unreadable(&path, format!("failed to spawn decoder: {}", e))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::source_unreadable(&path, "failed to capture decoder stdout"))?;
        let stderr_task = child.stderr.take().map(spawn_stderr_tail);

        let frame_bytes = info.width as usize * info.height as usize * 3;
        debug!(path = %path.display(), frame_bytes, "Decoder started");

        Ok(Self {
            info,
            child: Some(child),
            stdout: Some(stdout),
            stderr_task,
            frame_bytes,
            frames_read: 0,
        })
    }

    /// Reap the decoder after end of stream; a failed decoder that produced
    /// no frames means the source could not be read.
    async fn finish_decoder(&mut self) -> MediaResult<()> {
        self.stdout = None;
        let status = match self.child.as_mut() {
            Some(child) => Some(child.wait().await?),
            None => None,
        };
        self.child = None;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        match status {
            Some(status) if !status.success() && self.frames_read == 0 => {
                Err(MediaError::source_unreadable(
                    &self.info.path,
                    if stderr.is_empty() {
                        format!("decoder exited with {:?}", status.code())
                    } else {
                        stderr
                    },
                ))
            }
            Some(status) if !status.success() => {
                warn!(
                    path = %self.info.path.display(),
                    frames = self.frames_read,
                    code = ?status.code(),
                    "Decoder exited early; treating as end of stream"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    fn info(&self) -> &MediaSource {
        &self.info
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            let n = stdout
                .read(&mut buf[filled..])
                .await
                .map_err(|e| MediaError::source_unreadable(&self.info.path, e.to_string()))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < self.frame_bytes {
            if filled > 0 {
                warn!(
                    path = %self.info.path.display(),
                    bytes = filled,
                    "Dropping truncated trailing frame"
                );
            }
            self.finish_decoder().await?;
            return Ok(None);
        }

        self.frames_read += 1;
        Frame::from_raw(self.info.width, self.info.height, 3, buf).map(Some)
    }

    async fn close(&mut self) -> MediaResult<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Killing an already exited decoder is fine
            let _ = child.kill().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }
}
