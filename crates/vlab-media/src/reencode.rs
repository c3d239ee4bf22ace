//! Re-encode stage: intermediate file to browser-playable H.264 MP4.
//!
//! Re-encoding never fails a run. A failed attempt is reported as
//! [`ReencodeOutcome::Failed`] and the caller keeps the intermediate file
//! as the final artifact through [`finalize_output`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vlab_models::EncodingConfig;

use crate::command::{resolve_binary, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_min_size, file_size, move_file, remove_if_exists};
use crate::metrics;

/// Default re-encode timeout (30 minutes).
pub const DEFAULT_REENCODE_TIMEOUT_SECS: u64 = 30 * 60;
/// Smallest plausible video file, in bytes.
pub const MIN_VIDEO_SIZE: u64 = 1000;

/// Result of one re-encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReencodeOutcome {
    /// Final file written; intermediate removed
    Encoded,
    /// Nothing usable was produced
    Failed(String),
}

impl ReencodeOutcome {
    pub fn is_encoded(&self) -> bool {
        matches!(self, ReencodeOutcome::Encoded)
    }
}

/// Transcodes an intermediate file into its final location.
#[async_trait]
pub trait Reencoder: Send + Sync {
    /// Attempt the transcode. Never returns an error; failures are outcomes.
    async fn reencode(&self, intermediate: &Path, final_path: &Path) -> ReencodeOutcome;
}

/// Re-encode configuration.
#[derive(Debug, Clone)]
pub struct ReencodeConfig {
    /// FFmpeg executable; resolved from `PATH` once when unset
    pub ffmpeg_path: Option<PathBuf>,
    pub encoding: EncodingConfig,
    pub timeout_secs: u64,
    /// Input and output must be larger than this many bytes
    pub min_output_size: u64,
}

impl Default for ReencodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            encoding: EncodingConfig::default(),
            timeout_secs: DEFAULT_REENCODE_TIMEOUT_SECS,
            min_output_size: MIN_VIDEO_SIZE,
        }
    }
}

/// Re-encoder backed by the `ffmpeg` CLI.
#[derive(Debug, Clone)]
pub struct FfmpegReencoder {
    ffmpeg: Option<PathBuf>,
    config: ReencodeConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl FfmpegReencoder {
    /// Build a re-encoder. A missing FFmpeg is not an error here: every
    /// attempt then reports failure so the fallback can run.
    pub fn new(config: ReencodeConfig) -> Self {
        let ffmpeg = resolve_binary(config.ffmpeg_path.as_deref(), "ffmpeg");
        if ffmpeg.is_none() {
            warn!("FFmpeg not found; outputs will keep the intermediate encoding");
        }
        Self {
            ffmpeg,
            config,
            cancel: None,
        }
    }

    /// Kill the running transcode once `rx` holds `true`.
    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    pub fn config(&self) -> &ReencodeConfig {
        &self.config
    }

    /// Build the FFmpeg command for one transcode.
    pub fn command(&self, intermediate: &Path, final_path: &Path) -> FfmpegCommand {
        FfmpegCommand::new(intermediate, final_path).encoding(&self.config.encoding)
    }

    async fn try_reencode(&self, intermediate: &Path, final_path: &Path) -> MediaResult<()> {
        let ffmpeg = self.ffmpeg.as_ref().ok_or(MediaError::FfmpegNotFound)?;

        if !intermediate.exists() {
            return Err(MediaError::FileNotFound(intermediate.to_path_buf()));
        }
        let input_size = ensure_min_size(intermediate, self.config.min_output_size).await?;
        debug!(input = %intermediate.display(), bytes = input_size, "Starting re-encode");

        let mut runner = FfmpegRunner::new(ffmpeg).with_timeout(self.config.timeout_secs);
        if let Some(rx) = &self.cancel {
            runner = runner.with_cancel(rx.clone());
        }
        let cmd = self.command(intermediate, final_path);
        let output = final_path.display().to_string();
        let result = runner
            .run_with_progress(&cmd, move |p| {
                if p.is_complete {
                    debug!(output = %output, frames = p.frame, speed = p.speed, "Re-encode finished");
                }
            })
            .await;
        if let Err(e) = result {
            if let MediaError::FfmpegFailed { stderr: Some(stderr), .. } = &e {
                log_stderr_hints(stderr);
            }
            return Err(e);
        }

        ensure_min_size(final_path, self.config.min_output_size).await?;
        Ok(())
    }
}

#[async_trait]
impl Reencoder for FfmpegReencoder {
    async fn reencode(&self, intermediate: &Path, final_path: &Path) -> ReencodeOutcome {
        match self.try_reencode(intermediate, final_path).await {
            Ok(()) => {
                let size = file_size(final_path).await;
                info!(output = %final_path.display(), bytes = size, "Re-encode complete");
                if let Err(e) = tokio::fs::remove_file(intermediate).await {
                    warn!(
                        "Failed to remove intermediate file {}: {}",
                        intermediate.display(),
                        e
                    );
                }
                ReencodeOutcome::Encoded
            }
            Err(e) => {
                warn!(input = %intermediate.display(), error = %e, "Re-encode failed");
                ReencodeOutcome::Failed(MediaError::ReencodeFailed(e.to_string()).to_string())
            }
        }
    }
}

fn log_stderr_hints(stderr: &str) {
    for line in stderr.lines().rev().take(5).collect::<Vec<_>>().into_iter().rev() {
        warn!("ffmpeg: {}", line);
    }
    if stderr.contains("libx264") || stderr.contains("Unknown encoder") {
        warn!("Hint: this FFmpeg build appears to lack libx264");
    }
    if stderr.contains("moov atom not found") {
        warn!("Hint: the intermediate file is incomplete (moov atom missing)");
    }
}

/// Put the final artifact in place after a re-encode attempt.
///
/// On [`ReencodeOutcome::Encoded`] the final file already exists. Otherwise
/// any partial final file is removed and the intermediate is moved into the
/// final position. Returns `true` when the fallback was used.
pub async fn finalize_output(
    outcome: &ReencodeOutcome,
    intermediate: &Path,
    final_path: &Path,
) -> MediaResult<bool> {
    match outcome {
        ReencodeOutcome::Encoded => Ok(false),
        ReencodeOutcome::Failed(reason) => {
            warn!(
                output = %final_path.display(),
                reason = %reason,
                "Using intermediate file as final output"
            );
            remove_if_exists(final_path).await;
            move_file(intermediate, final_path).await?;
            metrics::record_reencode_fallback();
            Ok(true)
        }
    }
}
