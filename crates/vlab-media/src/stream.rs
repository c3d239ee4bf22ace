//! Frame stream processor.
//!
//! Drives one run through `Opening -> Streaming -> Finalizing -> Done`:
//! decode frames one at a time, transform each, write it to an intermediate
//! file, then hand the intermediate to the re-encode stage. Only one decoded
//! frame is held at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use vlab_models::{FilterStep, PreprocessResult, RunState};

use crate::backend::MediaBackend;
use crate::blocking::run_cpu_bound;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::fs_utils::{ensure_min_size, remove_if_exists};
use crate::metrics::{self, RunKind};
use crate::pipeline::PipelineExecutor;
use crate::progress::{
    streaming_percent, ProgressCadence, ProgressSink, ProgressTracker, DONE_PERCENT,
    REENCODE_START_PERCENT,
};
use crate::reencode::{finalize_output, Reencoder, MIN_VIDEO_SIZE};
use crate::sink::FrameSink;
use crate::source::FrameSource;

/// Smallest plausible still-image output, in bytes.
pub const MIN_IMAGE_SIZE: u64 = 100;
/// Default pause between closing the sink and re-encoding.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(1);
/// Prefix of the intermediate file written beside the final artifact.
pub const INTERMEDIATE_PREFIX: &str = "temp_";

/// Per-frame work done by a run.
pub trait FrameTransform: Send {
    /// Produce the frame to write for input frame `index`.
    ///
    /// The output must keep the input dimensions.
    fn transform(&mut self, index: u64, frame: &Frame) -> MediaResult<Frame>;

    /// How often streaming progress is reported.
    fn cadence(&self) -> ProgressCadence {
        ProgressCadence::PREPROCESS
    }

    /// Metric label for the run.
    fn kind(&self) -> RunKind {
        RunKind::Preprocess
    }
}

/// Applies a filter pipeline to every frame.
pub struct PipelineTransform<'a> {
    executor: PipelineExecutor,
    steps: &'a [FilterStep],
}

impl<'a> PipelineTransform<'a> {
    pub fn new(steps: &'a [FilterStep]) -> Self {
        Self {
            executor: PipelineExecutor::new(),
            steps,
        }
    }
}

impl FrameTransform for PipelineTransform<'_> {
    fn transform(&mut self, _index: u64, frame: &Frame) -> MediaResult<Frame> {
        self.executor.apply(frame, self.steps)
    }
}

/// Stream processor settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Pause after closing the sink so the file is flushed before re-encoding
    pub flush_delay: Duration,
    /// Video artifacts must be larger than this many bytes
    pub min_video_size: u64,
    /// Image artifacts must be larger than this many bytes
    pub min_image_size: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_delay: DEFAULT_FLUSH_DELAY,
            min_video_size: MIN_VIDEO_SIZE,
            min_image_size: MIN_IMAGE_SIZE,
        }
    }
}

/// Counters and paths of a finished streaming run.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub frames_processed: u64,
    pub total_frames: u64,
    pub output_path: PathBuf,
    pub degraded: bool,
}

impl From<StreamOutcome> for PreprocessResult {
    fn from(outcome: StreamOutcome) -> Self {
        PreprocessResult {
            frames_processed: outcome.frames_processed,
            total_frames: outcome.total_frames,
            output_path: outcome.output_path,
            degraded: outcome.degraded,
        }
    }
}

/// Path of the intermediate file for a final artifact: `temp_<name>` in the
/// same directory.
pub fn intermediate_path(output: &Path) -> MediaResult<PathBuf> {
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MediaError::internal(format!("output path has no file name: {}", output.display())))?;
    Ok(output.with_file_name(format!("{INTERMEDIATE_PREFIX}{name}")))
}

/// Runs the streaming state machine over a backend and a re-encoder.
pub struct StreamProcessor<B: ?Sized, R: ?Sized> {
    backend: Arc<B>,
    reencoder: Arc<R>,
    config: StreamConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl<B: ?Sized, R: ?Sized> Clone for StreamProcessor<B, R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            reencoder: Arc::clone(&self.reencoder),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<B, R> StreamProcessor<B, R>
where
    B: MediaBackend + ?Sized,
    R: Reencoder + ?Sized,
{
    pub fn new(backend: Arc<B>, reencoder: Arc<R>) -> Self {
        Self {
            backend,
            reencoder,
            config: StreamConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Stop at the next frame boundary once `rx` holds `true`.
    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Run a filter pipeline over every frame of `source`.
    pub async fn preprocess(
        &self,
        source: &Path,
        steps: &[FilterStep],
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> MediaResult<PreprocessResult> {
        let mut transform = PipelineTransform::new(steps);
        let outcome = self.run(source, output, &mut transform, progress).await?;
        Ok(outcome.into())
    }

    /// Run `transform` over every frame of `source`, writing `output`.
    ///
    /// On failure neither the intermediate nor the final file is left
    /// behind, and the error carries the stage it happened in.
    pub async fn run<T>(
        &self,
        source: &Path,
        output: &Path,
        transform: &mut T,
        progress: &dyn ProgressSink,
    ) -> MediaResult<StreamOutcome>
    where
        T: FrameTransform + ?Sized,
    {
        let started = Instant::now();
        let kind = transform.kind();
        let intermediate = intermediate_path(output)?;
        let tracker = ProgressTracker::new(progress);

        let result = self
            .run_stages(source, output, &intermediate, transform, &tracker)
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => {
                info!(
                    source = %source.display(),
                    output = %outcome.output_path.display(),
                    frames = outcome.frames_processed,
                    degraded = outcome.degraded,
                    elapsed_secs = elapsed,
                    "Run complete"
                );
                metrics::record_run(kind, true, elapsed);
            }
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Run failed");
                remove_if_exists(&intermediate).await;
                remove_if_exists(output).await;
                metrics::record_run(kind, false, elapsed);
            }
        }
        result
    }

    async fn run_stages<T>(
        &self,
        source_path: &Path,
        output: &Path,
        intermediate: &Path,
        transform: &mut T,
        tracker: &ProgressTracker<'_>,
    ) -> MediaResult<StreamOutcome>
    where
        T: FrameTransform + ?Sized,
    {
        // Opening
        let mut source = self
            .backend
            .open_source(source_path)
            .await
            .map_err(|e| e.in_stage(RunState::Opening, source_path))?;
        let info = source.info().clone();
        let total = info.frame_count;
        info!(
            source = %source_path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps_or_default(),
            total_frames = total,
            "Opened source"
        );

        let mut sink = match self.backend.open_sink(intermediate, &info).await {
            Ok(sink) => sink,
            Err(e) => {
                close_source(source.as_mut()).await;
                return Err(e.in_stage(RunState::Opening, intermediate));
            }
        };

        // Streaming
        let streamed = self
            .stream_frames(source.as_mut(), sink.as_mut(), transform, tracker, total)
            .await;
        close_source(source.as_mut()).await;
        let frames = match streamed {
            Ok(frames) => frames,
            Err(e) => {
                if let Err(finish_err) = sink.finish().await {
                    debug!(error = %finish_err, "Sink finish after failed stream");
                }
                return Err(e.in_stage(RunState::Streaming, source_path));
            }
        };
        metrics::record_frames(transform.kind(), frames);

        // Finalizing
        sink.finish()
            .await
            .map_err(|e| e.in_stage(RunState::Finalizing, intermediate))?;
        drop(sink);
        if !self.config.flush_delay.is_zero() {
            tokio::time::sleep(self.config.flush_delay).await;
        }

        ensure_min_size(intermediate, self.config.min_video_size)
            .await
            .map_err(|e| e.in_stage(RunState::Finalizing, intermediate))?;

        tracker.emit(frames, total, REENCODE_START_PERCENT);
        let outcome = self.reencoder.reencode(intermediate, output).await;
        let degraded = finalize_output(&outcome, intermediate, output)
            .await
            .map_err(|e| e.in_stage(RunState::Finalizing, output))?;
        ensure_min_size(output, self.config.min_video_size)
            .await
            .map_err(|e| e.in_stage(RunState::Finalizing, output))?;
        tracker.emit(frames, total, DONE_PERCENT);

        Ok(StreamOutcome {
            frames_processed: frames,
            total_frames: total,
            output_path: output.to_path_buf(),
            degraded,
        })
    }

    async fn stream_frames<T>(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        transform: &mut T,
        tracker: &ProgressTracker<'_>,
        total: u64,
    ) -> MediaResult<u64>
    where
        T: FrameTransform + ?Sized,
    {
        let cadence = transform.cadence();
        let mut done = 0u64;
        loop {
            self.check_cancelled()?;
            let Some(frame) = source.next_frame().await? else {
                break;
            };
            let out = run_cpu_bound(|| transform.transform(done, &frame))?;
            sink.write_frame(&out).await?;
            done += 1;
            if cadence.is_due(done) {
                tracker.emit(done, total, streaming_percent(done, total));
            }
        }
        debug!(frames = done, "End of stream");
        Ok(done)
    }

    fn check_cancelled(&self) -> MediaResult<()> {
        match &self.cancel {
            Some(rx) if *rx.borrow() => Err(MediaError::Cancelled),
            _ => Ok(()),
        }
    }
}

async fn close_source(source: &mut dyn FrameSource) {
    if let Err(e) = source.close().await {
        warn!(error = %e, "Failed to close source");
    }
}
