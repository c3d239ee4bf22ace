//! Still-image runs: one frame, no streaming loop, no re-encode.

use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use tracing::{info, warn};
use vlab_models::{DetectionResult, FilterStep, PreprocessResult, RunState};

use crate::blocking::run_cpu_bound;
use crate::detect::{DetectionTransform, Detector};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::fs_utils::{ensure_min_size, remove_if_exists};
use crate::metrics::{self, RunKind};
use crate::overlay::annotate;
use crate::pipeline::PipelineExecutor;
use crate::progress::{image_step_percent, ProgressSink, ProgressTracker, DONE_PERCENT};
use crate::stream::{StreamOutcome, MIN_IMAGE_SIZE};

/// Apply `steps` to the image at `source` and write it to `output`.
///
/// Progress is `floor(completed / total * 90)` after each step, then 100
/// once the output is written. The output format follows the output
/// extension.
pub async fn process_image(
    source: &Path,
    steps: &[FilterStep],
    output: &Path,
    progress: &dyn ProgressSink,
) -> MediaResult<PreprocessResult> {
    let started = Instant::now();
    let tracker = ProgressTracker::new(progress);
    let result = run_pipeline(source, steps, output, &tracker).await;
    finish_run(RunKind::Preprocess, source, output, started, &result).await;
    result
}

/// Detect objects in the image at `source` and write the annotated image to
/// `output`.
pub async fn detect_image(
    source: &Path,
    detector: &dyn Detector,
    output: &Path,
    progress: &dyn ProgressSink,
) -> MediaResult<DetectionResult> {
    let started = Instant::now();
    let tracker = ProgressTracker::new(progress);

    let result = run_detection(source, detector, output, &tracker).await;
    finish_run(RunKind::Detect, source, output, started, &result).await;
    result
}

async fn run_pipeline(
    source: &Path,
    steps: &[FilterStep],
    output: &Path,
    tracker: &ProgressTracker<'_>,
) -> MediaResult<PreprocessResult> {
    let frame = load_frame(source).await?;
    let processed = run_cpu_bound(|| {
        PipelineExecutor::new().apply_with_progress(&frame, steps, |done, total| {
            let (done, total) = (done as u64, total as u64);
            tracker.emit(done, total, image_step_percent(done, total));
        })
    })
    .map_err(|e| e.in_stage(RunState::Streaming, source))?;

    write_frame(&processed, output).await?;
    let total = steps.len() as u64;
    tracker.emit(total, total, DONE_PERCENT);
    Ok(PreprocessResult {
        frames_processed: 1,
        total_frames: 1,
        output_path: output.to_path_buf(),
        degraded: false,
    })
}

async fn run_detection(
    source: &Path,
    detector: &dyn Detector,
    output: &Path,
    tracker: &ProgressTracker<'_>,
) -> MediaResult<DetectionResult> {
    let frame = load_frame(source).await?;
    let mut transform = DetectionTransform::new(detector);
    let annotated = run_cpu_bound(|| {
        let detections = transform.detect_frame(0, &frame);
        annotate(&frame, &detections)
    });
    tracker.emit(1, 1, image_step_percent(1, 1));

    write_frame(&annotated, output).await?;
    tracker.emit(1, 1, DONE_PERCENT);
    Ok(transform.into_result(StreamOutcome {
        frames_processed: 1,
        total_frames: 1,
        output_path: output.to_path_buf(),
        degraded: false,
    }))
}

async fn load_frame(source: &Path) -> MediaResult<Frame> {
    let bytes = tokio::fs::read(source)
        .await
        .map_err(|e| MediaError::source_unreadable(source, e.to_string()).in_stage(RunState::Opening, source))?;
    let image = run_cpu_bound(|| image::load_from_memory(&bytes))
        .map_err(|e| MediaError::source_unreadable(source, e.to_string()).in_stage(RunState::Opening, source))?;
    info!(
        source = %source.display(),
        width = image.width(),
        height = image.height(),
        "Loaded image"
    );
    Ok(Frame::from_dynamic(image))
}

/// Encode `frame` in the format named by the output extension and write it,
/// creating the output directory when needed.
async fn write_frame(frame: &Frame, output: &Path) -> MediaResult<u64> {
    let stage = |e: MediaError| e.in_stage(RunState::Finalizing, output);

    let format = ImageFormat::from_path(output).map_err(|e| stage(e.into()))?;
    let mut buf = Vec::new();
    run_cpu_bound(|| {
        DynamicImage::ImageRgb8(frame.as_rgb().clone()).write_to(&mut Cursor::new(&mut buf), format)
    })
    .map_err(|e| stage(e.into()))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| stage(MediaError::sink_unopenable(output, e.to_string())))?;
        }
    }
    tokio::fs::write(output, &buf)
        .await
        .map_err(|e| stage(MediaError::sink_unopenable(output, e.to_string())))?;

    ensure_min_size(output, MIN_IMAGE_SIZE).await.map_err(stage)
}

async fn finish_run<T>(
    kind: RunKind,
    source: &Path,
    output: &Path,
    started: Instant,
    result: &MediaResult<T>,
) {
    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(_) => {
            info!(source = %source.display(), output = %output.display(), "Image run complete");
            metrics::record_frames(kind, 1);
            metrics::record_run(kind, true, elapsed);
        }
        Err(e) => {
            warn!(source = %source.display(), error = %e, "Image run failed");
            remove_if_exists(output).await;
            metrics::record_run(kind, false, elapsed);
        }
    }
}
