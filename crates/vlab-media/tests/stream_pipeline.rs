//! Stream processor runs over synthetic clips.

mod common;

use std::sync::Arc;

use common::*;
use tempfile::TempDir;
use tokio::sync::watch;
use vlab_media::{
    Frame, FrameTransform, MediaError, MediaResult, MemoryBackend, NoProgress, PipelineExecutor,
};
use vlab_models::{FilterStep, Pipeline, RunState};

#[tokio::test]
async fn reencode_failure_falls_back_to_intermediate() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(10, 32, 24), 10);
    let output = dir.path().join("results").join("processed_clip.mp4");
    let steps = vec![FilterStep::new("gaussian_blur").with_param("kernel_size", 3.0)];

    let result = processor(backend.clone(), FailingReencoder)
        .preprocess(&source, &steps, &output, &NoProgress)
        .await
        .unwrap();

    assert_eq!(result.frames_processed, 10);
    assert!(result.degraded);
    assert_eq!(result.output_path, output);
    // The intermediate file, raw frames as written by the sink, is now the artifact
    let bytes = tokio::fs::read(&output).await.unwrap();
    assert_eq!(bytes.len(), 10 * 32 * 24 * 3);
    assert!(!dir.path().join("results").join("temp_processed_clip.mp4").exists());
}

#[tokio::test]
async fn successful_reencode_is_not_degraded() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(4, 32, 24), 4);
    let output = dir.path().join("out.mp4");

    let result = processor(backend, CopyReencoder)
        .preprocess(&source, &[], &output, &NoProgress)
        .await
        .unwrap();

    assert!(!result.degraded);
    assert!(output.exists());
    assert!(!dir.path().join("temp_out.mp4").exists());
}

#[tokio::test]
async fn written_frames_match_pipeline_output() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let frames = synthetic_frames(3, 32, 24);
    let source = insert_clip(&backend, dir.path(), "clip.mp4", frames.clone(), 3);
    let output = dir.path().join("out.mp4");
    let pipeline = Pipeline::from_json(
        r#"[{"type": "median_blur", "params": {"kernel_size": 3}}, {"type": "threshold", "params": {"threshold": 100}}]"#,
    )
    .unwrap();

    processor(backend.clone(), FailingReencoder)
        .preprocess(&source, pipeline.steps(), &output, &NoProgress)
        .await
        .unwrap();

    let written = backend.written_frames(&dir.path().join("temp_out.mp4"));
    let executor = PipelineExecutor::new();
    assert_eq!(written.len(), 3);
    for (input, out) in frames.iter().zip(&written) {
        assert_eq!(out, &executor.apply(input, pipeline.steps()).unwrap());
    }
}

#[tokio::test]
async fn empty_pipeline_still_streams_every_frame() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let frames = synthetic_frames(5, 16, 16);
    let source = insert_clip(&backend, dir.path(), "clip.mp4", frames.clone(), 5);
    let output = dir.path().join("out.mp4");

    let result = processor(backend.clone(), FailingReencoder)
        .preprocess(&source, &[], &output, &NoProgress)
        .await
        .unwrap();

    assert_eq!(result.frames_processed, 5);
    assert_eq!(backend.written_frames(&dir.path().join("temp_out.mp4")), frames);
}

#[tokio::test]
async fn unknown_filter_fails_without_artifact() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(10, 16, 16), 10);
    let output = dir.path().join("out.mp4");

    let err = processor(backend, FailingReencoder)
        .preprocess(&source, &[FilterStep::new("not_a_filter")], &output, &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(RunState::Streaming));
    assert!(matches!(err.root_cause(), MediaError::UnknownFilter(kind) if kind == "not_a_filter"));
    assert!(err.to_string().contains("not_a_filter"));
    assert!(!output.exists());
    assert!(!dir.path().join("temp_out.mp4").exists());
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(25, 16, 16), 25);
    let progress = RecordingProgress::default();

    processor(backend, FailingReencoder)
        .preprocess(&source, &[FilterStep::new("gray_scale")], &dir.path().join("out.mp4"), &progress)
        .await
        .unwrap();

    assert_eq!(progress.percents(), vec![32, 64, 85, 100]);
    let reports = progress.reports();
    assert_eq!(reports[0].current_unit, 10);
    assert_eq!(reports[0].total_units, 25);
    assert!(reports.windows(2).all(|w| w[0].percent <= w[1].percent));
}

#[tokio::test]
async fn unknown_total_keeps_streaming_percent_at_zero() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(20, 16, 16), 0);
    let progress = RecordingProgress::default();

    let result = processor(backend, FailingReencoder)
        .preprocess(&source, &[], &dir.path().join("out.mp4"), &progress)
        .await
        .unwrap();

    assert_eq!(result.frames_processed, 20);
    assert_eq!(result.total_frames, 0);
    assert_eq!(progress.percents(), vec![0, 0, 85, 100]);
}

#[tokio::test]
async fn truncated_final_output_is_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(10, 16, 16), 10);
    let output = dir.path().join("out.mp4");

    let err = processor(backend, TruncatingReencoder)
        .preprocess(&source, &[], &output, &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(RunState::Finalizing));
    assert!(matches!(
        err.root_cause(),
        MediaError::OutputTooSmall { size: 10, min_size: 1000, .. }
    ));
    assert!(!output.exists());
}

#[tokio::test]
async fn tiny_intermediate_is_rejected_before_reencode() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    // One 4x4 frame is 48 bytes of raw video
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(1, 4, 4), 1);
    let output = dir.path().join("out.mp4");

    let err = processor(backend, CopyReencoder)
        .preprocess(&source, &[], &output, &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), MediaError::OutputTooSmall { size: 48, .. }));
    assert!(!output.exists());
    assert!(!dir.path().join("temp_out.mp4").exists());
}

#[tokio::test]
async fn unopenable_sink_fails_in_opening() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(2, 16, 16), 2);
    let blocker = dir.path().join("blocker");
    tokio::fs::write(&blocker, b"file").await.unwrap();

    let err = processor(backend, FailingReencoder)
        .preprocess(&source, &[], &blocker.join("out.mp4"), &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(RunState::Opening));
    assert!(matches!(err.root_cause(), MediaError::SinkUnopenable { .. }));
}

#[tokio::test]
async fn cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(10, 16, 16), 10);
    let output = dir.path().join("out.mp4");
    let (_tx, rx) = watch::channel(true);

    let err = processor(backend, FailingReencoder)
        .with_cancel(rx)
        .preprocess(&source, &[], &output, &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), MediaError::Cancelled));
    assert!(!output.exists());
}

/// Passes frames through and raises the cancel flag after frame `at`.
struct CancelAfter {
    at: u64,
    tx: watch::Sender<bool>,
}

impl FrameTransform for CancelAfter {
    fn transform(&mut self, index: u64, frame: &Frame) -> MediaResult<Frame> {
        if index == self.at {
            let _ = self.tx.send(true);
        }
        Ok(frame.clone())
    }
}

#[tokio::test]
async fn cancelled_mid_stream_stops_at_frame_boundary() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(10, 16, 16), 10);
    let output = dir.path().join("out.mp4");
    let (tx, rx) = watch::channel(false);
    let mut transform = CancelAfter { at: 3, tx };

    let err = processor(backend.clone(), FailingReencoder)
        .with_cancel(rx)
        .run(&source, &output, &mut transform, &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(RunState::Streaming));
    assert!(matches!(err.root_cause(), MediaError::Cancelled));
    assert_eq!(backend.written_frames(&dir.path().join("temp_out.mp4")).len(), 4);
    assert!(!output.exists());
    assert!(!dir.path().join("temp_out.mp4").exists());
}

/// Returns frames of a different size than the source.
struct Shrink;

impl FrameTransform for Shrink {
    fn transform(&mut self, _index: u64, _frame: &Frame) -> MediaResult<Frame> {
        Ok(Frame::blank(8, 8))
    }
}

#[tokio::test]
async fn resized_frames_are_rejected_by_the_sink() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let source = insert_clip(&backend, dir.path(), "clip.mp4", synthetic_frames(3, 16, 16), 3);

    let err = processor(backend, FailingReencoder)
        .run(&source, &dir.path().join("out.mp4"), &mut Shrink, &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), MediaError::Internal(_)));
}
