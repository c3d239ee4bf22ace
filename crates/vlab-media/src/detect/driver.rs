//! Detection frame driver.
//!
//! Runs a detector on every frame of a stream, draws the overlay, and
//! aggregates per-frame detections and label counts. A failed inference
//! counts as a frame with no detections.

use std::path::Path;

use tracing::warn;
use vlab_models::{Detection, DetectionResult, DetectionSummary, FrameDetections};

use super::Detector;
use crate::backend::MediaBackend;
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::metrics::{self, RunKind};
use crate::overlay::annotate;
use crate::progress::{ProgressCadence, ProgressSink};
use crate::reencode::Reencoder;
use crate::stream::{FrameTransform, StreamOutcome, StreamProcessor};

/// Per-frame inference plus overlay, with side aggregation.
pub struct DetectionTransform<'a> {
    detector: &'a dyn Detector,
    threshold: f32,
    frames: Vec<FrameDetections>,
    summary: DetectionSummary,
    inference_failures: u64,
}

impl<'a> DetectionTransform<'a> {
    pub fn new(detector: &'a dyn Detector) -> Self {
        Self {
            detector,
            threshold: detector.confidence_threshold(),
            frames: Vec::new(),
            summary: DetectionSummary::new(),
            inference_failures: 0,
        }
    }

    /// Run inference on one frame and record what was found.
    ///
    /// Returns the detections kept after thresholding.
    pub fn detect_frame(&mut self, index: u64, frame: &Frame) -> Vec<Detection> {
        let detections: Vec<Detection> = match self.detector.infer(frame) {
            Ok(found) => found
                .into_iter()
                .filter(|d| d.confidence >= self.threshold)
                .collect(),
            Err(e) => {
                warn!(frame = index, detector = self.detector.name(), error = %e, "Inference failed");
                metrics::record_inference_failure(self.detector.name());
                self.inference_failures += 1;
                Vec::new()
            }
        };

        if !detections.is_empty() {
            for detection in &detections {
                self.summary.record(detection);
            }
            self.frames.push(FrameDetections {
                frame_index: index,
                detections: detections.clone(),
            });
        }
        detections
    }

    pub fn inference_failures(&self) -> u64 {
        self.inference_failures
    }

    pub fn summary(&self) -> &DetectionSummary {
        &self.summary
    }

    /// Build the run result once streaming has finished.
    pub fn into_result(self, outcome: StreamOutcome) -> DetectionResult {
        DetectionResult {
            total_detections: self.summary.total(),
            detections: self.frames,
            summary: self.summary,
            frames_processed: outcome.frames_processed,
            output_path: outcome.output_path,
            degraded: outcome.degraded,
        }
    }
}

impl FrameTransform for DetectionTransform<'_> {
    fn transform(&mut self, index: u64, frame: &Frame) -> MediaResult<Frame> {
        let detections = self.detect_frame(index, frame);
        if detections.is_empty() {
            return Ok(frame.clone());
        }
        Ok(annotate(frame, &detections))
    }

    fn cadence(&self) -> ProgressCadence {
        ProgressCadence::DETECTION
    }

    fn kind(&self) -> RunKind {
        RunKind::Detect
    }
}

impl<B, R> StreamProcessor<B, R>
where
    B: MediaBackend + ?Sized,
    R: Reencoder + ?Sized,
{
    /// Run `detector` over every frame of `source`, writing an annotated
    /// video to `output`.
    pub async fn detect(
        &self,
        source: &Path,
        detector: &dyn Detector,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> MediaResult<DetectionResult> {
        let mut transform = DetectionTransform::new(detector);
        let outcome = self.run(source, output, &mut transform, progress).await?;
        if transform.inference_failures() > 0 {
            warn!(
                failures = transform.inference_failures(),
                frames = outcome.frames_processed,
                "Some frames had failed inference"
            );
        }
        Ok(transform.into_result(outcome))
    }
}
