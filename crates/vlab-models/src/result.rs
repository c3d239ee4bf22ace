//! Final results of a processing run.
//!
//! Results are produced once, at the end of a successful run, and are never
//! mutated afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detection::{DetectionSummary, FrameDetections};

/// Result of a preprocessing (filter pipeline) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessResult {
    /// Frames decoded, transformed and written
    pub frames_processed: u64,
    /// Frame count reported by the source (0 when unknown)
    pub total_frames: u64,
    /// Final artifact path
    pub output_path: PathBuf,
    /// True when the H.264 re-encode failed and the intermediate file was
    /// used as the final artifact
    #[serde(default)]
    pub degraded: bool,
}

/// Result of a detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// One entry per frame that had at least one detection
    pub detections: Vec<FrameDetections>,
    /// Total number of detections across all frames
    pub total_detections: u64,
    /// Per-label counts
    pub summary: DetectionSummary,
    /// Frames decoded and annotated
    pub frames_processed: u64,
    /// Final artifact path
    pub output_path: PathBuf,
    /// True when the re-encode fallback was used
    #[serde(default)]
    pub degraded: bool,
}

impl DetectionResult {
    /// Number of frames with at least one detection.
    pub fn frames_with_detections(&self) -> usize {
        self.detections.len()
    }
}
