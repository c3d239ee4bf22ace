//! Metrics emitted by processing runs.
//!
//! Only the `metrics` facade is used here; installing an exporter is up to
//! the binary.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_PROCESSED_TOTAL: &str = "vlab_frames_processed_total";
    pub const RUNS_TOTAL: &str = "vlab_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "vlab_run_duration_seconds";
    pub const REENCODE_FALLBACKS_TOTAL: &str = "vlab_reencode_fallbacks_total";
    pub const INFERENCE_FAILURES_TOTAL: &str = "vlab_inference_failures_total";
}

/// Kind of run, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Preprocess,
    Detect,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Preprocess => "preprocess",
            RunKind::Detect => "detect",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record frames written by a run.
pub fn record_frames(kind: RunKind, frames: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL, "kind" => kind.as_str()).increment(frames);
}

/// Record a finished run.
pub fn record_run(kind: RunKind, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(names::RUNS_TOTAL, "kind" => kind.as_str(), "status" => status).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "kind" => kind.as_str()).record(duration_secs);
}

/// Record a run that kept its intermediate file after a failed re-encode.
pub fn record_reencode_fallback() {
    counter!(names::REENCODE_FALLBACKS_TOTAL).increment(1);
}

/// Record one frame whose inference call failed.
pub fn record_inference_failure(detector: &str) {
    counter!(names::INFERENCE_FAILURES_TOTAL, "detector" => detector.to_string()).increment(1);
}
