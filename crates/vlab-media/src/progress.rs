//! Progress reporting contract and FFmpeg progress parsing.
//!
//! Runs map their work onto fixed percent ranges:
//! - streaming frames: 0-80
//! - before re-encode: 85
//! - finished: 100
//! - still images: 0-90 across pipeline steps, then 100

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use vlab_models::ProgressReport;

/// Upper bound of the streaming sub-range.
pub const STREAM_PERCENT_SPAN: u64 = 80;
/// Reported just before the re-encode stage starts.
pub const REENCODE_START_PERCENT: u8 = 85;
/// Reported once the run has finished.
pub const DONE_PERCENT: u8 = 100;
/// Upper bound of the per-step range for still images.
pub const IMAGE_STEP_SPAN: u64 = 90;

/// Receiver of progress reports.
///
/// Called from the task driving the run; implementations must be cheap and
/// must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, report: ProgressReport);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressReport) + Send + Sync,
{
    fn report(&self, report: ProgressReport) {
        self(report)
    }
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _report: ProgressReport) {}
}

/// Percent for `done` of `total` frames inside the streaming range.
///
/// Unknown totals (0) stay at 0 for the whole stage.
pub fn streaming_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (u128::from(done) * u128::from(STREAM_PERCENT_SPAN)) / u128::from(total);
    percent.min(u128::from(STREAM_PERCENT_SPAN)) as u8
}

/// Percent after `completed` of `total` pipeline steps on a still image.
pub fn image_step_percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (u128::from(completed) * u128::from(IMAGE_STEP_SPAN)) / u128::from(total);
    percent.min(u128::from(IMAGE_STEP_SPAN)) as u8
}

/// How often streaming progress is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressCadence {
    /// After every `n`-th frame
    EveryN(u64),
    /// After every frame
    EveryFrame,
}

impl ProgressCadence {
    /// Preprocessing default.
    pub const PREPROCESS: ProgressCadence = ProgressCadence::EveryN(10);
    /// Detection default.
    pub const DETECTION: ProgressCadence = ProgressCadence::EveryFrame;

    /// Whether a report is due once `frames_done` frames are complete.
    pub fn is_due(&self, frames_done: u64) -> bool {
        match self {
            ProgressCadence::EveryFrame => true,
            ProgressCadence::EveryN(0) => true,
            ProgressCadence::EveryN(n) => frames_done % n == 0,
        }
    }
}

/// Forwards reports to a sink, never letting the percent go backwards.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last_percent: Mutex<u8>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last_percent: Mutex::new(0),
        }
    }

    /// Emit a report; a percent lower than the last one is raised to it.
    pub fn emit(&self, current_unit: u64, total_units: u64, percent: u8) -> ProgressReport {
        let percent = {
            let mut last = self.last_percent.lock().unwrap_or_else(|p| p.into_inner());
            *last = percent.min(DONE_PERCENT).max(*last);
            *last
        };
        let report = ProgressReport::new(current_unit, total_units, percent);
        self.sink.report(report);
        report
    }

    pub fn last_percent(&self) -> u8 {
        *self.last_percent.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of `total_frames` encoded so far, in percent.
    pub fn frame_percentage(&self, total_frames: u64) -> f64 {
        if total_frames == 0 {
            return 0.0;
        }
        ((self.frame as f64 / total_frames as f64) * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_streaming_percent() {
        assert_eq!(streaming_percent(0, 100), 0);
        assert_eq!(streaming_percent(10, 100), 8);
        assert_eq!(streaming_percent(99, 100), 79);
        assert_eq!(streaming_percent(100, 100), 80);
        assert_eq!(streaming_percent(150, 100), 80);
        assert_eq!(streaming_percent(50, 0), 0);
    }

    #[test]
    fn test_image_step_percent() {
        assert_eq!(image_step_percent(1, 3), 30);
        assert_eq!(image_step_percent(2, 3), 60);
        assert_eq!(image_step_percent(3, 3), 90);
        assert_eq!(image_step_percent(1, 0), 0);
    }

    #[test]
    fn test_cadence() {
        assert!(ProgressCadence::PREPROCESS.is_due(10));
        assert!(!ProgressCadence::PREPROCESS.is_due(11));
        assert!(ProgressCadence::DETECTION.is_due(11));
    }

    #[test]
    fn test_tracker_is_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |r: ProgressReport| seen.lock().unwrap().push(r.percent)
        };
        let tracker = ProgressTracker::new(&sink);
        tracker.emit(1, 10, 40);
        tracker.emit(2, 10, 20);
        tracker.emit(3, 10, 85);
        tracker.emit(3, 10, 120);
        assert_eq!(*seen.lock().unwrap(), vec![40, 40, 85, 100]);
        assert_eq!(tracker.last_percent(), 100);
    }

    #[test]
    fn test_watch_channel_sink() {
        let (tx, rx) = tokio::sync::watch::channel(ProgressReport::new(0, 0, 0));
        let sink = move |r: ProgressReport| {
            let _ = tx.send(r);
        };
        let tracker = ProgressTracker::new(&sink);
        tracker.emit(5, 10, 40);
        assert_eq!(rx.borrow().percent, 40);
        assert_eq!(rx.borrow().current_unit, 5);
    }

    #[test]
    fn test_ffmpeg_frame_percentage() {
        let progress = FfmpegProgress {
            frame: 25,
            ..Default::default()
        };
        assert!((progress.frame_percentage(100) - 25.0).abs() < 0.01);
        assert_eq!(progress.frame_percentage(0), 0.0);
    }
}
