//! Job status snapshots for progress polling.
//!
//! A snapshot is overwritten in place on every progress update; readers
//! always see a complete, consistent value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::progress::ProgressReport;

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a free run slot
    #[default]
    Queued,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest known state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    /// Unique job identifier
    pub job_id: JobId,
    /// Current job status
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Frames processed so far
    pub processed_frames: u64,
    /// Total frames (0 when unknown)
    pub total_frames: u64,
    /// Human-readable description of the current step
    pub current_step: Option<String>,
    /// Error message if the job failed
    pub error_message: Option<String>,
    /// Set when the final artifact is the un-re-encoded intermediate
    pub degraded: bool,
    /// When the job was queued
    pub queued_at: DateTime<Utc>,
    /// When processing started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// When the snapshot was last updated
    pub updated_at: DateTime<Utc>,
    /// Sequence number for event ordering (monotonically increasing)
    pub event_seq: u64,
}

impl JobStatusSnapshot {
    /// Create a queued snapshot.
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Queued,
            progress: 0,
            processed_frames: 0,
            total_frames: 0,
            current_step: None,
            error_message: None,
            degraded: false,
            queued_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            event_seq: 0,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the job as started.
    pub fn start(&mut self, step: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.current_step = Some(step.into());
        self.touch(now);
    }

    /// Apply a progress report. Percent never moves backwards.
    pub fn apply_progress(&mut self, report: &ProgressReport) {
        self.processed_frames = report.current_unit;
        self.total_frames = report.total_units;
        self.progress = self.progress.max(report.percent.min(100));
        self.current_step = Some(step_for_percent(self.progress, report));
        self.touch(Utc::now());
    }

    /// Mark job as completed.
    pub fn complete(&mut self, processed_frames: u64, degraded: bool) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.processed_frames = processed_frames;
        self.degraded = degraded;
        self.current_step = Some("Complete".into());
        self.completed_at = Some(now);
        self.touch(now);
    }

    /// Mark job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now);
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.event_seq += 1;
    }
}

/// Step description shown to pollers for a given percent.
fn step_for_percent(percent: u8, report: &ProgressReport) -> String {
    if percent < 85 {
        format!("Processing frames: {}/{}", report.current_unit, report.total_units)
    } else if percent < 95 {
        "Re-encoding".to_string()
    } else {
        "Finishing".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_transitions() {
        let mut snap = JobStatusSnapshot::new(JobId::new());
        assert_eq!(snap.status, JobStatus::Queued);
        assert!(!snap.is_terminal());

        snap.start("Preprocessing");
        assert_eq!(snap.status, JobStatus::Processing);
        assert!(snap.started_at.is_some());

        snap.apply_progress(&ProgressReport::new(50, 100, 40));
        assert_eq!(snap.progress, 40);
        assert_eq!(snap.current_step.as_deref(), Some("Processing frames: 50/100"));

        snap.apply_progress(&ProgressReport::new(100, 100, 85));
        assert_eq!(snap.current_step.as_deref(), Some("Re-encoding"));

        snap.complete(100, true);
        assert!(snap.is_terminal());
        assert_eq!(snap.progress, 100);
        assert!(snap.degraded);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut snap = JobStatusSnapshot::new(JobId::new());
        snap.apply_progress(&ProgressReport::new(80, 100, 64));
        snap.apply_progress(&ProgressReport::new(10, 100, 8));
        assert_eq!(snap.progress, 64);
    }

    #[test]
    fn test_event_seq_increments() {
        let mut snap = JobStatusSnapshot::new(JobId::new());
        snap.start("x");
        snap.fail("boom");
        assert_eq!(snap.event_seq, 2);
        assert_eq!(snap.error_message.as_deref(), Some("boom"));
        assert_eq!(snap.status, JobStatus::Failed);
    }
}
