//! Structured run logging.
//!
//! Every run logs its lifecycle events with the job ID and run kind
//! attached, inside a `run` span.

use tracing::{error, info, warn, Span};
use vlab_models::JobId;

/// Logger for one run's lifecycle events.
#[derive(Debug, Clone)]
pub struct RunLogger {
    job_id: String,
    kind: &'static str,
}

impl RunLogger {
    /// Create a logger for a job and run kind (`preprocess` or `detect`).
    pub fn new(job_id: &JobId, kind: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, kind = self.kind, "Run started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, kind = self.kind, "Run progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, kind = self.kind, "Run warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, kind = self.kind, "Run error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, kind = self.kind, "Run completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Span the whole run executes in.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", job_id = %self.job_id, kind = self.kind)
    }
}
