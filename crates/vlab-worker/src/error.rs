//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Executor is shutting down")]
    ShuttingDown,

    #[error("Run task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Media(#[from] vlab_media::MediaError),

    #[error("Model error: {0}")]
    Model(#[from] vlab_models::ModelError),

    #[error("Manifest parse error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if the failure came from a cancelled run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Media(e) if matches!(e.root_cause(), vlab_media::MediaError::Cancelled))
    }
}
