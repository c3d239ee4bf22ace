//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use vlab_models::RunState;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
///
/// `ReencodeFailed` and `InferenceFailed` are recoverable: the stream
/// processor turns them into a degraded result or an empty detection list.
/// Every other variant aborts the run.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Cannot read source {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("Cannot open output sink {path}: {reason}")]
    SinkUnopenable { path: PathBuf, reason: String },

    #[error("Unknown filter type: {0}")]
    UnknownFilter(String),

    #[error("Invalid parameter '{param}' for filter '{filter}': {reason}")]
    InvalidParam {
        filter: String,
        param: String,
        reason: String,
    },

    #[error("Output file is too small: {path} ({size} bytes, expected more than {min_size})")]
    OutputTooSmall {
        path: PathBuf,
        size: u64,
        min_size: u64,
    },

    #[error("Re-encode failed: {0}")]
    ReencodeFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("FFmpeg not found")]
    FfmpegNotFound,

    #[error("FFprobe not found")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("{stage} failed for {path}: {source}")]
    Run {
        stage: RunState,
        path: PathBuf,
        #[source]
        source: Box<MediaError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a source-unreadable error.
    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a sink-unopenable error.
    pub fn sink_unopenable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SinkUnopenable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(
        filter: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            filter: filter.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an inference failure error.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attach the run stage and media path to a fatal error.
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn in_stage(self, stage: RunState, path: impl Into<PathBuf>) -> Self {
        match self {
            err @ MediaError::Run { .. } => err,
            err => MediaError::Run {
                stage,
                path: path.into(),
                source: Box::new(err),
            },
        }
    }

    /// The underlying error, with any stage wrapper removed.
    pub fn root_cause(&self) -> &MediaError {
        match self {
            MediaError::Run { source, .. } => source.root_cause(),
            err => err,
        }
    }

    /// Stage at which a run failed, if known.
    pub fn stage(&self) -> Option<RunState> {
        match self {
            MediaError::Run { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether this error is recoverable inside a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root_cause(),
            MediaError::ReencodeFailed(_) | MediaError::InferenceFailed(_)
        )
    }
}
