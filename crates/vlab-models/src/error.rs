//! Error types for model parsing.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while decoding model data.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid pipeline JSON: {0}")]
    InvalidPipeline(#[from] serde_json::Error),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),
}
