//! Shared data models for the VisionLab media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Filter pipelines (ordered filter steps with untyped parameters)
//! - Media source descriptions produced by probing
//! - Detections, per-frame detection lists and label summaries
//! - Run results and progress reports
//! - Job identifiers and job status snapshots for pollers
//! - Re-encode (H.264) configuration

pub mod detection;
pub mod encoding;
pub mod error;
pub mod job;
pub mod job_status;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod result;

// Re-export common types
pub use detection::{BoundingBox, Detection, DetectionSummary, FrameDetections};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::JobId;
pub use job_status::{JobStatus, JobStatusSnapshot};
pub use media::{MediaKind, MediaSource};
pub use pipeline::{FilterParams, FilterStep, Pipeline};
pub use progress::{ProgressReport, RunState};
pub use result::{DetectionResult, PreprocessResult};
