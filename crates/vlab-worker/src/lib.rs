//! Job runner for the VisionLab media pipeline.
//!
//! This crate provides:
//! - Job requests and per-job output path allocation
//! - A semaphore-bounded run executor with graceful shutdown
//! - A status board of job snapshots for pollers
//! - Worker configuration from the environment

pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobHandle, RunExecutor, StatusBoard};
pub use job::{JobKind, JobOutput, JobRequest, Manifest, ModelSpec};
pub use logging::RunLogger;
