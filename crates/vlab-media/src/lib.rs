#![deny(unreachable_patterns)]
//! Frame-streaming media pipeline.
//!
//! This crate provides:
//! - A static registry of per-frame image filters and a pipeline executor
//! - Frame sources and sinks over FFmpeg `rawvideo` pipes, plus an
//!   in-memory backend for synthetic clips
//! - The stream processor state machine (decode, transform, write,
//!   re-encode) with progress reporting and cooperative cancellation
//! - Still-image runs
//! - H.264 re-encoding with intermediate-file fallback
//! - Object detection (YOLOv8 ONNX) with box and label overlays

pub mod backend;
pub mod blocking;
pub mod command;
pub mod detect;
pub mod error;
pub mod filters;
pub mod font;
pub mod frame;
pub mod fs_utils;
pub mod image_path;
pub mod kernel;
pub mod memory;
pub mod metrics;
pub mod overlay;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod reencode;
pub mod sink;
pub mod source;
pub mod stream;

pub use backend::{FfmpegBackend, FfmpegBackendConfig, MediaBackend};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detect::{load_detector, DetectionTransform, Detector, DetectorKind, NullDetector};
#[cfg(feature = "onnx")]
pub use detect::{YoloConfig, YoloDetector};
pub use error::{MediaError, MediaResult};
pub use filters::{force_odd, FilterRegistry};
pub use frame::Frame;
pub use image_path::{detect_image, process_image};
pub use memory::MemoryBackend;
pub use overlay::{annotate, color_for_label};
pub use pipeline::PipelineExecutor;
pub use probe::probe_media;
pub use progress::{NoProgress, ProgressCadence, ProgressSink, ProgressTracker};
pub use reencode::{
    finalize_output, FfmpegReencoder, ReencodeConfig, ReencodeOutcome, Reencoder,
};
pub use stream::{FrameTransform, PipelineTransform, StreamConfig, StreamOutcome, StreamProcessor};
