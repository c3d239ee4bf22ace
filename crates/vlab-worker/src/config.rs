//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use vlab_media::reencode::DEFAULT_REENCODE_TIMEOUT_SECS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent runs
    pub max_concurrent_runs: usize,
    /// Root of the per-job result directories
    pub work_dir: PathBuf,
    /// FFmpeg executable; resolved from `PATH` when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// FFprobe executable; resolved from `PATH` when unset
    pub ffprobe_path: Option<PathBuf>,
    /// Re-encode timeout
    pub reencode_timeout: Duration,
    /// Directory that relative model paths are resolved against
    pub models_dir: PathBuf,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prometheus listener; no exporter is installed when unset
    pub metrics_addr: Option<SocketAddr>,
    /// Delay before an intermediate file is considered flushed
    pub flush_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 2,
            work_dir: PathBuf::from("/tmp/vlab"),
            ffmpeg_path: None,
            ffprobe_path: None,
            reencode_timeout: Duration::from_secs(DEFAULT_REENCODE_TIMEOUT_SECS),
            models_dir: PathBuf::from("models"),
            shutdown_timeout: Duration::from_secs(60),
            metrics_addr: None,
            flush_delay: vlab_media::stream::DEFAULT_FLUSH_DELAY,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_runs: parse_var("VLAB_MAX_RUNS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_runs),
            work_dir: std::env::var("VLAB_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_path: std::env::var("VLAB_FFMPEG_PATH").ok().map(PathBuf::from),
            ffprobe_path: std::env::var("VLAB_FFPROBE_PATH").ok().map(PathBuf::from),
            reencode_timeout: parse_var("VLAB_REENCODE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reencode_timeout),
            models_dir: std::env::var("VLAB_MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.models_dir),
            shutdown_timeout: parse_var("VLAB_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            metrics_addr: parse_var("VLAB_METRICS_ADDR"),
            flush_delay: parse_var("VLAB_FLUSH_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_delay),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
