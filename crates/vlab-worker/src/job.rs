//! Job requests and output path allocation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vlab_media::detect::DEFAULT_CONFIDENCE_THRESHOLD;
use vlab_media::DetectorKind;
use vlab_models::{DetectionResult, JobId, MediaKind, Pipeline, PreprocessResult};

use crate::error::{WorkerError, WorkerResult};

/// Directory (under the work dir) for preprocessing results.
pub const ANALYSIS_RESULTS_DIR: &str = "analysis_results";
/// Directory (under the work dir) for detection results.
pub const DETECTION_RESULTS_DIR: &str = "detection_results";
/// Model file used when a YOLO job names no model.
pub const DEFAULT_MODEL_FILE: &str = "default/yolov8n.onnx";

/// One unit of work for the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: JobId,
    /// Input video or still image
    pub source_path: PathBuf,
    #[serde(flatten)]
    pub kind: JobKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Run a filter pipeline over every frame
    Preprocess {
        #[serde(default)]
        pipeline: Pipeline,
    },
    /// Run a detector over every frame and draw its detections
    Detect { model: ModelSpec },
}

/// Detection model named by a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub kind: DetectorKind,
    /// Model file; relative paths are resolved against the models dir
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
}

fn default_conf_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            kind: DetectorKind::default(),
            path: None,
            version: None,
            conf_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ModelSpec {
    /// Model file to load, or `None` for kinds that need no file.
    pub fn resolve_path(&self, models_dir: &Path) -> Option<PathBuf> {
        match (self.kind, &self.path) {
            (_, Some(path)) if path.is_absolute() => Some(path.clone()),
            (_, Some(path)) => Some(models_dir.join(path)),
            (DetectorKind::Yolo, None) => Some(models_dir.join(DEFAULT_MODEL_FILE)),
            (DetectorKind::Custom, None) => None,
        }
    }

    /// Label used in logs, e.g. `yolo v8n`.
    pub fn display_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{} {}", self.kind, version),
            None => self.kind.to_string(),
        }
    }
}

impl JobRequest {
    pub fn preprocess(job_id: JobId, source_path: impl Into<PathBuf>, pipeline: Pipeline) -> Self {
        Self {
            job_id,
            source_path: source_path.into(),
            kind: JobKind::Preprocess { pipeline },
        }
    }

    pub fn detect(job_id: JobId, source_path: impl Into<PathBuf>, model: ModelSpec) -> Self {
        Self {
            job_id,
            source_path: source_path.into(),
            kind: JobKind::Detect { model },
        }
    }

    /// `preprocess` or `detect`.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            JobKind::Preprocess { .. } => "preprocess",
            JobKind::Detect { .. } => "detect",
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_path(&self.source_path)
    }

    /// Reject ids that cannot name an output directory.
    ///
    /// Deserialized ids skip [`JobId::parse`], so manifests are checked here.
    pub fn validate(&self) -> WorkerResult<()> {
        JobId::parse(self.job_id.as_str())?;
        if self.source_path.file_name().is_none() {
            return Err(WorkerError::invalid_job(format!(
                "source path has no file name: {}",
                self.source_path.display()
            )));
        }
        Ok(())
    }

    /// Where this job writes its artifact.
    ///
    /// An empty pipeline copies the source, so the copy keeps the source's
    /// extension.
    pub fn output_path(&self, work_dir: &Path) -> PathBuf {
        match &self.kind {
            JobKind::Preprocess { pipeline } if pipeline.is_empty() => {
                copy_output_path(work_dir, &self.job_id, &self.source_path)
            }
            JobKind::Preprocess { .. } => preprocess_output_path(work_dir, &self.job_id, &self.source_path),
            JobKind::Detect { .. } => detect_output_path(work_dir, &self.job_id, &self.source_path),
        }
    }
}

/// Keep alphanumerics, `.`, `-` and `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

/// `<work_dir>/analysis_results/<job_id>/processed_<sanitized stem>.<ext>`
///
/// Videos are always written as `.mp4`; still images keep their extension.
pub fn preprocess_output_path(work_dir: &Path, job_id: &JobId, source: &Path) -> PathBuf {
    let original = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefixed = format!("processed_{}", sanitize_file_name(&original));
    let prefixed = Path::new(&prefixed);
    let stem = prefixed
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "processed_".to_string());

    let extension = match MediaKind::from_path(source) {
        MediaKind::Image => prefixed
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "png".to_string()),
        MediaKind::Video => "mp4".to_string(),
    };

    work_dir
        .join(ANALYSIS_RESULTS_DIR)
        .join(job_id.as_str())
        .join(format!("{stem}.{extension}"))
}

/// Like [`preprocess_output_path`], but with the source's own extension.
pub fn copy_output_path(work_dir: &Path, job_id: &JobId, source: &Path) -> PathBuf {
    let path = preprocess_output_path(work_dir, job_id, source);
    match source.extension() {
        Some(ext) => path.with_extension(sanitize_file_name(&ext.to_string_lossy())),
        None => path.with_extension(""),
    }
}

/// `<work_dir>/detection_results/<job_id>/detected_<original name>`
pub fn detect_output_path(work_dir: &Path, job_id: &JobId, source: &Path) -> PathBuf {
    let original = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result.mp4".to_string());
    work_dir
        .join(DETECTION_RESULTS_DIR)
        .join(job_id.as_str())
        .join(format!("detected_{original}"))
}

/// Result of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutput {
    Preprocess(PreprocessResult),
    Detect(DetectionResult),
}

impl JobOutput {
    pub fn output_path(&self) -> &Path {
        match self {
            JobOutput::Preprocess(r) => &r.output_path,
            JobOutput::Detect(r) => &r.output_path,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        match self {
            JobOutput::Preprocess(r) => r.frames_processed,
            JobOutput::Detect(r) => r.frames_processed,
        }
    }

    pub fn degraded(&self) -> bool {
        match self {
            JobOutput::Preprocess(r) => r.degraded,
            JobOutput::Detect(r) => r.degraded,
        }
    }
}

/// A batch of jobs read from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub jobs: Vec<JobRequest>,
}

impl Manifest {
    pub fn from_json(json: &str) -> WorkerResult<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        for job in &manifest.jobs {
            job.validate()?;
        }
        Ok(manifest)
    }
}
