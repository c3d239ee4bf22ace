//! Object detectors and the detection frame driver.
//!
//! | Kind | Detector | Output |
//! |------|----------|--------|
//! | `yolo` | [`YoloDetector`] (YOLOv8 ONNX) | labeled boxes in pixel coordinates |
//! | `custom` | [`NullDetector`] | no detections |

pub mod driver;
#[cfg(feature = "onnx")]
pub mod yolo;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vlab_models::Detection;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

pub use driver::DetectionTransform;
#[cfg(feature = "onnx")]
pub use yolo::{YoloConfig, YoloDetector, COCO_CLASSES};

/// Confidence threshold used when a model does not configure one.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Inference model run on every frame of a detection run.
pub trait Detector: Send + Sync {
    /// Detect objects in one frame. Boxes are in the frame's pixel
    /// coordinates.
    fn infer(&self, frame: &Frame) -> MediaResult<Vec<Detection>>;

    /// Detections below this confidence are dropped.
    fn confidence_threshold(&self) -> f32 {
        DEFAULT_CONFIDENCE_THRESHOLD
    }

    /// Detector name for logs and metrics.
    fn name(&self) -> &str;
}

/// Detector that never finds anything.
#[derive(Debug, Clone, Copy)]
pub struct NullDetector {
    threshold: f32,
}

impl NullDetector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for NullDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl Detector for NullDetector {
    fn infer(&self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
        Ok(Vec::new())
    }

    fn confidence_threshold(&self) -> f32 {
        self.threshold
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Model families a detection job can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    Yolo,
    /// User-supplied model without a built-in decoder
    Custom,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Yolo => "yolo",
            DetectorKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load a detector for `kind`.
///
/// YOLO models need `model_path` to exist; custom models load as a
/// [`NullDetector`].
pub fn load_detector(
    kind: DetectorKind,
    model_path: Option<PathBuf>,
    confidence_threshold: f32,
) -> MediaResult<Box<dyn Detector>> {
    match kind {
        DetectorKind::Custom => Ok(Box::new(NullDetector::new(confidence_threshold))),
        DetectorKind::Yolo => {
            let path = model_path.ok_or_else(|| MediaError::model_not_found("<unset>"))?;
            load_yolo(path, confidence_threshold)
        }
    }
}

#[cfg(feature = "onnx")]
fn load_yolo(model_path: PathBuf, confidence_threshold: f32) -> MediaResult<Box<dyn Detector>> {
    let config = YoloConfig {
        model_path,
        confidence_threshold,
        ..Default::default()
    };
    Ok(Box::new(YoloDetector::new(config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_yolo(model_path: PathBuf, _confidence_threshold: f32) -> MediaResult<Box<dyn Detector>> {
    Err(MediaError::internal(format!(
        "cannot load {}: built without the `onnx` feature",
        model_path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_kind_loads_null_detector() {
        let detector = load_detector(DetectorKind::Custom, None, 0.4).unwrap();
        assert_eq!(detector.name(), "null");
        assert!((detector.confidence_threshold() - 0.4).abs() < f32::EPSILON);
        assert!(detector.infer(&Frame::blank(4, 4)).unwrap().is_empty());
    }

    #[test]
    fn test_yolo_without_model_is_not_found() {
        let err = load_detector(DetectorKind::Yolo, None, 0.25).err().unwrap();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
    }

    #[test]
    fn test_kind_serde() {
        let kind: DetectorKind = serde_json::from_str("\"custom\"").unwrap();
        assert_eq!(kind, DetectorKind::Custom);
        assert_eq!(DetectorKind::default().to_string(), "yolo");
    }
}
