//! YOLOv8 object detection through ONNX Runtime.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when the `cuda` feature is enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::FilterType;
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};
use vlab_models::{BoundingBox, Detection};

use super::{Detector, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Configuration for the YOLO detector.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
    /// Label for each class index
    pub class_names: Vec<String>,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/default/yolov8n.onnx"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: 0.45,
            input_size: 640,
            class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl YoloConfig {
    /// Label for a class index; unknown indices become `class_<n>`.
    pub fn label(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

/// YOLOv8 detector backed by an ONNX Runtime session.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: YoloConfig,
}

impl YoloDetector {
    /// Load the model named in `config`.
    ///
    /// Returns error if model file doesn't exist or cannot be loaded.
    pub fn new(config: YoloConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_not_found(config.model_path.display().to_string()));
        }

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            classes = config.class_names.len(),
            "YOLO detector initialized"
        );

        Ok(Self { session, config })
    }

    pub fn config(&self) -> &YoloConfig {
        &self.config
    }

    /// Resize to the square input size, scale to [0, 1] and lay out as NCHW.
    fn preprocess(&self, frame: &Frame) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(frame.as_rgb(), size, size, FilterType::Triangle);
        let (w, h) = (size as usize, size as usize);

        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for pixel in resized.pixels() {
                chw_data.push(f32::from(pixel[c]) / 255.0);
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::inference_failed(format!("failed to create tensor: {e}")))
    }

    /// Run the session, returning the output dims and data.
    fn run_inference(&self, input: Value) -> MediaResult<(Vec<usize>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::inference_failed(format!("ONNX inference failed: {e}")))?;

        // YOLOv8 output is [1, 4 + classes, candidates]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::inference_failed("missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference_failed(format!("failed to extract tensor: {e}")))?;

        let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((dims, data.to_vec()))
    }
}

impl Detector for YoloDetector {
    fn infer(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let input = self.preprocess(frame)?;
        let (dims, data) = self.run_inference(input)?;

        let (features, candidates) = match dims.as_slice() {
            [1, f, n] | [f, n] => (*f, *n),
            other => {
                return Err(MediaError::inference_failed(format!(
                    "unexpected output shape {other:?}"
                )))
            }
        };
        let view = ArrayView2::from_shape((features, candidates), &data)
            .map_err(|e| MediaError::inference_failed(format!("failed to reshape output: {e}")))?;

        let detections = decode_predictions(view, &self.config, frame.width(), frame.height());
        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn confidence_threshold(&self) -> f32 {
        self.config.confidence_threshold
    }

    fn name(&self) -> &str {
        "yolo"
    }
}

/// Candidate box in model input coordinates, before NMS.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    class_id: usize,
    confidence: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = inter_w * inter_h;
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Decode a `[4 + classes, candidates]` prediction matrix.
///
/// Rows 0-3 hold `cx, cy, w, h` in input-size pixels; the remaining rows are
/// per-class scores. Candidates below the confidence threshold are dropped,
/// overlapping boxes of the same class are suppressed, and surviving boxes
/// are scaled to `orig_width x orig_height` and clipped to it.
pub fn decode_predictions(
    output: ArrayView2<'_, f32>,
    config: &YoloConfig,
    orig_width: u32,
    orig_height: u32,
) -> Vec<Detection> {
    let (features, count) = output.dim();
    if features <= 4 {
        return Vec::new();
    }

    let input_size = config.input_size as f32;
    let scale_w = orig_width as f32 / input_size;
    let scale_h = orig_height as f32 / input_size;
    let (max_x, max_y) = (orig_width as f32, orig_height as f32);

    let mut candidates = Vec::new();
    for i in 0..count {
        let column = output.column(i);
        let (class_id, confidence) = column
            .iter()
            .skip(4)
            .enumerate()
            .fold((0usize, f32::MIN), |best, (c, &score)| {
                if score > best.1 {
                    (c, score)
                } else {
                    best
                }
            });

        if confidence < config.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        candidates.push(Candidate {
            x1: ((cx - w / 2.0) * scale_w).clamp(0.0, max_x),
            y1: ((cy - h / 2.0) * scale_h).clamp(0.0, max_y),
            x2: ((cx + w / 2.0) * scale_w).clamp(0.0, max_x),
            y2: ((cy + h / 2.0) * scale_h).clamp(0.0, max_y),
            class_id,
            confidence,
        });
    }

    non_maximum_suppression(candidates, config.nms_threshold)
        .into_iter()
        .map(|c| {
            Detection::new(
                config.label(c.class_id),
                c.confidence,
                BoundingBox::from_corners(c.x1, c.y1, c.x2, c.y2),
            )
        })
        .collect()
}

/// Keep the most confident box among same-class boxes overlapping by more
/// than `iou_threshold`.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
