//! Detection types produced by inference and aggregated per run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates (top-left corner plus size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from corner coordinates, truncating toward zero like the
    /// `int(x1), int(y1), int(x2 - x1), int(y2 - y1)` conversion of YOLO output.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1 as i32,
            y: y1 as i32,
            width: (x2 - x1) as i32,
            height: (y2 - y1) as i32,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }
}

/// One labeled, confidence-scored box on a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label (e.g. "cat")
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Box in pixel coordinates
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }

    /// Text drawn on the label tag, e.g. "cat 0.87".
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

/// Detections found on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    /// Zero-based frame index
    #[serde(rename = "frame")]
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

/// Per-label detection counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSummary(pub BTreeMap<String, u64>);

impl DetectionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one detection under its label.
    pub fn record(&mut self, detection: &Detection) {
        *self.0.entry(detection.label.clone()).or_insert(0) += 1;
    }

    /// Count for one label (0 when never seen).
    pub fn count(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    /// Sum of all label counts.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
