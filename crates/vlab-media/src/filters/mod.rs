//! Registry of named single-frame filters.
//!
//! Every filter is a pure `fn(&Frame, &ParamReader) -> MediaResult<Frame>`
//! that returns a three-channel frame of the same size as its input, so
//! filters compose in any order. Kinds are looked up in a static table;
//! an unregistered kind is [`MediaError::UnknownFilter`].

mod blur;
mod color;
mod corners;
mod edges;
mod morphology;
mod threshold;

use std::collections::HashMap;
use std::sync::OnceLock;

use vlab_models::{FilterParams, FilterStep};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

pub use blur::{gaussian_blur, median_blur};
pub use color::gray_scale;
pub use corners::{harris_corner, HIGHLIGHT_COLOR};
pub use edges::{canny_edge, sobel_edge};
pub use morphology::{morphology_close, morphology_open};
pub use threshold::{adaptive_threshold, threshold};

/// Signature shared by every registered filter.
pub type FilterFn = fn(&Frame, &ParamReader<'_>) -> MediaResult<Frame>;

/// One registry entry.
#[derive(Clone, Copy)]
pub struct FilterDef {
    /// Identifier used in pipelines, e.g. `gaussian_blur`
    pub kind: &'static str,
    /// Human-readable name
    pub display_name: &'static str,
    pub apply: FilterFn,
}

impl std::fmt::Debug for FilterDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDef")
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .finish()
    }
}

const FILTERS: &[FilterDef] = &[
    FilterDef {
        kind: "harris_corner",
        display_name: "Harris Corner Detection",
        apply: harris_corner,
    },
    FilterDef {
        kind: "gaussian_blur",
        display_name: "Gaussian Blur",
        apply: gaussian_blur,
    },
    FilterDef {
        kind: "canny_edge",
        display_name: "Canny Edge Detection",
        apply: canny_edge,
    },
    FilterDef {
        kind: "median_blur",
        display_name: "Median Blur",
        apply: median_blur,
    },
    FilterDef {
        kind: "gray_scale",
        display_name: "Grayscale",
        apply: gray_scale,
    },
    FilterDef {
        kind: "sobel_edge",
        display_name: "Sobel Edge Detection",
        apply: sobel_edge,
    },
    FilterDef {
        kind: "threshold",
        display_name: "Binary Threshold",
        apply: threshold,
    },
    FilterDef {
        kind: "adaptive_threshold",
        display_name: "Adaptive Threshold",
        apply: adaptive_threshold,
    },
    FilterDef {
        kind: "morphology_open",
        display_name: "Morphological Opening",
        apply: morphology_open,
    },
    FilterDef {
        kind: "morphology_close",
        display_name: "Morphological Closing",
        apply: morphology_close,
    },
];

/// Static lookup table from filter kind to implementation.
pub struct FilterRegistry {
    by_kind: HashMap<&'static str, FilterDef>,
}

static REGISTRY: OnceLock<FilterRegistry> = OnceLock::new();

impl FilterRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static FilterRegistry {
        REGISTRY.get_or_init(|| FilterRegistry {
            by_kind: FILTERS.iter().map(|def| (def.kind, *def)).collect(),
        })
    }

    /// Look up a filter by kind.
    pub fn get(&self, kind: &str) -> MediaResult<&FilterDef> {
        self.by_kind
            .get(kind)
            .ok_or_else(|| MediaError::UnknownFilter(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    /// Registered `(kind, display name)` pairs in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        FILTERS.iter().map(|def| (def.kind, def.display_name))
    }

    /// Apply one pipeline step to a frame.
    pub fn apply(&self, frame: &Frame, step: &FilterStep) -> MediaResult<Frame> {
        let def = self.get(&step.kind)?;
        let params = ParamReader::new(def.kind, &step.params).for_frame(frame);
        (def.apply)(frame, &params)
    }
}

/// `n + 1` when `n` is even, otherwise `n`.
pub fn force_odd(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

/// Typed access to a step's untyped parameter map.
///
/// Missing keys fall back to the documented default of each filter.
/// Window sizes are capped at the longest side of the frame being filtered.
#[derive(Debug, Clone, Copy)]
pub struct ParamReader<'a> {
    filter: &'a str,
    params: &'a FilterParams,
    max_window: usize,
}

impl<'a> ParamReader<'a> {
    pub fn new(filter: &'a str, params: &'a FilterParams) -> Self {
        Self {
            filter,
            params,
            max_window: usize::MAX,
        }
    }

    /// Cap window sizes at the longer side of `frame`.
    pub fn for_frame(mut self, frame: &Frame) -> Self {
        let (width, height) = frame.dimensions();
        self.max_window = width.max(height).max(1) as usize;
        self
    }

    /// Floating-point parameter; must be finite.
    pub fn number(&self, name: &str, default: f64) -> MediaResult<f64> {
        match self.params.get(name) {
            None => Ok(default),
            Some(v) if v.is_finite() => Ok(*v),
            Some(v) => Err(MediaError::invalid_param(
                self.filter,
                name,
                format!("expected a finite number, got {}", v),
            )),
        }
    }

    /// Non-negative size parameter; fractions are truncated.
    pub fn size(&self, name: &str, default: usize) -> MediaResult<usize> {
        match self.params.get(name) {
            None => Ok(default),
            Some(v) if v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64 => Ok(*v as usize),
            Some(v) => Err(MediaError::invalid_param(
                self.filter,
                name,
                format!("expected a non-negative size, got {}", v),
            )),
        }
    }

    /// Kernel or block size, clamped to the frame.
    pub fn window(&self, name: &str, default: usize) -> MediaResult<usize> {
        self.size(name, default).map(|n| n.min(self.max_window))
    }

    /// Window size rounded up to the next odd value.
    pub fn odd_window(&self, name: &str, default: usize) -> MediaResult<usize> {
        self.window(name, default).map(force_odd)
    }

    pub fn filter(&self) -> &str {
        self.filter
    }
}
