//! Filter pipeline definitions.
//!
//! A pipeline is untyped data: each step names a filter kind and carries a
//! free-form numeric parameter map. Kinds are validated when the pipeline is
//! applied, not when it is constructed or deserialized.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

/// Numeric parameters for one filter step.
pub type FilterParams = BTreeMap<String, f64>;

/// One filter invocation in a pipeline.
///
/// Serialized as `{"type": "gaussian_blur", "params": {"kernel_size": 5}}`;
/// `kind` is accepted in place of `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterStep {
    /// Registered filter identifier (e.g. "canny_edge")
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    /// Filter parameters; missing keys fall back to the filter defaults
    #[serde(default)]
    pub params: FilterParams,
}

impl FilterStep {
    /// Create a step with no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: FilterParams::new(),
        }
    }

    /// Returns the step with one parameter set.
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

/// Ordered list of filter steps. Order is significant; may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Pipeline(pub Vec<FilterStep>);

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a pipeline from its JSON list form.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the pipeline with a step appended.
    pub fn then(mut self, step: FilterStep) -> Self {
        self.0.push(step);
        self
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<FilterStep>> for Pipeline {
    fn from(steps: Vec<FilterStep>) -> Self {
        Self(steps)
    }
}

impl AsRef<[FilterStep]> for Pipeline {
    fn as_ref(&self) -> &[FilterStep] {
        &self.0
    }
}
