//! Progress reporting types.

use serde::{Deserialize, Serialize};

/// One progress update emitted during a run.
///
/// `percent` is a projection of `current_unit / total_units` onto the
/// sub-range reserved for the current stage; it never decreases within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Frames (or pipeline steps, for still images) completed so far
    pub current_unit: u64,
    /// Total frames (or steps); 0 when unknown
    pub total_units: u64,
    /// Percent complete, 0-100
    pub percent: u8,
}

impl ProgressReport {
    pub fn new(current_unit: u64, total_units: u64, percent: u8) -> Self {
        Self {
            current_unit,
            total_units,
            percent: percent.min(100),
        }
    }
}

/// States of a stream processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Opening,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Opening => "opening",
            RunState::Streaming => "streaming",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
