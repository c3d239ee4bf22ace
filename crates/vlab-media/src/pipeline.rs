//! Pipeline executor: ordered application of filter steps to one frame.

use vlab_models::FilterStep;

use crate::error::MediaResult;
use crate::filters::FilterRegistry;
use crate::frame::Frame;

/// Applies filter pipelines using a filter registry.
///
/// Stateless; the same frame and pipeline always produce the same output.
#[derive(Clone, Copy)]
pub struct PipelineExecutor {
    registry: &'static FilterRegistry,
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self {
            registry: FilterRegistry::global(),
        }
    }

    /// Apply every step in order, threading each output into the next step.
    ///
    /// An empty pipeline returns an unmodified copy. The first failing step
    /// aborts the whole call.
    pub fn apply(&self, frame: &Frame, steps: &[FilterStep]) -> MediaResult<Frame> {
        self.apply_with_progress(frame, steps, |_, _| {})
    }

    /// Like [`apply`](Self::apply), calling `on_step(completed, total)`
    /// after each step finishes.
    pub fn apply_with_progress<F>(
        &self,
        frame: &Frame,
        steps: &[FilterStep],
        mut on_step: F,
    ) -> MediaResult<Frame>
    where
        F: FnMut(usize, usize),
    {
        let total = steps.len();
        let mut current = frame.clone();
        for (index, step) in steps.iter().enumerate() {
            current = self.registry.apply(&current, step)?;
            on_step(index + 1, total);
        }
        Ok(current)
    }

    /// Check that every step names a registered filter.
    ///
    /// Callers that want early rejection use this before a run; runs
    /// themselves still fail when the step is applied.
    pub fn validate(&self, steps: &[FilterStep]) -> MediaResult<()> {
        for step in steps {
            self.registry.get(&step.kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use crate::filters::test_support::textured_frame;

    #[test]
    fn test_empty_pipeline_is_identity() {
        let frame = textured_frame(16, 16);
        let out = PipelineExecutor::new().apply(&frame, &[]).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_composition_matches_sequential_application() {
        let frame = textured_frame(24, 18);
        let a = FilterStep::new("gaussian_blur").with_param("kernel_size", 3.0);
        let b = FilterStep::new("threshold").with_param("threshold", 100.0);
        let exec = PipelineExecutor::new();

        let combined = exec.apply(&frame, &[a.clone(), b.clone()]).unwrap();
        let sequential = exec
            .apply(&exec.apply(&frame, &[a]).unwrap(), &[b])
            .unwrap();
        assert_eq!(combined, sequential);
    }

    #[test]
    fn test_unknown_step_aborts() {
        let frame = textured_frame(8, 8);
        let steps = vec![FilterStep::new("gray_scale"), FilterStep::new("not_a_filter")];
        let err = PipelineExecutor::new().apply(&frame, &steps).unwrap_err();
        assert!(matches!(err, MediaError::UnknownFilter(k) if k == "not_a_filter"));
    }

    #[test]
    fn test_progress_callback_counts_steps() {
        let frame = textured_frame(8, 8);
        let steps = vec![FilterStep::new("gray_scale"), FilterStep::new("median_blur")];
        let mut seen = Vec::new();
        PipelineExecutor::new()
            .apply_with_progress(&frame, &steps, |done, total| seen.push((done, total)))
            .unwrap();
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_validate() {
        let exec = PipelineExecutor::new();
        assert!(exec.validate(&[FilterStep::new("canny_edge")]).is_ok());
        assert!(exec.validate(&[FilterStep::new("blur")]).is_err());
    }
}
