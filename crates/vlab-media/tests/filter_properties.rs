//! Property tests for the filter library and pipeline executor.

use proptest::prelude::*;
use vlab_media::{Frame, FilterRegistry, MediaError, PipelineExecutor};
use vlab_models::FilterStep;

fn frame_strategy() -> impl Strategy<Value = Frame> {
    (4u32..24, 4u32..24).prop_flat_map(|(w, h)| {
        proptest::collection::vec(any::<u8>(), (w * h * 3) as usize)
            .prop_map(move |bytes| Frame::from_raw(w, h, 3, bytes).unwrap())
    })
}

fn step_strategy() -> impl Strategy<Value = FilterStep> {
    prop_oneof![
        (0u32..12, 0.0f64..3.0).prop_map(|(k, s)| FilterStep::new("gaussian_blur")
            .with_param("kernel_size", f64::from(k))
            .with_param("sigma", s)),
        (0.0f64..300.0, 0.0f64..300.0).prop_map(|(a, b)| FilterStep::new("canny_edge")
            .with_param("threshold1", a)
            .with_param("threshold2", b)),
        (0u32..10).prop_map(|k| FilterStep::new("median_blur").with_param("kernel_size", f64::from(k))),
        Just(FilterStep::new("gray_scale")),
        (0u32..10).prop_map(|k| FilterStep::new("sobel_edge").with_param("ksize", f64::from(k))),
        (0.0f64..255.0).prop_map(|t| FilterStep::new("threshold").with_param("threshold", t)),
        (0u32..16, -10.0f64..10.0).prop_map(|(b, c)| FilterStep::new("adaptive_threshold")
            .with_param("block_size", f64::from(b))
            .with_param("c", c)),
        (0u32..8).prop_map(|k| FilterStep::new("morphology_open").with_param("kernel_size", f64::from(k))),
        (0u32..8).prop_map(|k| FilterStep::new("morphology_close").with_param("kernel_size", f64::from(k))),
        (1u32..5, 1u32..8, 0.01f64..0.2, 0.0f64..0.5).prop_map(|(b, k, kk, t)| {
            FilterStep::new("harris_corner")
                .with_param("block_size", f64::from(b))
                .with_param("ksize", f64::from(k))
                .with_param("k", kk)
                .with_param("threshold", t)
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn filters_keep_size_and_channels(frame in frame_strategy(), step in step_strategy()) {
        let out = PipelineExecutor::new().apply(&frame, std::slice::from_ref(&step)).unwrap();
        prop_assert_eq!(out.dimensions(), frame.dimensions());
        prop_assert_eq!(out.channels(), 3);
        prop_assert_eq!(out.byte_len(), frame.byte_len());
    }

    #[test]
    fn pipeline_is_sequential_composition(
        frame in frame_strategy(),
        a in step_strategy(),
        b in step_strategy(),
    ) {
        let executor = PipelineExecutor::new();
        let both = executor.apply(&frame, &[a.clone(), b.clone()]).unwrap();
        let first = executor.apply(&frame, std::slice::from_ref(&a)).unwrap();
        let second = executor.apply(&first, std::slice::from_ref(&b)).unwrap();
        prop_assert_eq!(both, second);
    }

    #[test]
    fn even_sizes_act_as_next_odd(frame in frame_strategy(), half in 0u32..5) {
        let even = f64::from(half * 2);
        let executor = PipelineExecutor::new();
        for (kind, param) in [
            ("gaussian_blur", "kernel_size"),
            ("median_blur", "kernel_size"),
            ("adaptive_threshold", "block_size"),
        ] {
            let with_even = executor
                .apply(&frame, &[FilterStep::new(kind).with_param(param, even)])
                .unwrap();
            let with_odd = executor
                .apply(&frame, &[FilterStep::new(kind).with_param(param, even + 1.0)])
                .unwrap();
            prop_assert_eq!(with_even, with_odd);
        }
    }

    #[test]
    fn oversized_windows_act_as_frame_sized(frame in frame_strategy()) {
        let longest = f64::from(frame.width().max(frame.height()));
        let executor = PipelineExecutor::new();
        for (kind, param) in [
            ("gaussian_blur", "kernel_size"),
            ("median_blur", "kernel_size"),
            ("adaptive_threshold", "block_size"),
            ("morphology_open", "kernel_size"),
            ("morphology_close", "kernel_size"),
        ] {
            let huge = executor
                .apply(&frame, &[FilterStep::new(kind).with_param(param, 1e9)])
                .unwrap();
            let fitted = executor
                .apply(&frame, &[FilterStep::new(kind).with_param(param, longest)])
                .unwrap();
            prop_assert_eq!(huge, fitted);
        }
    }

    #[test]
    fn empty_pipeline_is_identity(frame in frame_strategy()) {
        let out = PipelineExecutor::new().apply(&frame, &[]).unwrap();
        prop_assert_eq!(out, frame);
    }
}

#[test]
fn every_registered_kind_is_reachable() {
    let kinds: Vec<&str> = FilterRegistry::global().kinds().map(|(kind, _)| kind).collect();
    assert_eq!(kinds.len(), 10);
    for kind in kinds {
        assert!(FilterRegistry::global().contains(kind));
    }
}

#[test]
fn unknown_kind_anywhere_aborts_the_pipeline() {
    let frame = Frame::blank(8, 8);
    let steps = vec![
        FilterStep::new("gray_scale"),
        FilterStep::new("not_a_filter"),
        FilterStep::new("threshold"),
    ];
    let err = PipelineExecutor::new().apply(&frame, &steps).unwrap_err();
    assert!(matches!(err, MediaError::UnknownFilter(kind) if kind == "not_a_filter"));
}

#[test]
fn negative_size_is_invalid() {
    let frame = Frame::blank(8, 8);
    let err = PipelineExecutor::new()
        .apply(&frame, &[FilterStep::new("median_blur").with_param("kernel_size", -3.0)])
        .unwrap_err();
    assert!(matches!(err, MediaError::InvalidParam { .. }));
}
