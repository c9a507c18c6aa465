//! End-to-end event processing: extraction, calibration, gating, histogramming

mod common;

use common::builders::AnalysisBuilder;
use common::{assert_float_eq, output_values};
use vme_analysis::config::RunInfo;
use vme_analysis::pipeline::nodes::{Interval, MultiHitShape, HIT_COUNTS_NAME};
use vme_analysis::pipeline::{AnalysisLogger, BeginRunMode, NodeId, RunState};

fn histo_counts(b: &AnalysisBuilder, sink: NodeId, index: usize) -> Vec<f64> {
    b.analysis
        .node(sink)
        .and_then(|n| n.kind.as_sink())
        .and_then(|s| s.as_histo1d())
        .and_then(|h| h.counts(index))
        .map(<[f64]>::to_vec)
        .unwrap_or_default()
}

#[test]
fn test_single_word_address_and_data() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    b.begin_run();

    assert_eq!(b.analysis.output(src, 0).map(|p| p.params.len()), Some(16));

    b.event(&[0b1010_0110]);
    let values = output_values(&b.analysis, src, 0);
    assert_eq!(values[10], Some(6.0));
    assert_eq!(values.iter().filter(|v| v.is_some()).count(), 1);
}

#[test]
fn test_chain_fills_histograms() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let calib = b.calibration("amplitude_cal", src, 0.0, 160.0);
    let raw = b.histo1d("amplitude_raw", src, 16);
    let cal = b.histo1d("amplitude_cal_h1", calib, 16);
    b.begin_run();

    b.event(&[0b1010_0110]);
    b.event(&[0b1010_0110, 0b0001_0011]);

    assert_float_eq(output_values(&b.analysis, calib, 0)[10].unwrap(), 60.0, 1e-9);
    assert_float_eq(output_values(&b.analysis, calib, 0)[1].unwrap(), 30.0, 1e-9);

    let raw_counts = histo_counts(&b, raw, 10);
    assert_eq!(raw_counts[6], 2.0);
    assert_eq!(histo_counts(&b, raw, 1)[3], 1.0);
    assert_eq!(histo_counts(&b, cal, 10)[6], 2.0);
}

#[test]
fn test_gated_operator_outputs_invalid() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let mut intervals = vec![Interval::new(0.0, 0.0); 16];
    intervals[10] = Interval::new(5.0, 7.0);
    let cond = b.interval_condition("window", src, intervals);
    let calib = b.calibration("gated", src, 0.0, 16.0);
    b.analysis.set_condition_link(calib, cond, 10).unwrap();
    b.begin_run();

    b.event(&[0b1010_0110]);
    assert_eq!(b.analysis.condition_bits(cond).map(|bits| bits[10]), Some(true));
    assert_eq!(output_values(&b.analysis, calib, 0)[10], Some(6.0));

    b.event(&[0b1010_1001]);
    assert_eq!(b.analysis.condition_bits(cond).map(|bits| bits[10]), Some(false));
    assert!(output_values(&b.analysis, calib, 0).iter().all(Option::is_none));
}

#[test]
fn test_gate_orders_condition_first() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    // Added before the condition so index order alone would run it first.
    let calib = b.calibration("gated", src, 0.0, 16.0);
    let cond = b.interval_condition("window", src, vec![Interval::new(0.0, 16.0); 16]);
    b.analysis.set_condition_link(calib, cond, 3).unwrap();
    b.begin_run();

    let order = &b.analysis.compiled_plan().global_order;
    let pos = |id| order.iter().position(|n| *n == id).unwrap();
    assert!(pos(cond) < pos(calib));

    b.event(&[0b0011_0100]);
    assert_eq!(output_values(&b.analysis, calib, 0)[3], Some(4.0));
}

#[test]
fn test_disabled_sink_does_not_accumulate() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let sink = b.histo1d("amplitude_raw", src, 16);
    b.analysis.set_enabled(sink, false).unwrap();
    b.begin_run();

    b.event(&[0b1010_0110]);
    assert!(histo_counts(&b, sink, 10).iter().all(|c| *c == 0.0));
}

#[test]
fn test_keep_state_preserves_histograms() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let sink = b.histo1d("amplitude_raw", src, 16);
    b.begin_run();
    b.event(&[0b1010_0110]);
    b.analysis.end_run().unwrap();

    b.analysis
        .begin_run(RunInfo::new("second", true), &b.vme, BeginRunMode::KeepState)
        .unwrap();
    assert_eq!(histo_counts(&b, sink, 10)[6], 1.0);
    b.analysis.end_run().unwrap();

    b.analysis
        .begin_run(RunInfo::new("third", true), &b.vme, BeginRunMode::ClearState)
        .unwrap();
    assert_eq!(histo_counts(&b, sink, 10)[6], 0.0);
}

#[test]
fn test_multi_hit_shapes() {
    let mut b = AnalysisBuilder::new();
    let per_hit = b.multi_hit("per_hit", "AADDDD", 3, MultiHitShape::ArrayPerHit);
    let per_address = b.multi_hit("per_address", "AADDDD", 3, MultiHitShape::ArrayPerAddress);
    b.begin_run();

    let node = b.analysis.node(per_hit).unwrap();
    assert_eq!(node.outputs.len(), 4);
    let node = b.analysis.node(per_address).unwrap();
    assert_eq!(node.outputs.len(), 5);
    assert_eq!(
        b.analysis.output(per_address, 4).map(|p| p.params.name.as_str()),
        Some(HIT_COUNTS_NAME)
    );

    b.event(&[0b01_0011, 0b01_0100]);
    assert_eq!(output_values(&b.analysis, per_hit, 0)[1], Some(3.0));
    assert_eq!(output_values(&b.analysis, per_hit, 1)[1], Some(4.0));
    assert_eq!(output_values(&b.analysis, per_address, 1)[..2], [Some(3.0), Some(4.0)]);
    assert_eq!(output_values(&b.analysis, per_hit, 3)[1], Some(2.0));
}

#[test]
fn test_logger_receives_run_messages() {
    let mut b = AnalysisBuilder::new();
    b.extractor("amplitude", "AAAADDDD");
    let (logger, rx) = AnalysisLogger::channel();
    b.analysis.set_logger(logger);

    b.begin_run();
    assert_eq!(b.analysis.run_state(), RunState::Ready);
    let messages: Vec<String> = rx.try_iter().collect();
    assert!(messages.iter().any(|m| m.contains("Run 'test' started")));
}

#[test]
fn test_operator_added_during_run_processes_next_event() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let raw = b.histo1d("amplitude_raw", src, 16);
    b.begin_run();
    b.event(&[0b1010_0110]);

    let calib = b.calibration("late_cal", src, 0.0, 160.0);
    assert!(b.analysis.is_dirty());

    b.event(&[0b1010_0110]);
    assert!(!b.analysis.is_dirty());
    assert_eq!(b.analysis.output(calib, 0).map(|p| p.params.len()), Some(16));
    assert_float_eq(output_values(&b.analysis, calib, 0)[10].unwrap(), 60.0, 1e-9);
    // Untouched sinks keep what they accumulated before the edit.
    assert_eq!(histo_counts(&b, raw, 10)[6], 2.0);
}

#[test]
fn test_sink_connected_during_run_starts_counting() {
    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let calib = b.calibration("amplitude_cal", src, 0.0, 160.0);
    b.begin_run();
    b.event(&[0b1010_0110]);

    let sink = b.histo1d("amplitude_cal_h1", calib, 16);
    b.event(&[0b1010_0110]);
    b.event(&[0b1010_0110]);
    assert_eq!(histo_counts(&b, sink, 10)[6], 2.0);

    // A sink without input has nothing to bin once the edit is applied.
    b.analysis.disconnect_input(sink, 0).unwrap();
    b.event(&[0b1010_0110]);
    assert_eq!(b.analysis.run_state(), RunState::Ready);
    assert!(histo_counts(&b, sink, 10).is_empty());
}
