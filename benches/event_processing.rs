//! Benchmarks for event processing
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vme_analysis::config::{RunInfo, VmeConfig};
use vme_analysis::filter::DataFilter;
use vme_analysis::pipeline::nodes::{
    CalibrationConfig, CalibrationMinMax, Extractor, ExtractorConfig, Histo1DSink,
    Histo1DSinkConfig, OperatorNode, SinkNode, SourceNode,
};
use vme_analysis::pipeline::{Analysis, BeginRunMode, ObjectMeta};

/// Module words as an MDPP-16 style readout: 5 bit channel, 16 bit amplitude.
fn module_words(count: usize) -> Vec<u32> {
    (0..count as u32)
        .map(|i| 0x1000_0000 | ((i % 16) << 16) | (i.wrapping_mul(2654435761) & 0xffff))
        .collect()
}

/// Extractor -> calibration -> histogram per chain, `chains` chains on one module.
fn build(chains: usize) -> (Analysis, VmeConfig) {
    let mut vme = VmeConfig::default();
    let event = vme.add_event("event0");
    let module = vme.add_module(0, "mdpp16", "mdpp16_scp").unwrap();

    let mut analysis = Analysis::new();
    for i in 0..chains {
        let extractor =
            Extractor::new(ExtractorConfig::single("0001 XXXX XXXA AAAA DDDD DDDD DDDD DDDD")).unwrap();
        let src = analysis
            .add_source(
                ObjectMeta::new(format!("amplitude{i}"), event).with_module(module),
                SourceNode::Extractor(extractor),
            )
            .unwrap();
        let calib = analysis
            .add_operator(
                ObjectMeta::new(format!("amplitude{i}_cal"), event),
                OperatorNode::Calibration(CalibrationMinMax::new(CalibrationConfig::new(0.0, 100.0))),
            )
            .unwrap();
        let sink = analysis
            .add_operator(
                ObjectMeta::new(format!("amplitude{i}_h1"), event),
                SinkNode::Histo1D(Histo1DSink::new(Histo1DSinkConfig {
                    bins: Some(1024),
                    range: None,
                })),
            )
            .unwrap();
        analysis.connect_input(calib, 0, src, 0, None).unwrap();
        analysis.connect_input(sink, 0, calib, 0, None).unwrap();
    }
    analysis
        .begin_run(RunInfo::new("bench", true), &vme, BeginRunMode::ClearState)
        .unwrap();
    (analysis, vme)
}

fn bench_filter_matching(c: &mut Criterion) {
    let filter = DataFilter::new("0001 XXXX XXXA AAAA DDDD DDDD DDDD DDDD", None).unwrap();
    let words = module_words(1024);

    let mut group = c.benchmark_group("data_filter");
    group.throughput(Throughput::Elements(words.len() as u64));
    group.bench_function("match_extract", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &word in &words {
                if filter.matches(black_box(word), 0) {
                    sum += u64::from(filter.extract_address(word)) + u64::from(filter.extract_data(word));
                }
            }
            black_box(sum)
        })
    });
    group.finish();
}

fn bench_event_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_processing");

    for chains in [1usize, 8, 32] {
        let (mut analysis, _vme) = build(chains);
        let words = module_words(32);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("chains", chains), &words, |b, words| {
            b.iter(|| {
                analysis.begin_event(0).unwrap();
                analysis.process_module_data(0, 0, black_box(words)).unwrap();
                analysis.end_event(0).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filter_matching, bench_event_processing);
criterion_main!(benches);
