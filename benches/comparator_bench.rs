//! Performance benchmarks for comparison and diagnostic encoding

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sdc_harness::protocol::StreamDecoder;
use sdc_harness::workload::{IndexLayout, PayloadMode};
use sdc_harness::{compare, MemorySink, MessageLayout, Reporter, RetryPolicy, RetryingSink};
use std::time::Duration;

fn golden_buffer(len: usize) -> Vec<f64> {
    (0..len).map(|i| (i as f64).sin() * 1.0e3).collect()
}

fn bench_clean_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_clean");
    group.measurement_time(Duration::from_secs(10));

    for len in [1_024, 65_536, 1 << 20].iter() {
        let golden = golden_buffer(*len);
        let observed = golden.clone();

        group.throughput(Throughput::Bytes((*len * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &observed, |b, observed| {
            b.iter(|| {
                let comparison = compare(black_box(observed), black_box(&golden))
                    .expect("Shapes match");
                black_box(comparison);
            });
        });
    }
    group.finish();
}

fn bench_dirty_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_dirty");

    let golden = golden_buffer(65_536);
    let mut observed = golden.clone();
    for value in observed.iter_mut().step_by(64) {
        *value = -*value;
    }
    let comparison = compare(&observed, &golden).expect("Shapes match");
    let layout = MessageLayout::new(IndexLayout::Flat, PayloadMode::Observed, 2);

    for cap in [Some(64usize), None].iter() {
        let name = match cap {
            Some(n) => format!("cap_{}", n),
            None => "unbounded".to_string(),
        };
        group.bench_function(name, |b| {
            let sink = MemorySink::new();
            let mut reporter = Reporter::new(
                RetryingSink::new(sink.clone(), RetryPolicy::default()),
                layout,
                *cap,
            );
            b.iter(|| {
                reporter.report(black_box(&comparison)).expect("Memory sink accepts");
                sink.take();
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let layout = MessageLayout::new(IndexLayout::Grid { cols: 256 }, PayloadMode::Observed, 2);
    let mut words = Vec::new();
    for i in 0..10_000u32 {
        if i % 10 == 0 {
            words.push(0xAA00_0000);
        } else {
            words.extend_from_slice(&[0xDD00_0000, i / 256, i % 256, 0x3FF0_0000, i]);
        }
    }
    let decoder = StreamDecoder::new(layout);

    c.bench_function("decode_stream", |b| {
        b.iter(|| black_box(decoder.decode_words(black_box(&words))));
    });
}

criterion_group!(benches, bench_clean_compare, bench_dirty_report, bench_decode);
criterion_main!(benches);
