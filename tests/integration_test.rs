//! End-to-end tests: golden generation, loading, the loop and the wire stream

use pretty_assertions::assert_eq;
use sdc_harness::config::SinkKind;
use sdc_harness::protocol::{
    DecodedIteration, STATUS_CLEAN, STATUS_FIRST_MISMATCH, STATUS_NEXT_MISMATCH, STATUS_TRUNCATED,
};
use sdc_harness::workloads::Identity;
use sdc_harness::{
    compare, BitFlip, ConfigFaultPolicy, Executor, FaultCode, FaultInjector, GoldenStore, HaltSignal,
    Harness, HarnessConfig, LoopState, MemorySink, Reporter, RetryPolicy, RetryingSink, StreamDecoder,
    Workload, WorkloadSpec, WorkloadVisitor,
};
use std::path::Path;
use tempfile::TempDir;

fn config_for(root: &Path, workload: WorkloadSpec, iterations: u64) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.workload = workload;
    config.storage.root = root.to_path_buf();
    config.run.iterations = iterations;
    config.report.beacon_interval_ms = 0;
    config
}

fn generated(workload: WorkloadSpec, iterations: u64) -> (TempDir, Harness) {
    let temp_dir = TempDir::new().unwrap();
    let harness = Harness::new(config_for(temp_dir.path(), workload, iterations)).unwrap();
    harness.generate(temp_dir.path(), 2024).unwrap();
    (temp_dir, harness)
}

/// Corrupts a fixed set of indices every iteration
struct Scatter(Vec<usize>);

impl FaultInjector<f64> for Scatter {
    fn inject(&mut self, _iteration: u64, output: &mut [f64]) -> usize {
        for &i in &self.0 {
            output[i] = -output[i] - 1.0;
        }
        self.0.len()
    }
}

fn identity_executor(len: usize, cap: Option<usize>) -> (Executor<Identity, MemorySink>, MemorySink) {
    let workload = Identity::new(len);
    let input: Vec<f64> = (0..len).map(|i| 1.0 + i as f64).collect();
    let store = GoldenStore::from_parts(input.clone(), workload.compute(&input));
    let sink = MemorySink::new();
    let reporter = Reporter::new(
        RetryingSink::new(sink.clone(), RetryPolicy::default()),
        workload.message_layout(),
        cap,
    );
    (Executor::new(workload, store, reporter), sink)
}

#[test]
fn test_clean_pass() {
    let (_dir, harness) = generated(WorkloadSpec::Identity { len: 256 }, 1);
    let sink = MemorySink::new();
    let summary = harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();

    assert_eq!(sink.words(), vec![STATUS_CLEAN]);
    assert_eq!(summary.stats.iterations, 1);
    assert_eq!(summary.state, LoopState::Halted);
}

#[test]
fn test_single_injected_fault() {
    let (dir, harness) = generated(WorkloadSpec::Identity { len: 64 }, 2);
    let golden = std::fs::read(dir.path().join("identity_64_gold.bin")).unwrap();
    let value = f64::from_le_bytes(golden[17 * 8..18 * 8].try_into().unwrap());
    let flipped = value.to_bits() ^ (1 << 52);

    let sink = MemorySink::new();
    let summary = harness
        .run(sink.clone(), &HaltSignal::new(), Some(BitFlip::new(17, 52, 0)))
        .unwrap();

    assert_eq!(
        sink.words(),
        vec![
            STATUS_FIRST_MISMATCH,
            17,
            (flipped >> 32) as u32,
            flipped as u32,
            STATUS_CLEAN,
        ]
    );
    assert_eq!(summary.stats.dirty, 1);
    assert_eq!(summary.stats.clean, 1);
}

#[test]
fn test_multi_element_corruption() {
    let (executor, sink) = identity_executor(32, None);
    let mut executor = executor.with_injector(Box::new(Scatter(vec![20, 3, 11])));
    let stats = executor.run(Some(1)).unwrap();
    assert_eq!(stats.total_mismatches, 3);

    let words = sink.words();
    let statuses: Vec<u32> = words.chunks(4).map(|m| m[0]).collect();
    let indices: Vec<u32> = words.chunks(4).map(|m| m[1]).collect();
    assert_eq!(
        statuses,
        vec![STATUS_FIRST_MISMATCH, STATUS_NEXT_MISMATCH, STATUS_NEXT_MISMATCH]
    );
    assert_eq!(indices, vec![3, 11, 20]);
}

#[test]
fn test_cap_truncates_iteration() {
    let (executor, sink) = identity_executor(32, Some(2));
    let mut executor = executor.with_injector(Box::new(Scatter((0..10).collect())));
    let stats = executor.run(Some(1)).unwrap();
    assert_eq!(stats.truncated, 1);
    assert_eq!(stats.total_mismatches, 10);

    let words = sink.words();
    assert_eq!(words.len(), 4 + 4 + 2);
    assert_eq!(&words[8..], &[STATUS_TRUNCATED, 8]);
}

#[test]
fn test_short_golden_is_reported_not_truncated() {
    let (dir, harness) = generated(WorkloadSpec::Identity { len: 16 }, 3);
    let path = dir.path().join("identity_16_gold.bin");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

    let sink = MemorySink::new();
    let summary = harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();

    assert!(summary.faulted());
    assert_eq!(summary.state, LoopState::Faulted(FaultCode::GoldenSize));
    assert_eq!(sink.words(), vec![0xFFF7_0000]);
}

#[test]
fn test_shape_mismatch_at_compare_time() {
    let workload = Identity::new(8);
    let store = GoldenStore::from_parts(vec![0.0f64; 8], vec![0.0f64; 7]);
    let sink = MemorySink::new();
    let reporter = Reporter::new(
        RetryingSink::new(sink.clone(), RetryPolicy::default()),
        workload.message_layout(),
        None,
    );
    let mut executor = Executor::new(workload, store, reporter);
    executor.run(None).unwrap();

    assert_eq!(executor.state(), LoopState::Faulted(FaultCode::OutputShape));
    assert_eq!(sink.words(), vec![FaultCode::OutputShape.word()]);
}

#[test]
fn test_beacon_policy_repeats_load_fault() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_for(temp_dir.path(), WorkloadSpec::Identity { len: 4 }, 3);
    config.report.on_config_fault = ConfigFaultPolicy::Beacon;
    let harness = Harness::new(config).unwrap();

    let sink = MemorySink::new();
    let summary = harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();
    assert_eq!(summary.state, LoopState::Beacon(FaultCode::InputOpen));
    assert_eq!(sink.words(), vec![0xFFF0_0000; 3]);
}

#[test]
fn test_tampered_input_fails_manifest() {
    let (dir, harness) = generated(WorkloadSpec::Identity { len: 8 }, 1);
    let path = dir.path().join("identity_8_input.bin");
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[3] ^= 0x10;
    std::fs::write(&path, bytes).unwrap();

    let sink = MemorySink::new();
    harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();
    assert_eq!(sink.words(), vec![FaultCode::GoldenIntegrity.word()]);
}

#[test]
fn test_grid_workload_stream_decodes() {
    let (dir, harness) = generated(WorkloadSpec::Lud { n: 12 }, 3);
    let capture = dir.path().join("capture.bin");

    let mut config = harness.config().clone();
    config.sink.kind = SinkKind::File;
    config.sink.path = Some(capture.clone());
    let harness = Harness::new(config).unwrap();
    let sink = harness.config().sink.open().unwrap();

    // Element (5, 7) flipped in iterations 0 and 2
    harness
        .run(sink, &HaltSignal::new(), Some(BitFlip::new(5 * 12 + 7, 0, 2)))
        .unwrap();

    let bytes = std::fs::read(&capture).unwrap();
    let stream = StreamDecoder::new(harness.message_layout()).decode_bytes(&bytes);
    assert_eq!(stream.iterations.len(), 3);
    assert_eq!(stream.iterations[1], DecodedIteration::Clean);
    match &stream.iterations[0] {
        DecodedIteration::Dirty { mismatches, truncated, partial } => {
            assert_eq!(mismatches.len(), 1);
            assert_eq!(mismatches[0].index, 67);
            assert_eq!(*truncated, None);
            assert!(!partial);
        }
        other => panic!("unexpected {:?}", other),
    }
    // Row and column travel as separate little-endian words
    assert_eq!(&bytes[4..12], &[5, 0, 0, 0, 7, 0, 0, 0]);
}

#[test]
fn test_halt_signal_from_another_thread() {
    let (_dir, harness) = generated(WorkloadSpec::Identity { len: 1024 }, 0);
    let halt = HaltSignal::new();
    let remote = halt.clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        remote.request();
    });

    let sink = MemorySink::new();
    let summary = harness.run(sink.clone(), &halt, None).unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.state, LoopState::Halted);
    assert!(summary.stats.iterations > 0);
    assert_eq!(sink.words().len() as u64, summary.stats.iterations);
}

#[test]
fn test_every_reference_workload_is_deterministic() {
    struct Twice;

    impl WorkloadVisitor for Twice {
        type Output = bool;

        fn visit<W: Workload>(self, workload: W) -> bool {
            use rand::SeedableRng;
            let mut rng = rand::rngs::StdRng::seed_from_u64(3);
            let input = workload.generate_input(&mut rng);
            let a = workload.compute(&input);
            let b = workload.compute(&input);
            a.len() == workload.output_len() && compare(&a, &b).unwrap().matched()
        }
    }

    let small = [
        WorkloadSpec::Identity { len: 64 },
        WorkloadSpec::Matmul { n: 8 },
        WorkloadSpec::Sort { len: 500 },
        WorkloadSpec::Lud { n: 10 },
        WorkloadSpec::Hotspot { rows: 8, cols: 6, steps: 4 },
        WorkloadSpec::Lavamd { boxes1d: 1, alpha: 0.5 },
        WorkloadSpec::Fft { log2_len: 6 },
        WorkloadSpec::Retention { len: 128, pattern: 0x5A, dwell: 8 },
    ];
    for spec in small {
        assert!(spec.dispatch(Twice), "{} is not deterministic", spec.kind());
    }
}

#[test]
fn test_config_file_drives_run() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    let config_path = temp_dir.path().join("harness.toml");
    std::fs::write(
        &config_path,
        format!(
            "[workload]\nkind = \"hotspot\"\nrows = 6\ncols = 5\nsteps = 3\n\n[storage]\nroot = {:?}\n\n[run]\niterations = 2\n",
            data
        ),
    )
    .unwrap();

    let config = HarnessConfig::from_file(&config_path).unwrap();
    let harness = Harness::new(config).unwrap();
    let manifest = harness.generate(&data, 9).unwrap();
    assert_eq!(manifest.inputs.len(), 2);
    assert_eq!(manifest.golden.elements, 30);

    let sink = MemorySink::new();
    let summary = harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();
    assert_eq!(summary.workload, "hotspot_6x5_3");
    assert_eq!(sink.words(), vec![STATUS_CLEAN; 2]);
}
