//! sdc-harness - silent data corruption detection harness
//!
//! Loads a workload's input and golden output once, then runs the workload in
//! a loop, compares every output bit for bit and reports each iteration over a
//! narrow diagnostic channel using tagged 32-bit status words.

/// Error handling and result types
pub mod error;
/// Fixed-width element encoding
pub mod element;
/// Persistent storage reader
pub mod storage;
/// Workload adapter contract
pub mod workload;
/// Reference workloads
pub mod workloads;
/// Input and golden output loading, offline generation
pub mod golden;
/// Bit-exact comparison
pub mod comparator;
/// Diagnostic wire protocol
pub mod protocol;
/// Diagnostic sinks
pub mod sink;
/// Per-iteration reporter
pub mod reporter;
/// Execution loop
pub mod executor;
/// TOML configuration
pub mod config;

use serde::Serialize;
use std::path::Path;

// Re-export main types
pub use comparator::{compare, Comparison, MismatchRecord};
pub use config::HarnessConfig;
pub use element::Element;
pub use error::{ConfigFault, HarnessError, Result};
pub use executor::{BitFlip, ConfigFaultPolicy, Executor, FaultInjector, HaltSignal, LoopState, RunStats};
pub use golden::{write_golden_set, GoldenManifest, GoldenStore, ResourceNames};
pub use protocol::{DiagnosticMessage, FaultCode, MessageLayout, StreamDecoder};
pub use reporter::Reporter;
pub use sink::{DiagnosticSink, MemorySink, RetryPolicy, RetryingSink, WriterSink};
pub use workload::Workload;
pub use workloads::{WorkloadSpec, WorkloadVisitor};

use error::Dataset;
use executor::run_fault_beacon;
use storage::FsStorage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Workload instance name
    pub workload: String,
    /// Final loop state
    pub state: LoopState,
    /// Counters
    pub stats: RunStats,
}

impl RunSummary {
    /// A configuration fault ended or degraded the run
    pub fn faulted(&self) -> bool {
        matches!(self.state, LoopState::Faulted(_) | LoopState::Beacon(_))
    }
}

/// Configured harness instance
#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Diagnostic message layout of the configured workload
    pub fn message_layout(&self) -> MessageLayout {
        self.config.workload.dispatch(LayoutVisitor)
    }

    /// Resource names the configured workload is loaded from
    pub fn resource_names(&self) -> Result<ResourceNames> {
        self.config.workload.dispatch(NamesVisitor { config: &self.config })
    }

    /// Load the golden set from storage and run the loop into `sink`.
    ///
    /// A load fault is reported on the sink according to the configured
    /// policy instead of starting the loop.
    pub fn run<S: DiagnosticSink>(
        &self,
        sink: S,
        halt: &HaltSignal,
        injection: Option<BitFlip>,
    ) -> Result<RunSummary> {
        self.config.workload.dispatch(RunVisitor {
            config: &self.config,
            sink,
            halt,
            injection,
        })
    }

    /// Generate input, golden output and manifest under `dir`
    pub fn generate(&self, dir: &Path, seed: u64) -> Result<GoldenManifest> {
        self.config.workload.dispatch(GenerateVisitor {
            config: &self.config,
            dir,
            seed,
        })
    }
}

struct LayoutVisitor;

impl WorkloadVisitor for LayoutVisitor {
    type Output = MessageLayout;

    fn visit<W: Workload>(self, workload: W) -> MessageLayout {
        workload.message_layout()
    }
}

struct NamesVisitor<'a> {
    config: &'a HarnessConfig,
}

impl WorkloadVisitor for NamesVisitor<'_> {
    type Output = Result<ResourceNames>;

    fn visit<W: Workload>(self, workload: W) -> Result<ResourceNames> {
        resource_names(self.config, &workload)
    }
}

fn resource_names<W: Workload>(config: &HarnessConfig, workload: &W) -> Result<ResourceNames> {
    ResourceNames::for_workload(workload)
        .with_overrides(&config.storage.inputs, config.storage.golden.as_deref())
}

struct RunVisitor<'a, S> {
    config: &'a HarnessConfig,
    sink: S,
    halt: &'a HaltSignal,
    injection: Option<BitFlip>,
}

impl<S: DiagnosticSink> WorkloadVisitor for RunVisitor<'_, S> {
    type Output = Result<RunSummary>;

    fn visit<W: Workload>(self, workload: W) -> Result<RunSummary> {
        let config = self.config;
        let names = resource_names(config, &workload)?;
        let instance = workload.instance();
        let policy = config.report.on_config_fault;
        let limit = config.iteration_limit();

        let mut reporter = Reporter::new(
            RetryingSink::new(self.sink, config.sink.retry_policy()),
            workload.message_layout(),
            config.mismatch_cap(),
        );

        let loaded = FsStorage::mount(&config.storage.root)
            .map_err(|e| {
                tracing::error!("Cannot mount storage: {}", e);
                ConfigFault::from_storage(Dataset::Input, &e)
            })
            .and_then(|mut storage| {
                GoldenStore::load(&workload, &mut storage, &names, config.storage.verify_manifest)
            });

        let store = match loaded {
            Ok(store) => store,
            Err(fault) => {
                let code = FaultCode::from(&fault);
                let stats = run_fault_beacon(
                    &mut reporter,
                    &fault,
                    policy,
                    config.beacon_interval(),
                    self.halt,
                    limit,
                )?;
                let state = match policy {
                    ConfigFaultPolicy::Halt => LoopState::Faulted(code),
                    ConfigFaultPolicy::Beacon => LoopState::Beacon(code),
                };
                return Ok(RunSummary { workload: instance, state, stats });
            }
        };

        let mut executor = Executor::new(workload, store, reporter)
            .with_halt_signal(self.halt.clone())
            .with_fault_policy(policy)
            .with_beacon_interval(config.beacon_interval());
        if let Some(flip) = self.injection {
            tracing::info!(
                "Injecting bit {} of element {} every {} iteration(s)",
                flip.bit,
                flip.index,
                flip.period
            );
            executor = executor.with_injector(Box::new(flip));
        }

        let stats = executor.run(limit)?;
        Ok(RunSummary {
            workload: instance,
            state: executor.state(),
            stats,
        })
    }
}

struct GenerateVisitor<'a> {
    config: &'a HarnessConfig,
    dir: &'a Path,
    seed: u64,
}

impl WorkloadVisitor for GenerateVisitor<'_> {
    type Output = Result<GoldenManifest>;

    fn visit<W: Workload>(self, workload: W) -> Result<GoldenManifest> {
        let names = resource_names(self.config, &workload)?;
        write_golden_set(&workload, self.dir, &names, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::STATUS_CLEAN;
    use tempfile::TempDir;

    fn harness_in(dir: &Path, spec: WorkloadSpec, iterations: u64) -> Harness {
        let mut config = HarnessConfig::default();
        config.workload = spec;
        config.storage.root = dir.to_path_buf();
        config.run.iterations = iterations;
        Harness::new(config).unwrap()
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_generate_then_run_clean() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness_in(temp_dir.path(), WorkloadSpec::Matmul { n: 8 }, 2);
        harness.generate(temp_dir.path(), 42).unwrap();

        let sink = MemorySink::new();
        let summary = harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();
        assert_eq!(summary.workload, "matmul_8");
        assert_eq!(summary.state, LoopState::Halted);
        assert_eq!(summary.stats.clean, 2);
        assert_eq!(sink.words(), vec![STATUS_CLEAN, STATUS_CLEAN]);
    }

    #[test]
    fn test_missing_partition_reports_fault() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness_in(&temp_dir.path().join("absent"), WorkloadSpec::Identity { len: 4 }, 5);

        let sink = MemorySink::new();
        let summary = harness.run(sink.clone(), &HaltSignal::new(), None).unwrap();
        assert!(summary.faulted());
        assert_eq!(sink.words(), vec![FaultCode::PartitionMissing.word()]);
    }

    #[test]
    fn test_message_layout_follows_workload() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness_in(temp_dir.path(), WorkloadSpec::Fft { log2_len: 4 }, 1);
        assert_eq!(harness.message_layout().body_words(), 3);
    }
}
