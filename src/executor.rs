//! Execution loop
//!
//! Each iteration computes a fresh output from the read-only input, compares
//! it against the golden output and hands the result to the reporter. The loop
//! runs until its [`HaltSignal`] is raised or an optional iteration limit is
//! reached.

use crate::comparator::compare;
use crate::element::Element;
use crate::error::{ConfigFault, Dataset, Result};
use crate::golden::GoldenStore;
use crate::protocol::FaultCode;
use crate::reporter::{IterationReport, Reporter};
use crate::sink::DiagnosticSink;
use crate::workload::Workload;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Externally settable "halt requested" input of the loop
#[derive(Debug, Clone, Default)]
pub struct HaltSignal {
    flag: Arc<AtomicBool>,
}

impl HaltSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after the current iteration
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What to do after a configuration fault has been reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFaultPolicy {
    /// Emit the fault word once and stop
    #[default]
    Halt,
    /// Keep emitting the fault word once per iteration until halted
    Beacon,
}

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    /// Constructed, no iteration run yet
    Ready,
    /// Iterating
    Running,
    /// Stopped by the halt signal or the iteration limit
    Halted,
    /// Stopped by a configuration fault
    Faulted(FaultCode),
    /// Degraded: reporting a configuration fault every iteration. Kept after
    /// the loop stops so the fault stays visible.
    Beacon(FaultCode),
}

/// Corrupts the working output between compute and compare
pub trait FaultInjector<T>: Send {
    /// Modify `output` for iteration `iteration`; returns the elements touched
    fn inject(&mut self, iteration: u64, output: &mut [T]) -> usize;
}

/// Flip one bit of one element every `period` iterations.
///
/// A period of 0 flips only in the first iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitFlip {
    /// Element index
    pub index: usize,
    /// Bit within the element, low bit of the first field is 0
    pub bit: u32,
    /// Iterations between flips
    pub period: u64,
}

impl BitFlip {
    pub fn new(index: usize, bit: u32, period: u64) -> Self {
        Self { index, bit, period }
    }

    fn fires(&self, iteration: u64) -> bool {
        match self.period {
            0 => iteration == 0,
            p => iteration % p == 0,
        }
    }
}

impl<T: Element> FaultInjector<T> for BitFlip {
    fn inject(&mut self, iteration: u64, output: &mut [T]) -> usize {
        if !self.fires(iteration) {
            return 0;
        }
        match output.get_mut(self.index) {
            Some(value) => {
                *value = value.flip_bit(self.bit);
                1
            }
            None => 0,
        }
    }
}

/// Counters kept across a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Iterations executed, fault beacon iterations included
    pub iterations: u64,
    /// Iterations that matched
    pub clean: u64,
    /// Iterations with at least one mismatch
    pub dirty: u64,
    /// Mismatched elements over all iterations
    pub total_mismatches: u64,
    /// Iterations cut short by the mismatch cap
    pub truncated: u64,
    /// Configuration fault words emitted
    pub faults: u64,
    /// Sink retries
    pub sink_retries: u64,
}

impl RunStats {
    fn record(&mut self, report: &IterationReport) {
        self.iterations += 1;
        if report.is_clean() {
            self.clean += 1;
        } else {
            self.dirty += 1;
            self.total_mismatches += report.mismatches as u64;
        }
        if report.is_truncated() {
            self.truncated += 1;
        }
    }
}

/// Result of one loop step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Output compared and reported
    Compared(IterationReport),
    /// A configuration fault word was emitted instead
    Fault(FaultCode),
}

/// Runs a workload against its golden output
pub struct Executor<W: Workload, S> {
    workload: W,
    store: GoldenStore<W::Input, W::Output>,
    reporter: Reporter<S>,
    halt: HaltSignal,
    injector: Option<Box<dyn FaultInjector<W::Output>>>,
    policy: ConfigFaultPolicy,
    beacon_interval: Duration,
    state: LoopState,
    stats: RunStats,
}

impl<W: Workload, S: DiagnosticSink> Executor<W, S> {
    pub fn new(workload: W, store: GoldenStore<W::Input, W::Output>, reporter: Reporter<S>) -> Self {
        Self {
            workload,
            store,
            reporter,
            halt: HaltSignal::new(),
            injector: None,
            policy: ConfigFaultPolicy::default(),
            beacon_interval: Duration::from_secs(1),
            state: LoopState::Ready,
            stats: RunStats::default(),
        }
    }

    /// Share an existing halt signal
    pub fn with_halt_signal(mut self, halt: HaltSignal) -> Self {
        self.halt = halt;
        self
    }

    pub fn with_injector(mut self, injector: Box<dyn FaultInjector<W::Output>>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn with_fault_policy(mut self, policy: ConfigFaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause between fault beacon words
    pub fn with_beacon_interval(mut self, interval: Duration) -> Self {
        self.beacon_interval = interval;
        self
    }

    pub fn halt_signal(&self) -> HaltSignal {
        self.halt.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run one iteration: compute, inject, compare, report
    pub fn run_iteration(&mut self) -> Result<IterationOutcome> {
        if let LoopState::Beacon(code) = self.state {
            return self.beacon_step(code);
        }
        self.state = LoopState::Running;

        let expected = self.workload.input_len();
        let found = self.store.input().len();
        if found != expected {
            return self.enter_fault(ConfigFault::Size {
                dataset: Dataset::Input,
                expected: expected * <W::Input as Element>::BYTES,
                found: found * <W::Input as Element>::BYTES,
            });
        }

        let mut output = self.workload.compute(self.store.input());
        if let Some(injector) = self.injector.as_mut() {
            let touched = injector.inject(self.stats.iterations, &mut output);
            if touched > 0 {
                tracing::debug!("Injected fault into {} element(s) at iteration {}", touched, self.stats.iterations);
            }
        }

        let comparison = match compare(&output, self.store.golden()) {
            Ok(comparison) => comparison,
            Err(fault) => return self.enter_fault(fault),
        };
        drop(output);

        let report = self.reporter.report(&comparison)?;
        if !report.is_clean() {
            let flipped: u64 = comparison.mismatches.iter().map(|m| u64::from(m.flipped_bits())).sum();
            tracing::warn!(
                "Iteration {}: {} mismatch(es), {} flipped bit(s), first at index {}",
                self.stats.iterations,
                report.mismatches,
                flipped,
                comparison.first_mismatch_index().unwrap_or_default()
            );
        }
        self.stats.record(&report);
        Ok(IterationOutcome::Compared(report))
    }

    /// Iterate until halted, faulted, or `limit` iterations have run
    pub fn run(&mut self, limit: Option<u64>) -> Result<RunStats> {
        tracing::info!(
            "Starting loop for {} ({} input, {} output elements)",
            self.workload.instance(),
            self.store.input().len(),
            self.store.golden().len()
        );

        loop {
            if matches!(self.state, LoopState::Faulted(_)) {
                break;
            }
            if self.halt.is_requested() || limit.is_some_and(|l| self.stats.iterations >= l) {
                if matches!(self.state, LoopState::Ready | LoopState::Running) {
                    self.state = LoopState::Halted;
                }
                break;
            }
            self.run_iteration()?;
        }

        self.stats.sink_retries = self.reporter.sink_retries();
        tracing::info!(
            "Loop stopped after {} iterations ({} clean, {} dirty)",
            self.stats.iterations,
            self.stats.clean,
            self.stats.dirty
        );
        Ok(self.stats.clone())
    }

    fn enter_fault(&mut self, fault: ConfigFault) -> Result<IterationOutcome> {
        tracing::error!("Configuration fault: {}", fault);
        let code = FaultCode::from(&fault);
        self.reporter.report_fault(&fault)?;
        self.stats.iterations += 1;
        self.stats.faults += 1;
        self.state = match self.policy {
            ConfigFaultPolicy::Halt => LoopState::Faulted(code),
            ConfigFaultPolicy::Beacon => LoopState::Beacon(code),
        };
        Ok(IterationOutcome::Fault(code))
    }

    fn beacon_step(&mut self, code: FaultCode) -> Result<IterationOutcome> {
        std::thread::sleep(self.beacon_interval);
        self.reporter.report_code(code)?;
        self.stats.iterations += 1;
        self.stats.faults += 1;
        Ok(IterationOutcome::Fault(code))
    }
}

/// Report a fault that prevented the loop from starting.
///
/// Under [`ConfigFaultPolicy::Halt`] the word is sent once. Under
/// [`ConfigFaultPolicy::Beacon`] it is repeated every `interval` until the halt
/// signal is raised or `limit` words have been sent.
pub fn run_fault_beacon<S: DiagnosticSink>(
    reporter: &mut Reporter<S>,
    fault: &ConfigFault,
    policy: ConfigFaultPolicy,
    interval: Duration,
    halt: &HaltSignal,
    limit: Option<u64>,
) -> Result<RunStats> {
    tracing::error!("Configuration fault: {}", fault);
    let code = FaultCode::from(fault);
    let mut stats = RunStats::default();

    reporter.report_fault(fault)?;
    stats.iterations += 1;
    stats.faults += 1;

    if policy == ConfigFaultPolicy::Beacon {
        while !halt.is_requested() && !limit.is_some_and(|l| stats.iterations >= l) {
            std::thread::sleep(interval);
            reporter.report_code(code)?;
            stats.iterations += 1;
            stats.faults += 1;
        }
    }

    stats.sink_retries = reporter.sink_retries();
    Ok(stats)
}
