//! Per-iteration diagnostic reporter
//!
//! State machine per iteration:
//! `Idle -> (Clean | FirstMismatch -> NthMismatch*) -> Idle`.
//! The return to `Idle` happens only once every message of the iteration
//! (or the clean signal) has been handed to the sink.

use crate::comparator::Comparison;
use crate::element::Element;
use crate::error::{ConfigFault, Result};
use crate::protocol::{DiagnosticMessage, FaultCode, MessageLayout};
use crate::sink::{DiagnosticSink, RetryingSink};
use crate::workload::PayloadMode;
use serde::Serialize;

/// Reporter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    /// Between iterations
    Idle,
    /// Emitting the clean word
    Clean,
    /// Emitting the first mismatch of an iteration
    FirstMismatch,
    /// Emitting a later mismatch of the same iteration
    NthMismatch,
}

/// What the reporter emitted for one iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    /// Mismatches found by the comparator
    pub mismatches: usize,
    /// Mismatch messages actually sent
    pub emitted: usize,
    /// Mismatches withheld by the per-iteration cap
    pub suppressed: usize,
    /// Messages sent in total
    pub messages: usize,
}

impl IterationReport {
    /// Iteration matched
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0
    }

    /// The cap cut emission short
    pub fn is_truncated(&self) -> bool {
        self.suppressed > 0
    }
}

/// Encodes comparison results and pushes them to the sink
pub struct Reporter<S> {
    sink: RetryingSink<S>,
    layout: MessageLayout,
    max_mismatches: Option<usize>,
    state: ReporterState,
    scratch: Vec<u32>,
}

impl<S: DiagnosticSink> Reporter<S> {
    /// `max_mismatches` caps per-element messages per iteration; `None` is unbounded
    pub fn new(sink: RetryingSink<S>, layout: MessageLayout, max_mismatches: Option<usize>) -> Self {
        Self {
            sink,
            layout,
            max_mismatches,
            state: ReporterState::Idle,
            scratch: Vec::with_capacity(16),
        }
    }

    /// Current state; `Idle` whenever no report is in flight
    pub fn state(&self) -> ReporterState {
        self.state
    }

    /// Sink retries so far
    pub fn sink_retries(&self) -> u64 {
        self.sink.retries()
    }

    /// Emit the messages for one compared iteration
    pub fn report<T: Element>(&mut self, comparison: &Comparison<T>) -> Result<IterationReport> {
        debug_assert_eq!(self.state, ReporterState::Idle);
        let result = self.emit_iteration(comparison);
        self.state = ReporterState::Idle;
        result
    }

    /// Emit a configuration fault word
    pub fn report_fault(&mut self, fault: &ConfigFault) -> Result<()> {
        self.report_code(FaultCode::from(fault))
    }

    /// Emit a reserved fault word by code
    pub fn report_code(&mut self, code: FaultCode) -> Result<()> {
        self.sink.send(&DiagnosticMessage::fault(code))?;
        self.sink.flush()
    }

    fn emit_iteration<T: Element>(&mut self, comparison: &Comparison<T>) -> Result<IterationReport> {
        let mut report = IterationReport {
            mismatches: comparison.mismatched_elements(),
            ..IterationReport::default()
        };

        if comparison.matched() {
            self.state = ReporterState::Clean;
            self.sink.send(&DiagnosticMessage::clean())?;
            report.messages = 1;
            self.sink.flush()?;
            return Ok(report);
        }

        if self.layout.payload == PayloadMode::Summary {
            self.state = ReporterState::FirstMismatch;
            let count = u32::try_from(report.mismatches).unwrap_or(u32::MAX);
            self.sink.send(&DiagnosticMessage::summary(count))?;
            report.messages = 1;
            self.sink.flush()?;
            return Ok(report);
        }

        let cap = self.max_mismatches.unwrap_or(usize::MAX);
        for (n, record) in comparison.mismatches.iter().take(cap).enumerate() {
            self.state = if n == 0 {
                ReporterState::FirstMismatch
            } else {
                ReporterState::NthMismatch
            };

            self.scratch.clear();
            self.layout.index.push_index(record.index, &mut self.scratch);
            match self.layout.payload {
                PayloadMode::Syndrome => record.push_syndrome(&mut self.scratch),
                _ => record.push_observed(&mut self.scratch),
            }

            let message = DiagnosticMessage::mismatch(n == 0, &self.scratch);
            self.sink.send(&message)?;
            report.emitted += 1;
            report.messages += 1;
        }

        report.suppressed = report.mismatches - report.emitted;
        if report.suppressed > 0 {
            tracing::warn!(
                "Mismatch cap reached: {} reported, {} suppressed",
                report.emitted,
                report.suppressed
            );
            let suppressed = u32::try_from(report.suppressed).unwrap_or(u32::MAX);
            self.sink.send(&DiagnosticMessage::truncated(suppressed))?;
            report.messages += 1;
        }

        self.sink.flush()?;
        Ok(report)
    }
}
