//! Structured lifecycle events for autoheal runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan`
//! - Emission functions for the retry loop's milestones
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG`.

use tracing::info;
use tracing::instrument::{Instrument, Instrumented};

use crate::domain::{SuiteName, SuiteResult, Termination};

/// Run-scoped tracing span.
///
/// Every event emitted inside the span carries `run_id`. Use
/// [`RunSpan::instrument`] for async work and [`RunSpan::enter`] for
/// synchronous sections.
///
/// # Example
///
/// ```ignore
/// let span = RunSpan::new("a1b2c3");
/// let verdict = span.instrument(drive_loop()).await;
/// ```
#[derive(Debug, Clone)]
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("autoheal.run", run_id = %run_id),
        }
    }

    /// Attach the span to a future.
    pub fn instrument<F: std::future::Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }

    /// Enter the span until the returned guard is dropped.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Emit event: run started with its retry budget.
pub fn emit_run_started(run_id: &str, max_retries: u32, fix_attempts: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        max_retries = max_retries,
        fix_attempts = fix_attempts,
    );
}

/// Emit event: a round is starting.
pub fn emit_round_started(run_id: &str, round: u32, max_retries: u32) {
    info!(event = "round.started", run_id = %run_id, round = round, max_retries = max_retries);
}

/// Emit event: one suite finished (or was skipped).
pub fn emit_suite_finished(run_id: &str, round: u32, result: &SuiteResult) {
    info!(
        event = "suite.finished",
        run_id = %run_id,
        round = round,
        suite = %result.suite,
        success = result.success,
        skipped = result.is_skipped(),
    );
}

/// Emit event: a fix phase repaired the given suites.
pub fn emit_fix_phase_finished(run_id: &str, round: u32, repaired: &[SuiteName], fix_phase: u32) {
    let suites: Vec<&str> = repaired.iter().map(SuiteName::as_str).collect();
    info!(
        event = "fix_phase.finished",
        run_id = %run_id,
        round = round,
        fix_phase = fix_phase,
        suites = ?suites,
    );
}

/// Emit event: run finished with its verdict.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    rounds: usize,
    termination: Termination,
    success: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        rounds = rounds,
        termination = %termination,
        success = success,
    );
}

/// Emit event: the report sink failed (warning level).
pub fn emit_report_error(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.report_error", run_id = %run_id, error = %error);
}
