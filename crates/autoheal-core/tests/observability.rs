//! Lifecycle events emitted while the loop runs.

use std::sync::Arc;

use autoheal_core::domain::{SuiteName, SuiteResult, Termination};
use autoheal_core::fakes::{RecordingSink, ScriptedHarness};
use autoheal_core::metrics::METRICS;
use autoheal_core::obs::{
    emit_fix_phase_finished, emit_report_error, emit_round_started, emit_run_finished,
    emit_run_started, emit_suite_finished, RunSpan,
};
use autoheal_core::{Orchestrator, RunConfig};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_logs_budget() {
    emit_run_started("run-123", 3, 2);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("max_retries=3"));
}

#[traced_test]
#[test]
fn test_emit_suite_finished_logs_suite_and_skip() {
    emit_suite_finished("run-1", 1, &SuiteResult::skipped(SuiteName::Frontend));
    assert!(logs_contain("suite.finished"));
    assert!(logs_contain("skipped=true"));
}

#[traced_test]
#[test]
fn test_emit_round_and_fix_phase() {
    emit_round_started("run-1", 2, 3);
    emit_fix_phase_finished("run-1", 2, &[SuiteName::Frontend, SuiteName::Backend], 1);
    assert!(logs_contain("round.started"));
    assert!(logs_contain("fix_phase.finished"));
}

#[traced_test]
#[test]
fn test_emit_run_finished_and_report_error() {
    emit_run_finished("run-9", 1200, 2, Termination::RetriesExhausted, false);
    emit_report_error("run-9", &"disk full");
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("retries_exhausted"));
    assert!(logs_contain("run.report_error"));
}

#[traced_test]
#[test]
fn test_run_span_enter() {
    let span = RunSpan::new("span-run");
    let _guard = span.enter();
    tracing::info!("inside run span");
    assert!(logs_contain("span-run"));
}

#[traced_test]
#[tokio::test]
async fn test_loop_emits_lifecycle_events() {
    let harness = Arc::new(ScriptedHarness::new().backend(&[false, true]));
    let before = METRICS.fix_phases();

    Orchestrator::new(harness, RunConfig::default())
        .unwrap()
        .with_run_id("observed-run")
        .with_sink(Arc::new(RecordingSink::failing()))
        .run()
        .await;

    assert!(logs_contain("run.started"));
    assert!(logs_contain("round.started"));
    assert!(logs_contain("suite.finished"));
    assert!(logs_contain("fix_phase.finished"));
    assert!(logs_contain("run.report_error"));
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("observed-run"));
    assert!(METRICS.fix_phases() > before);
}
