use std::sync::Arc;
use std::time::Duration;

use autoheal_core::fakes::{HarnessCall, RecordingSink, ScriptedHarness};
use autoheal_core::{Orchestrator, RunConfig, RunVerdict, SuiteName, Termination};

async fn run(harness: Arc<ScriptedHarness>, max_retries: u32, fix_attempts: u32) -> RunVerdict {
    Orchestrator::new(harness, RunConfig::new(max_retries, fix_attempts))
        .expect("valid budget")
        .with_run_id("scenario")
        .run()
        .await
}

fn suite_runs(verdict: &RunVerdict) -> usize {
    verdict.rounds.iter().map(|r| r.suites.len()).sum()
}

#[tokio::test]
async fn both_suites_pass_first_round() {
    let harness = Arc::new(ScriptedHarness::new());
    let verdict = run(harness.clone(), 3, 2).await;

    assert!(verdict.success);
    assert_eq!(verdict.termination, Termination::Success);
    assert_eq!(verdict.rounds_executed(), 1);
    assert_eq!(verdict.fix_phases, 0);
    assert_eq!(verdict.repair_count(), 0);
    assert_eq!(verdict.exit_code(), 0);
    assert_eq!(
        harness.calls(),
        vec![
            HarnessCall::Run(SuiteName::Backend),
            HarnessCall::Run(SuiteName::Frontend)
        ]
    );
}

#[tokio::test]
async fn scenario_a_backend_always_fails() {
    let harness = Arc::new(ScriptedHarness::new().backend(&[false]));
    let verdict = run(harness.clone(), 3, 2).await;

    assert!(!verdict.success);
    assert_eq!(verdict.termination, Termination::FixBudgetExhausted);
    assert_eq!(verdict.rounds_executed(), 3);
    assert_eq!(verdict.fix_phases, 2);
    assert!(verdict.rounds[0].had_fix_phase());
    assert!(verdict.rounds[1].had_fix_phase());
    assert!(!verdict.rounds[2].had_fix_phase());
    assert_eq!(harness.run_count(SuiteName::Backend), 3);
    assert_eq!(harness.repair_count(SuiteName::Backend), 2);
    assert_eq!(harness.repair_count(SuiteName::Frontend), 0);
    assert_eq!(verdict.exit_code(), 1);
}

#[tokio::test]
async fn scenario_b_no_fix_budget_stops_after_first_round() {
    let harness = Arc::new(ScriptedHarness::new().backend(&[false]).frontend(&[false]));
    let verdict = run(harness.clone(), 3, 0).await;

    assert!(!verdict.success);
    assert_eq!(verdict.termination, Termination::FixBudgetExhausted);
    assert_eq!(verdict.rounds_executed(), 1);
    assert_eq!(verdict.fix_phases, 0);
    assert_eq!(harness.calls().len(), 2);
}

#[tokio::test]
async fn scenario_c_backend_recovers_after_one_repair() {
    let harness = Arc::new(ScriptedHarness::new().backend(&[false, true]));
    let verdict = run(harness.clone(), 3, 2).await;

    assert!(verdict.success);
    assert_eq!(verdict.rounds_executed(), 2);
    assert_eq!(verdict.fix_phases, 1);
    assert_eq!(verdict.repair_count(), 1);
    assert_eq!(verdict.rounds[0].repairs[0].suite, SuiteName::Backend);
}

#[tokio::test]
async fn scenario_d_absent_frontend_never_repaired() {
    let harness = Arc::new(
        ScriptedHarness::new()
            .backend(&[false, false, true])
            .frontend_absent(),
    );
    let verdict = run(harness.clone(), 4, 3).await;

    assert!(verdict.success);
    assert_eq!(verdict.rounds_executed(), 3);
    for round in &verdict.rounds {
        let frontend = round
            .suites
            .iter()
            .find(|s| s.suite == SuiteName::Frontend)
            .expect("frontend recorded every round");
        assert!(frontend.success);
        assert!(frontend.is_skipped());
    }
    assert_eq!(harness.repair_count(SuiteName::Frontend), 0);
}

#[tokio::test]
async fn failing_suites_repaired_frontend_first() {
    let harness = Arc::new(
        ScriptedHarness::new()
            .backend(&[false, true])
            .frontend(&[false, true]),
    );
    let verdict = run(harness.clone(), 3, 2).await;

    assert!(verdict.success);
    assert_eq!(
        &harness.calls()[..4],
        &[
            HarnessCall::Run(SuiteName::Backend),
            HarnessCall::Run(SuiteName::Frontend),
            HarnessCall::Repair(SuiteName::Frontend),
            HarnessCall::Repair(SuiteName::Backend),
        ]
    );
}

#[tokio::test]
async fn failed_repair_still_leads_to_next_round() {
    let harness = Arc::new(
        ScriptedHarness::new()
            .backend(&[false, true])
            .failing_repairs(),
    );
    let verdict = run(harness, 3, 2).await;

    assert!(verdict.success);
    assert!(!verdict.rounds[0].repairs[0].success);
}

#[tokio::test]
async fn budgets_bound_rounds_and_fix_phases() {
    for max_retries in 1..=5u32 {
        for fix_attempts in 0..=5u32 {
            let harness = Arc::new(ScriptedHarness::new().backend(&[false]));
            let verdict = run(harness.clone(), max_retries, fix_attempts).await;

            assert!(!verdict.success);
            assert!(verdict.rounds_executed() as u32 <= max_retries);
            assert!(verdict.fix_phases <= fix_attempts);
            assert_eq!(
                verdict.rounds_executed() as u32,
                max_retries.min(fix_attempts + 1)
            );
            assert_eq!(verdict.fix_phases, fix_attempts.min(max_retries));

            let expected = if fix_attempts < max_retries {
                Termination::FixBudgetExhausted
            } else {
                Termination::RetriesExhausted
            };
            assert_eq!(
                verdict.termination, expected,
                "max_retries={max_retries} fix_attempts={fix_attempts}"
            );

            // history is append-only: every harness call is accounted for
            assert_eq!(suite_runs(&verdict), harness.calls().len() - verdict.repair_count());
        }
    }
}

#[tokio::test]
async fn sink_receives_verdict_exactly_once() {
    let harness = Arc::new(ScriptedHarness::new().backend(&[false, true]));
    let sink = Arc::new(RecordingSink::new());

    let verdict = Orchestrator::new(harness, RunConfig::default())
        .unwrap()
        .with_sink(sink.clone())
        .run()
        .await;

    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0], verdict);
}

#[tokio::test]
async fn sink_failure_is_not_fatal() {
    let harness = Arc::new(ScriptedHarness::new());
    let sink = Arc::new(RecordingSink::failing());

    let verdict = Orchestrator::new(harness, RunConfig::default())
        .unwrap()
        .with_sink(sink.clone())
        .run()
        .await;

    assert!(verdict.success);
    assert_eq!(sink.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn interrupt_keeps_partial_history_and_persists_once() {
    // round 1: backend fails, frontend passes, backend repaired
    // round 2: backend passes, frontend never finishes
    let harness = Arc::new(ScriptedHarness::new().backend(&[false, true]).hang_after(3));
    let sink = Arc::new(RecordingSink::new());

    let verdict = Orchestrator::new(harness.clone(), RunConfig::default())
        .unwrap()
        .with_sink(sink.clone())
        .with_run_id("interrupted-run")
        .run_until(tokio::time::sleep(Duration::from_secs(5)))
        .await;

    assert!(!verdict.success);
    assert_eq!(verdict.termination, Termination::Interrupted);
    assert_eq!(verdict.exit_code(), 1);
    assert_eq!(verdict.rounds_executed(), 2);
    assert_eq!(verdict.rounds[0].suites.len(), 2);
    assert_eq!(verdict.rounds[0].repairs.len(), 1);
    assert_eq!(verdict.rounds[1].suites.len(), 1);
    assert_eq!(verdict.fix_phases, 1);

    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].run_id, "interrupted-run");
}

#[tokio::test]
async fn shutdown_already_fired_interrupts_before_any_suite() {
    let harness = Arc::new(ScriptedHarness::new());
    let verdict = Orchestrator::new(harness.clone(), RunConfig::default())
        .unwrap()
        .run_until(std::future::ready(()))
        .await;

    assert_eq!(verdict.termination, Termination::Interrupted);
    assert!(verdict.rounds.is_empty());
    assert!(harness.calls().is_empty());
}
