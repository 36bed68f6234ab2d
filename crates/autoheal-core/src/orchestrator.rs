//! The bounded test-and-repair loop.
//!
//! Each round runs the backend suite and then the frontend suite. If both
//! pass the run succeeds. Otherwise a fix phase repairs the failing suites
//! (frontend first) while the fix budget allows, and the next round verifies
//! the repair. Once the fix budget is spent a failing round ends the run,
//! even when rounds remain.
//!
//! Loop counters live in [`LoopState`] and move through pure functions so
//! the decision logic is testable without spawning anything. Side effects go
//! through the [`Harness`] trait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{HealConfig, ProjectLayout, RunConfig, SuiteConfig};
use crate::detector::ProblemDetector;
use crate::domain::{
    RepairRecord, Result, RunHistory, RunVerdict, SuiteName, SuiteResult, Termination,
};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::fixer::AutoFixer;
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};
use crate::report::ReportSink;
use crate::suite_runner::SuiteRunner;

// ---------------------------------------------------------------------------
// Loop state and transitions
// ---------------------------------------------------------------------------

/// Counters carried from round to round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopState {
    /// 1-based number of the current round.
    pub round: u32,
    /// Fix phases performed so far.
    pub fix_phases: u32,
}

impl LoopState {
    pub fn initial() -> Self {
        Self {
            round: 1,
            fix_phases: 0,
        }
    }

    pub fn can_fix(&self, run: &RunConfig) -> bool {
        self.fix_phases < run.fix_attempts
    }

    /// State after a fix phase: next round, one more phase spent.
    pub fn after_fix_phase(self) -> Self {
        Self {
            round: self.round + 1,
            fix_phases: self.fix_phases + 1,
        }
    }

    pub fn rounds_exhausted(&self, run: &RunConfig) -> bool {
        self.round > run.max_retries
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::initial()
    }
}

/// What to do once a round's suites have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Succeed,
    Repair,
    Stop(Termination),
}

pub fn decide(state: &LoopState, all_passed: bool, run: &RunConfig) -> Decision {
    if all_passed {
        Decision::Succeed
    } else if state.can_fix(run) {
        Decision::Repair
    } else {
        Decision::Stop(Termination::FixBudgetExhausted)
    }
}

/// Where the loop goes after a fix phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(LoopState),
    /// The fix phase happened but no round is left to verify it.
    Stop(LoopState, Termination),
}

pub fn advance(state: LoopState, run: &RunConfig) -> Advance {
    let next = state.after_fix_phase();
    if next.rounds_exhausted(run) {
        Advance::Stop(next, Termination::RetriesExhausted)
    } else {
        Advance::Next(next)
    }
}

/// Failing suites in repair order.
pub fn repair_targets(results: &[SuiteResult]) -> Vec<SuiteName> {
    SuiteName::REPAIR_ORDER
        .into_iter()
        .filter(|suite| results.iter().any(|r| r.suite == *suite && !r.success))
        .collect()
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// The loop's side effects: running and repairing suites.
///
/// Neither operation fails; errors are folded into the returned values.
#[async_trait]
pub trait Harness: Send + Sync {
    async fn run_suite(&self, suite: SuiteName) -> SuiteResult;
    async fn repair_suite(&self, suite: SuiteName) -> RepairRecord;
}

/// Harness that runs real commands through a [`CommandExecutor`].
pub struct ProcessHarness {
    layout: ProjectLayout,
    frontend: SuiteConfig,
    runner: SuiteRunner,
    detector: ProblemDetector,
    fixer: AutoFixer,
    executor: Arc<dyn CommandExecutor>,
}

impl ProcessHarness {
    pub fn new(config: &HealConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let layout = config.project.clone();
        Ok(Self {
            runner: SuiteRunner::new(
                layout.clone(),
                config.backend.clone(),
                config.frontend.clone(),
                executor.clone(),
            ),
            detector: ProblemDetector::new(layout.clone(), executor.clone())?,
            fixer: AutoFixer::new(layout.clone(), executor.clone()),
            frontend: config.frontend.clone(),
            layout,
            executor,
        })
    }

    pub fn detector(&self) -> &ProblemDetector {
        &self.detector
    }

    pub fn fixer(&self) -> &AutoFixer {
        &self.fixer
    }

    async fn repair_backend(&self) -> RepairRecord {
        match self.fixer.auto_fix(&self.detector).await {
            Ok(report) => RepairRecord::new(SuiteName::Backend, report.success, report.summary())
                .with_outcomes(report.outcomes),
            Err(e) => {
                warn!(error = %e, "auto-fix unavailable, running baseline repair");
                self.baseline_repair().await.with_fallback()
            }
        }
    }

    /// Make sure working directories exist and dependencies are installed.
    async fn baseline_repair(&self) -> RepairRecord {
        let mut notes = Vec::new();
        let mut success = true;

        for dir in &self.layout.working_dirs {
            let path = self.layout.resolve(dir);
            if path.is_dir() {
                continue;
            }
            match std::fs::create_dir_all(&path) {
                Ok(()) => notes.push(format!("created {dir}")),
                Err(e) => {
                    success = false;
                    notes.push(format!("failed to create {dir}: {e}"));
                }
            }
        }

        if !self.layout.dependency_root_path().is_dir() {
            match self.fixer.install_all().await {
                Ok(_) => notes.push("dependencies installed".to_string()),
                Err(e) => {
                    success = false;
                    notes.push(format!("install failed: {e}"));
                }
            }
        }

        let message = if notes.is_empty() {
            "baseline repair: nothing to do".to_string()
        } else {
            format!("baseline repair: {}", notes.join("; "))
        };
        RepairRecord::new(SuiteName::Backend, success, message)
    }

    async fn repair_frontend(&self) -> RepairRecord {
        let Some(fix_command) = &self.frontend.fix_command else {
            return RepairRecord::new(SuiteName::Frontend, false, "no fix command configured");
        };
        let spec = match CommandSpec::from_argv(
            "frontend fix",
            fix_command,
            &self.runner.suite_dir(SuiteName::Frontend),
        ) {
            Ok(spec) => spec,
            Err(e) => return RepairRecord::new(SuiteName::Frontend, false, e.to_string()),
        };

        match self.executor.execute(&spec).await {
            Ok(output) if output.success() => RepairRecord::new(
                SuiteName::Frontend,
                true,
                format!("`{}` succeeded", spec.display()),
            ),
            Ok(output) => {
                RepairRecord::new(SuiteName::Frontend, false, output.failure_message(&spec))
            }
            Err(e) => RepairRecord::new(SuiteName::Frontend, false, e.to_string()),
        }
    }
}

#[async_trait]
impl Harness for ProcessHarness {
    async fn run_suite(&self, suite: SuiteName) -> SuiteResult {
        self.runner.run(suite).await
    }

    async fn repair_suite(&self, suite: SuiteName) -> RepairRecord {
        let record = match suite {
            SuiteName::Backend => self.repair_backend().await,
            SuiteName::Frontend => self.repair_frontend().await,
        };
        info!(%suite, success = record.success, message = %record.message, "suite repaired");
        record
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    harness: Arc<dyn Harness>,
    run: RunConfig,
    sink: Option<Arc<dyn ReportSink>>,
    run_id: Option<String>,
}

impl Orchestrator {
    /// Fails if the retry budget is invalid.
    pub fn new(harness: Arc<dyn Harness>, run: RunConfig) -> Result<Self> {
        run.validate()?;
        Ok(Self {
            harness,
            run,
            sink: None,
            run_id: None,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use a fixed run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    /// Run to a verdict.
    pub async fn run(&self) -> RunVerdict {
        self.run_until(std::future::pending()).await
    }

    /// Run to a verdict, stopping early with `Interrupted` when `shutdown`
    /// completes. The sink still receives the partial verdict.
    pub async fn run_until<S>(&self, shutdown: S) -> RunVerdict
    where
        S: Future<Output = ()> + Send,
    {
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let span = RunSpan::new(&run_id);
        span.instrument(self.execute(run_id.clone(), shutdown))
            .await
    }

    async fn execute<S>(&self, run_id: String, shutdown: S) -> RunVerdict
    where
        S: Future<Output = ()> + Send,
    {
        let started_at = Utc::now();
        obs::emit_run_started(&run_id, self.run.max_retries, self.run.fix_attempts);

        tokio::pin!(shutdown);
        let mut history = RunHistory::new();
        let mut state = LoopState::initial();

        let termination = 'rounds: loop {
            obs::emit_round_started(&run_id, state.round, self.run.max_retries);

            let mut results = Vec::with_capacity(SuiteName::RUN_ORDER.len());
            for suite in SuiteName::RUN_ORDER {
                let Some(result) = race(&mut shutdown, self.harness.run_suite(suite)).await else {
                    break 'rounds Termination::Interrupted;
                };
                obs::emit_suite_finished(&run_id, state.round, &result);
                history.record_suite(state.round, result.clone());
                results.push(result);
            }

            let all_passed = results.iter().all(|r| r.success);
            match decide(&state, all_passed, &self.run) {
                Decision::Succeed => break Termination::Success,
                Decision::Stop(termination) => break termination,
                Decision::Repair => {}
            }

            let targets = repair_targets(&results);
            for suite in &targets {
                let Some(record) = race(&mut shutdown, self.harness.repair_suite(*suite)).await
                else {
                    break 'rounds Termination::Interrupted;
                };
                history.record_repair(state.round, record);
            }
            METRICS.inc_fix_phases();

            match advance(state, &self.run) {
                Advance::Next(next) => {
                    obs::emit_fix_phase_finished(&run_id, state.round, &targets, next.fix_phases);
                    state = next;
                }
                Advance::Stop(last, termination) => {
                    obs::emit_fix_phase_finished(&run_id, state.round, &targets, last.fix_phases);
                    state = last;
                    break termination;
                }
            }
        };

        let verdict = RunVerdict {
            run_id: run_id.clone(),
            success: termination == Termination::Success,
            termination,
            rounds: history.rounds(),
            fix_phases: state.fix_phases,
            started_at,
            finished_at: Utc::now(),
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.publish(&verdict).await {
                obs::emit_report_error(&run_id, &e);
            }
        }

        obs::emit_run_finished(
            &run_id,
            verdict.duration_ms(),
            verdict.rounds_executed(),
            verdict.termination,
            verdict.success,
        );
        METRICS.flush();
        verdict
    }
}

/// Await `work` unless `shutdown` completes first.
async fn race<S, T>(shutdown: &mut Pin<&mut S>, work: impl Future<Output = T>) -> Option<T>
where
    S: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown.as_mut() => None,
        value = work => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max_retries: u32, fix_attempts: u32) -> RunConfig {
        RunConfig::new(max_retries, fix_attempts)
    }

    #[test]
    fn test_decide_success_wins_regardless_of_budget() {
        let spent = LoopState {
            round: 3,
            fix_phases: 2,
        };
        assert_eq!(decide(&spent, true, &budget(3, 2)), Decision::Succeed);
    }

    #[test]
    fn test_decide_repairs_while_budget_remains() {
        assert_eq!(
            decide(&LoopState::initial(), false, &budget(3, 2)),
            Decision::Repair
        );
    }

    #[test]
    fn test_decide_stops_when_fix_budget_spent() {
        assert_eq!(
            decide(&LoopState::initial(), false, &budget(3, 0)),
            Decision::Stop(Termination::FixBudgetExhausted)
        );
    }

    #[test]
    fn test_advance_within_rounds() {
        assert_eq!(
            advance(LoopState::initial(), &budget(3, 2)),
            Advance::Next(LoopState {
                round: 2,
                fix_phases: 1
            })
        );
    }

    #[test]
    fn test_advance_past_last_round_is_retries_exhausted() {
        let last = LoopState {
            round: 2,
            fix_phases: 1,
        };
        assert_eq!(
            advance(last, &budget(2, 5)),
            Advance::Stop(
                LoopState {
                    round: 3,
                    fix_phases: 2
                },
                Termination::RetriesExhausted
            )
        );
    }

    #[test]
    fn test_repair_targets_frontend_first() {
        let results = vec![
            SuiteResult::failed(SuiteName::Backend, "x"),
            SuiteResult::failed(SuiteName::Frontend, "y"),
        ];
        assert_eq!(
            repair_targets(&results),
            vec![SuiteName::Frontend, SuiteName::Backend]
        );

        let backend_only = vec![
            SuiteResult::failed(SuiteName::Backend, "x"),
            SuiteResult::skipped(SuiteName::Frontend),
        ];
        assert_eq!(repair_targets(&backend_only), vec![SuiteName::Backend]);
    }

    #[test]
    fn test_zero_retries_rejected_at_construction() {
        let harness: Arc<dyn Harness> = Arc::new(crate::fakes::ScriptedHarness::new());
        assert!(Orchestrator::new(harness, budget(0, 1)).is_err());
    }
}
