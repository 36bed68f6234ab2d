//! In-memory fakes for the loop's seams (testing only)
//!
//! - `ScriptedExecutor` satisfies `CommandExecutor` without spawning
//!   anything: responses are scripted per command-line fragment.
//! - `ScriptedHarness` satisfies `Harness` with scripted pass/fail sequences.
//! - `RecordingSink` satisfies `ReportSink` by keeping every verdict.
//!
//! All of them record their calls for later assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{HealError, RepairRecord, Result, RunVerdict, SuiteName, SuiteResult};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::orchestrator::Harness;
use crate::report::ReportSink;

/// A scripted reply to one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeResponse {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The command could not be started.
    SpawnError(String),
}

impl FakeResponse {
    pub fn ok() -> Self {
        Self::exit(0, "", "")
    }

    pub fn ok_with(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::exit(code, "", stderr)
    }

    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        Self::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn into_result(self, spec: &CommandSpec) -> Result<CommandOutput> {
        match self {
            FakeResponse::Exit {
                code,
                stdout,
                stderr,
            } => Ok(CommandOutput::new(code, stdout, stderr)),
            FakeResponse::SpawnError(message) => Err(HealError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, message),
            }),
        }
    }
}

struct Rule {
    fragment: String,
    responses: VecDeque<FakeResponse>,
}

/// Executor that replays scripted responses.
///
/// The first rule whose fragment occurs in the command line answers. A rule
/// with several queued responses hands them out in order and then keeps
/// repeating the last one. Unmatched commands get the fallback (exit 0).
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    fallback: FakeResponse,
    calls: Mutex<Vec<CommandSpec>>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: FakeResponse::ok(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: FakeResponse) -> Self {
        self.fallback = fallback;
        self
    }

    /// Script the response for commands containing `fragment`.
    pub fn on(self, fragment: &str, response: FakeResponse) -> Self {
        self.on_sequence(fragment, vec![response])
    }

    /// Script successive responses for commands containing `fragment`.
    pub fn on_sequence(self, fragment: &str, responses: Vec<FakeResponse>) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            rules.push(Rule {
                fragment: fragment.to_string(),
                responses: responses.into(),
            });
        }
        self
    }

    /// Every command seen so far, in call order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines seen so far, in call order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }

    /// Number of calls whose command line contains `fragment`.
    pub fn count(&self, fragment: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(fragment))
            .count()
    }

    fn next_response(&self, line: &str) -> FakeResponse {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if !line.contains(&rule.fragment) {
                continue;
            }
            if rule.responses.len() > 1 {
                if let Some(next) = rule.responses.pop_front() {
                    return next;
                }
            }
            if let Some(last) = rule.responses.front() {
                return last.clone();
            }
        }
        self.fallback.clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let response = self.next_response(&spec.display());
        response.into_result(spec)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// One call made against a [`ScriptedHarness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessCall {
    Run(SuiteName),
    Repair(SuiteName),
}

/// Harness with scripted suite outcomes.
///
/// Each suite replays its outcome list like `ScriptedExecutor` rules do:
/// in order, then the last one forever. An empty list means "pass". A suite
/// marked absent always reports skipped. Repairs succeed unless configured
/// otherwise.
pub struct ScriptedHarness {
    backend: Mutex<VecDeque<bool>>,
    frontend: Mutex<VecDeque<bool>>,
    frontend_absent: bool,
    repairs_succeed: bool,
    hang_after_runs: Option<usize>,
    calls: Mutex<Vec<HarnessCall>>,
}

impl Default for ScriptedHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHarness {
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(VecDeque::new()),
            frontend: Mutex::new(VecDeque::new()),
            frontend_absent: false,
            repairs_succeed: true,
            hang_after_runs: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn backend(self, outcomes: &[bool]) -> Self {
        *self.backend.lock().unwrap() = outcomes.iter().copied().collect();
        self
    }

    pub fn frontend(self, outcomes: &[bool]) -> Self {
        *self.frontend.lock().unwrap() = outcomes.iter().copied().collect();
        self
    }

    pub fn frontend_absent(mut self) -> Self {
        self.frontend_absent = true;
        self
    }

    pub fn failing_repairs(mut self) -> Self {
        self.repairs_succeed = false;
        self
    }

    /// Let `runs` suite runs complete, then never finish another one.
    pub fn hang_after(mut self, runs: usize) -> Self {
        self.hang_after_runs = Some(runs);
        self
    }

    pub fn calls(&self) -> Vec<HarnessCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn run_count(&self, suite: SuiteName) -> usize {
        self.count(HarnessCall::Run(suite))
    }

    pub fn repair_count(&self, suite: SuiteName) -> usize {
        self.count(HarnessCall::Repair(suite))
    }

    fn count(&self, call: HarnessCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    fn completed_runs(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HarnessCall::Run(_)))
            .count()
    }

    fn next_outcome(queue: &Mutex<VecDeque<bool>>) -> bool {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        queue.front().copied().unwrap_or(true)
    }
}

#[async_trait]
impl Harness for ScriptedHarness {
    async fn run_suite(&self, suite: SuiteName) -> SuiteResult {
        if let Some(limit) = self.hang_after_runs {
            if self.completed_runs() >= limit {
                std::future::pending::<()>().await;
            }
        }
        self.calls.lock().unwrap().push(HarnessCall::Run(suite));

        if suite == SuiteName::Frontend && self.frontend_absent {
            return SuiteResult::skipped(suite);
        }
        let passed = match suite {
            SuiteName::Backend => Self::next_outcome(&self.backend),
            SuiteName::Frontend => Self::next_outcome(&self.frontend),
        };
        if passed {
            SuiteResult::passed(suite, "ok")
        } else {
            SuiteResult::failed(suite, format!("{suite} suite failed"))
        }
    }

    async fn repair_suite(&self, suite: SuiteName) -> RepairRecord {
        self.calls.lock().unwrap().push(HarnessCall::Repair(suite));
        let message = if self.repairs_succeed {
            "scripted repair"
        } else {
            "scripted repair failed"
        };
        RepairRecord::new(suite, self.repairs_succeed, message)
    }
}

// ---------------------------------------------------------------------------
// Report sink
// ---------------------------------------------------------------------------

/// Sink that keeps every published verdict, optionally failing each publish.
#[derive(Default)]
pub struct RecordingSink {
    verdicts: Mutex<Vec<RunVerdict>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the verdict, then report an error anyway.
    pub fn failing() -> Self {
        Self {
            verdicts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<RunVerdict> {
        self.verdicts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn publish(&self, verdict: &RunVerdict) -> Result<()> {
        self.verdicts.lock().unwrap().push(verdict.clone());
        if self.fail {
            return Err(HealError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "report directory is read-only",
            )));
        }
        Ok(())
    }
}
