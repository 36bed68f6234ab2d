//! autoheal core library
//!
//! Runs a project's backend and frontend test suites, detects common
//! environment problems, applies automatic remediations and retries within a
//! bounded budget. Every run ends in a single verdict that is persisted as a
//! digest-verified report.

pub mod config;
pub mod coverage;
pub mod detector;
pub mod domain;
pub mod exec;
pub mod fakes;
pub mod fixer;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod report;
pub mod suite_runner;
pub mod telemetry;
pub mod watch;

pub use config::{HealConfig, ProjectLayout, ReportConfig, RunConfig, SuiteConfig};

pub use coverage::{CoverageAnalyzer, CoverageConfig, CoverageReport, Priority, Suggestion};

pub use detector::{Check, ProblemDetector};

pub use domain::{
    FixOutcome, HealError, HistoryEntry, Problem, ProblemKind, RepairRecord, Result, Round,
    RunHistory, RunVerdict, Severity, SuiteName, SuiteResult, Termination,
};

pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ProcessExecutor};

pub use fixer::{remediation_for, AutoFixReport, AutoFixer, Remediation};

pub use orchestrator::{Harness, LoopState, Orchestrator, ProcessHarness};

pub use report::{read_run_report, write_run_report, FsReportSink, ReportSink};

pub use suite_runner::SuiteRunner;

pub use watch::{ChangeFilter, FileWatcher, RunGuard, WatchConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
