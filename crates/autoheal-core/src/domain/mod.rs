//! Domain models for autoheal.
//!
//! Canonical definitions for the core entities:
//! - `Problem`: typed finding produced by the detector
//! - `FixOutcome` / `RepairRecord`: what a remediation did
//! - `SuiteResult`: one execution attempt of one suite
//! - `RunHistory` / `Round` / `RunVerdict`: the retry loop's record and verdict

pub mod error;
pub mod fix;
pub mod history;
pub mod problem;
pub mod suite;

pub use error::{HealError, Result};
pub use fix::{FixOutcome, RepairRecord};
pub use history::{HistoryEntry, Round, RunHistory, RunVerdict, Termination};
pub use problem::{Problem, ProblemKind, Severity};
pub use suite::{SuiteName, SuiteResult, SKIPPED_OUTPUT};
