//! Fix outcomes and per-suite repair records.

use serde::{Deserialize, Serialize};

use super::problem::Problem;
use super::suite::SuiteName;

/// Result of attempting to remediate exactly one problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixOutcome {
    pub problem: Problem,
    pub fixed: bool,
    pub message: String,
}

impl FixOutcome {
    pub fn fixed(problem: Problem, message: impl Into<String>) -> Self {
        Self {
            problem,
            fixed: true,
            message: message.into(),
        }
    }

    pub fn unfixed(problem: Problem, message: impl Into<String>) -> Self {
        Self {
            problem,
            fixed: false,
            message: message.into(),
        }
    }
}

/// What a fix phase did for one failing suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairRecord {
    pub suite: SuiteName,
    pub success: bool,
    pub message: String,

    /// Per-problem outcomes when the repair went through the auto-fixer.
    #[serde(default)]
    pub outcomes: Vec<FixOutcome>,

    /// Whether the baseline repair ran because the primary attempt failed.
    #[serde(default)]
    pub fallback_used: bool,
}

impl RepairRecord {
    pub fn new(suite: SuiteName, success: bool, message: impl Into<String>) -> Self {
        Self {
            suite,
            success,
            message: message.into(),
            outcomes: Vec::new(),
            fallback_used: false,
        }
    }

    pub fn with_outcomes(mut self, outcomes: Vec<FixOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback_used = true;
        self
    }

    pub fn fixed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.fixed).count()
    }
}
