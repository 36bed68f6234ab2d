//! Test suite identity and per-attempt results.

use serde::{Deserialize, Serialize};

/// The two independently-owned suites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuiteName {
    Backend,
    Frontend,
}

impl SuiteName {
    /// Execution order within a round.
    pub const RUN_ORDER: [SuiteName; 2] = [SuiteName::Backend, SuiteName::Frontend];

    /// Repair order within a fix phase.
    pub const REPAIR_ORDER: [SuiteName; 2] = [SuiteName::Frontend, SuiteName::Backend];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteName::Backend => "backend",
            SuiteName::Frontend => "frontend",
        }
    }
}

impl std::fmt::Display for SuiteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output recorded for a suite whose project root or manifest is absent.
pub const SKIPPED_OUTPUT: &str = "skipped";

/// One execution attempt of one suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteResult {
    pub suite: SuiteName,

    /// Decided by the process exit status alone.
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuiteResult {
    pub fn passed(suite: SuiteName, output: impl Into<String>) -> Self {
        Self {
            suite,
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(suite: SuiteName, error: impl Into<String>) -> Self {
        Self {
            suite,
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn skipped(suite: SuiteName) -> Self {
        Self::passed(suite, SKIPPED_OUTPUT)
    }

    pub fn is_skipped(&self) -> bool {
        self.success && self.output.as_deref() == Some(SKIPPED_OUTPUT)
    }
}
