//! Run history: append-only entries, derived rounds and the terminal verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fix::RepairRecord;
use super::suite::SuiteResult;

/// One appended fact about a run, tagged with its 1-based round number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    SuiteRun { round: u32, result: SuiteResult },
    Repair { round: u32, record: RepairRecord },
}

impl HistoryEntry {
    pub fn round(&self) -> u32 {
        match self {
            HistoryEntry::SuiteRun { round, .. } | HistoryEntry::Repair { round, .. } => *round,
        }
    }
}

/// Append-only log of everything the retry loop did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunHistory {
    entries: Vec<HistoryEntry>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_suite(&mut self, round: u32, result: SuiteResult) {
        self.entries.push(HistoryEntry::SuiteRun { round, result });
    }

    pub fn record_repair(&mut self, round: u32, record: RepairRecord) {
        self.entries.push(HistoryEntry::Repair { round, record });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group entries by round number, preserving append order.
    pub fn rounds(&self) -> Vec<Round> {
        let mut rounds: Vec<Round> = Vec::new();
        for entry in &self.entries {
            let number = entry.round();
            if rounds.last().map(|r| r.number) != Some(number) {
                rounds.push(Round::new(number));
            }
            // Entries are appended in round order, so the last round is the right one.
            if let Some(current) = rounds.last_mut() {
                match entry {
                    HistoryEntry::SuiteRun { result, .. } => current.suites.push(result.clone()),
                    HistoryEntry::Repair { record, .. } => current.repairs.push(record.clone()),
                }
            }
        }
        rounds
    }
}

/// One iteration of the retry loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub number: u32,
    pub suites: Vec<SuiteResult>,
    pub repairs: Vec<RepairRecord>,
}

impl Round {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            suites: Vec::new(),
            repairs: Vec::new(),
        }
    }

    pub fn all_passed(&self) -> bool {
        !self.suites.is_empty() && self.suites.iter().all(|s| s.success)
    }

    pub fn had_fix_phase(&self) -> bool {
        !self.repairs.is_empty()
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Both suites passed in the final round.
    Success,
    /// Suites still failing and no fix phase left.
    FixBudgetExhausted,
    /// A fix phase ran but no round remained to verify it.
    RetriesExhausted,
    /// Stopped by an external shutdown signal.
    Interrupted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Success => "success",
            Termination::FixBudgetExhausted => "fix_budget_exhausted",
            Termination::RetriesExhausted => "retries_exhausted",
            Termination::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal output of a run. Computed once, at loop exit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunVerdict {
    pub run_id: String,
    pub success: bool,
    pub termination: Termination,
    pub rounds: Vec<Round>,
    pub fix_phases: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunVerdict {
    pub fn rounds_executed(&self) -> usize {
        self.rounds.len()
    }

    pub fn repair_count(&self) -> usize {
        self.rounds.iter().map(|r| r.repairs.len()).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Process exit code for a standalone run.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}
