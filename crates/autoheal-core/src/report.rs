//! Run reports: digest-verified JSON artifact plus a Markdown summary.
//!
//! Layout under the report directory:
//!
//! ```text
//! <dir>/<run_id>/report.json     pretty JSON of the RunVerdict
//! <dir>/<run_id>/report.digest   SHA-256 hex of report.json
//! <dir>/<run_id>/summary.md      human-readable round table
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::domain::{HealError, Result, Round, RunVerdict, SuiteName, SuiteResult};

pub const REPORT_FILE: &str = "report.json";
pub const DIGEST_FILE: &str = "report.digest";
pub const SUMMARY_FILE: &str = "summary.md";

/// Receives the verdict once, when a run ends.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, verdict: &RunVerdict) -> Result<()>;
}

/// Writes each verdict to disk with [`write_run_report`].
#[derive(Debug, Clone)]
pub struct FsReportSink {
    dir: PathBuf,
}

impl FsReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportSink for FsReportSink {
    async fn publish(&self, verdict: &RunVerdict) -> Result<()> {
        let path = write_run_report(verdict, &self.dir)?;
        info!(path = %path.display(), "run report written");
        Ok(())
    }
}

/// SHA-256 hex digest of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist the report triple for a verdict. Returns the `report.json` path.
pub fn write_run_report(verdict: &RunVerdict, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&verdict.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let report_path = run_dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(verdict)?;
    let digest = content_digest(&json);

    std::fs::write(&report_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), digest.as_bytes())?;
    std::fs::write(run_dir.join(SUMMARY_FILE), render_summary_md(verdict))?;

    Ok(report_path)
}

/// Read `<dir>/<run_id>/report.json` and verify it against its digest.
pub fn read_run_report(run_id: &str, dir: &Path) -> Result<RunVerdict> {
    let run_dir = dir.join(run_id);

    let json = std::fs::read(run_dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(HealError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

/// Run ids with a report under `dir`, sorted by name.
pub fn list_run_reports(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().join(REPORT_FILE).is_file() {
            ids.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Render the Markdown summary for a verdict.
pub fn render_summary_md(verdict: &RunVerdict) -> String {
    let mut out = String::new();
    out.push_str("# Autoheal Run Report\n\n");
    out.push_str(&format!(
        "- run id: `{}`\n- result: {}\n- termination: {}\n- rounds: {}\n- fix phases: {}\n- duration: {} ms\n- started: {}\n\n",
        verdict.run_id,
        if verdict.success { "PASS" } else { "FAIL" },
        verdict.termination,
        verdict.rounds_executed(),
        verdict.fix_phases,
        verdict.duration_ms(),
        verdict.started_at.to_rfc3339(),
    ));

    out.push_str("## Rounds\n\n");
    if verdict.rounds.is_empty() {
        out.push_str("_no rounds executed_\n");
        return out;
    }

    out.push_str("| Round | Backend | Frontend | Repairs |\n");
    out.push_str("|---|---|---|---|\n");
    for round in &verdict.rounds {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            round.number,
            suite_cell(round, SuiteName::Backend),
            suite_cell(round, SuiteName::Frontend),
            repairs_cell(round),
        ));
    }

    let failures: Vec<(u32, &SuiteResult)> = verdict
        .rounds
        .iter()
        .flat_map(|r| r.suites.iter().map(move |s| (r.number, s)))
        .filter(|(_, s)| !s.success)
        .collect();
    if !failures.is_empty() {
        out.push_str("\n## Failures\n\n");
        for (round, result) in failures {
            let first_line = result
                .error
                .as_deref()
                .and_then(|e| e.lines().next())
                .unwrap_or("unknown error");
            out.push_str(&format!("- round {} {}: {}\n", round, result.suite, first_line));
        }
    }

    out
}

fn suite_cell(round: &Round, suite: SuiteName) -> &'static str {
    match round.suites.iter().find(|s| s.suite == suite) {
        Some(s) if s.is_skipped() => "skipped",
        Some(s) if s.success => "pass",
        Some(_) => "fail",
        None => "-",
    }
}

fn repairs_cell(round: &Round) -> String {
    if round.repairs.is_empty() {
        return "-".to_string();
    }
    round
        .repairs
        .iter()
        .map(|r| {
            let status = if r.success { "ok" } else { "failed" };
            if r.fallback_used {
                format!("{} ({}, baseline)", r.suite, status)
            } else {
                format!("{} ({})", r.suite, status)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
