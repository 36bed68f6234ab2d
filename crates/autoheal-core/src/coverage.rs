//! Test coverage analysis.
//!
//! Runs the coverage command (Jest with the `json-summary` reporter by
//! default), reads the Istanbul `coverage-summary.json` it leaves behind and
//! turns it into prioritised suggestions:
//!
//! - `high`: overall line coverage is below the threshold
//! - `medium`: one per file below the threshold
//! - `low`: one per file that reports uncovered lines
//!
//! Low-coverage files are also scanned for uncovered function and branch
//! lines, producing [`SourceHint`]s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::config::ProjectLayout;
use crate::domain::{HealError, Result};
use crate::exec::{CommandExecutor, CommandSpec};

/// Line coverage percentage below which suggestions are raised.
pub const DEFAULT_COVERAGE_THRESHOLD: u32 = 80;

/// Coverage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoverageConfig {
    /// Runs the tests and writes the summary file.
    pub command: Vec<String>,
    /// Relative to the project root.
    pub summary_path: PathBuf,
    /// Minimum line coverage, in percent.
    pub threshold: u32,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "npx".to_string(),
                "jest".to_string(),
                "--coverage".to_string(),
                "--coverageReporters=json-summary".to_string(),
            ],
            summary_path: PathBuf::from("coverage/coverage-summary.json"),
            threshold: DEFAULT_COVERAGE_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Istanbul summary
// ---------------------------------------------------------------------------

/// One coverage counter (lines, statements, functions or branches).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metric {
    pub total: u64,
    pub covered: u64,
    pub skipped: u64,
    /// `"Unknown"` (nothing to cover) reads as 100.
    #[serde(deserialize_with = "lenient_pct")]
    pub pct: f64,
    #[serde(rename = "uncoveredLines", skip_serializing_if = "Vec::is_empty")]
    pub uncovered_lines: Vec<u32>,
}

fn lenient_pct<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(100.0))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSummary {
    pub lines: Metric,
    pub statements: Metric,
    pub functions: Metric,
    pub branches: Metric,
}

/// Parsed `coverage-summary.json`: the `total` entry plus one per file.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSummary {
    pub total: FileSummary,
    pub files: BTreeMap<String, FileSummary>,
}

impl CoverageSummary {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut files: BTreeMap<String, FileSummary> = serde_json::from_str(raw)?;
        let total = files.remove("total").ok_or_else(|| {
            <serde_json::Error as serde::de::Error>::custom("summary has no `total` entry")
        })?;
        Ok(Self { total, files })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HealError::CoverageMissing(path.to_path_buf()));
        }
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub path: String,
    pub lines: f64,
    pub statements: f64,
    pub functions: f64,
    pub branches: f64,
    pub uncovered_lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageAnalysis {
    /// Overall line coverage, in percent.
    pub overall_lines: f64,
    pub files: Vec<FileCoverage>,
    /// Paths of files whose line coverage is below the threshold.
    pub low_coverage: Vec<String>,
}

impl CoverageAnalysis {
    pub fn file(&self, path: &str) -> Option<&FileCoverage> {
        self.files.iter().find(|f| f.path == path)
    }
}

pub fn analyze(summary: &CoverageSummary, threshold: u32) -> CoverageAnalysis {
    let limit = f64::from(threshold);
    let files: Vec<FileCoverage> = summary
        .files
        .iter()
        .map(|(path, s)| FileCoverage {
            path: path.clone(),
            lines: s.lines.pct,
            statements: s.statements.pct,
            functions: s.functions.pct,
            branches: s.branches.pct,
            uncovered_lines: s.lines.uncovered_lines.clone(),
        })
        .collect();
    let low_coverage = files
        .iter()
        .filter(|f| f.lines < limit)
        .map(|f| f.path.clone())
        .collect();

    CoverageAnalysis {
        overall_lines: summary.total.lines.pct,
        files,
        low_coverage,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Overall,
    File,
    Lines,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub lines: Vec<u32>,
    pub message: String,
}

/// Suggestions in order: overall, then low-coverage files, then uncovered lines.
pub fn suggest(analysis: &CoverageAnalysis, threshold: u32) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    if analysis.overall_lines < f64::from(threshold) {
        suggestions.push(Suggestion {
            kind: SuggestionKind::Overall,
            priority: Priority::High,
            file: None,
            lines: Vec::new(),
            message: format!(
                "overall line coverage is {}%, raise it to at least {}%",
                analysis.overall_lines, threshold
            ),
        });
    }

    for path in &analysis.low_coverage {
        let lines = analysis.file(path).map(|f| f.lines).unwrap_or_default();
        suggestions.push(Suggestion {
            kind: SuggestionKind::File,
            priority: Priority::Medium,
            file: Some(path.clone()),
            lines: Vec::new(),
            message: format!("{path} has {lines}% line coverage, add test cases"),
        });
    }

    for file in analysis.files.iter().filter(|f| !f.uncovered_lines.is_empty()) {
        let listed: Vec<String> = file.uncovered_lines.iter().map(u32::to_string).collect();
        suggestions.push(Suggestion {
            kind: SuggestionKind::Lines,
            priority: Priority::Low,
            file: Some(file.path.clone()),
            lines: file.uncovered_lines.clone(),
            message: format!("{}: lines {} are not covered", file.path, listed.join(", ")),
        });
    }

    suggestions
}

// ---------------------------------------------------------------------------
// Source hints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Function,
    Branch,
}

/// An uncovered line that looks like a function or a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHint {
    pub kind: HintKind,
    pub file: String,
    pub line: u32,
    pub message: String,
}

const FUNCTION_MARKERS: [&str; 3] = ["function ", "=> ", "async "];
const BRANCH_MARKERS: [&str; 3] = ["if ", "else ", "switch "];

/// Scan `source` for uncovered lines that define a function or open a
/// branch. A line can yield both kinds.
pub fn source_hints(file: &str, source: &str, uncovered: &[u32]) -> Vec<SourceHint> {
    let mut hints = Vec::new();

    for (index, text) in source.lines().enumerate() {
        let line = index as u32 + 1;
        if !uncovered.contains(&line) {
            continue;
        }
        if FUNCTION_MARKERS.iter().any(|m| text.contains(m)) {
            hints.push(SourceHint {
                kind: HintKind::Function,
                file: file.to_string(),
                line,
                message: format!("add a test case for the function on line {line}"),
            });
        }
        if BRANCH_MARKERS.iter().any(|m| text.contains(m)) {
            hints.push(SourceHint {
                kind: HintKind::Branch,
                file: file.to_string(),
                line,
                message: format!("add a test case for the branch on line {line}"),
            });
        }
    }

    hints
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub generated_at: DateTime<Utc>,
    pub threshold: u32,
    pub analysis: CoverageAnalysis,
    pub suggestions: Vec<Suggestion>,
    pub hints: Vec<SourceHint>,
}

impl CoverageReport {
    pub fn high_priority_count(&self) -> usize {
        self.suggestions
            .iter()
            .filter(|s| s.priority == Priority::High)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "line coverage {}% (threshold {}%), {} file(s), {} below threshold",
            self.analysis.overall_lines,
            self.threshold,
            self.analysis.files.len(),
            self.analysis.low_coverage.len(),
        )
    }
}

/// Write `<dir>/coverage_report_<timestamp>.json`. Returns its path.
pub fn write_coverage_report(report: &CoverageReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "coverage_report_{}.json",
        report.generated_at.format("%Y%m%dT%H%M%S")
    );
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct CoverageAnalyzer {
    layout: ProjectLayout,
    config: CoverageConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl CoverageAnalyzer {
    pub fn new(
        layout: ProjectLayout,
        config: CoverageConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            layout,
            config,
            executor,
        }
    }

    pub fn summary_path(&self) -> PathBuf {
        self.layout.resolve(&self.config.summary_path)
    }

    /// Run the coverage command, then analyse the summary it wrote.
    ///
    /// Failing tests still leave a summary, so a non-zero exit is only
    /// logged. A command that cannot start is an error.
    pub async fn run(&self) -> Result<CoverageReport> {
        let spec = CommandSpec::from_argv("coverage", &self.config.command, &self.layout.root)?;
        let output = self.executor.execute(&spec).await?;
        if !output.success() {
            warn!(
                error = %output.failure_message(&spec),
                "coverage command failed, reading summary anyway"
            );
        }
        self.analyze_summary()
    }

    /// Analyse the summary file already on disk.
    pub fn analyze_summary(&self) -> Result<CoverageReport> {
        let summary = CoverageSummary::load(&self.summary_path())?;
        let threshold = self.config.threshold;
        let analysis = analyze(&summary, threshold);
        let suggestions = suggest(&analysis, threshold);
        let hints = self.hints_for(&analysis);

        let report = CoverageReport {
            generated_at: Utc::now(),
            threshold,
            analysis,
            suggestions,
            hints,
        };
        info!(
            overall = report.analysis.overall_lines,
            low_coverage = report.analysis.low_coverage.len(),
            suggestions = report.suggestions.len(),
            "coverage analysed"
        );
        Ok(report)
    }

    fn hints_for(&self, analysis: &CoverageAnalysis) -> Vec<SourceHint> {
        let mut hints = Vec::new();
        for path in &analysis.low_coverage {
            let Some(file) = analysis.file(path) else {
                continue;
            };
            if file.uncovered_lines.is_empty() {
                continue;
            }
            match std::fs::read_to_string(self.layout.resolve(path)) {
                Ok(source) => hints.extend(source_hints(path, &source, &file.uncovered_lines)),
                Err(e) => warn!(file = %path, error = %e, "cannot read source for hints"),
            }
        }
        hints
    }
}
