//! Remediation of detected problems.
//!
//! Each problem kind maps to at most one [`Remediation`]. Fixing a batch
//! yields exactly one [`FixOutcome`] per input problem, in input order; a
//! remediation that errors is recorded as unfixed and the batch continues.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProjectLayout;
use crate::detector::ProblemDetector;
use crate::domain::{FixOutcome, HealError, Problem, ProblemKind, Result};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::metrics::METRICS;

/// Message for kinds that have no remediation at all.
pub const NO_REMEDIATION: &str = "no remediation available";

/// Message for kinds a human has to deal with.
pub const MANUAL_INTERVENTION: &str = "requires manual intervention";

/// An action that can be taken for a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    InstallAll,
    InstallPackage(String),
    CreateFile(String),
    Manual,
}

/// Map a problem kind to its remediation, if any.
pub fn remediation_for(kind: &ProblemKind) -> Option<Remediation> {
    match kind {
        ProblemKind::MissingDependencies => Some(Remediation::InstallAll),
        ProblemKind::MissingDependency { package } => {
            Some(Remediation::InstallPackage(package.clone()))
        }
        ProblemKind::MissingFile { path } => Some(Remediation::CreateFile(path.clone())),
        ProblemKind::SyntaxError { .. }
        | ProblemKind::PortConflict { .. }
        | ProblemKind::PermissionDenied { .. } => Some(Remediation::Manual),
        ProblemKind::ManifestInvalid { .. } => None,
    }
}

/// Result of a standalone detect-then-fix pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoFixReport {
    pub problems: Vec<Problem>,
    pub outcomes: Vec<FixOutcome>,
    /// True when nothing was detected or at least one fix succeeded.
    pub success: bool,
}

impl AutoFixReport {
    pub fn fixed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.fixed).count()
    }

    pub fn summary(&self) -> String {
        if self.problems.is_empty() {
            "no problems detected".to_string()
        } else {
            format!(
                "fixed {} of {} problems",
                self.fixed_count(),
                self.problems.len()
            )
        }
    }
}

pub struct AutoFixer {
    layout: ProjectLayout,
    executor: Arc<dyn CommandExecutor>,
}

impl AutoFixer {
    pub fn new(layout: ProjectLayout, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { layout, executor }
    }

    /// Attempt every problem in order. Never fails as a whole.
    pub async fn fix_problems(&self, problems: &[Problem]) -> Vec<FixOutcome> {
        let mut outcomes = Vec::with_capacity(problems.len());
        for problem in problems {
            let outcome = self.fix_one(problem).await;
            if outcome.fixed {
                METRICS.inc_fixes_applied();
            }
            info!(
                kind = problem.kind.tag(),
                fixed = outcome.fixed,
                message = %outcome.message,
                "fix attempted"
            );
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn fix_one(&self, problem: &Problem) -> FixOutcome {
        let remediation = match remediation_for(&problem.kind) {
            Some(r) => r,
            None => return FixOutcome::unfixed(problem.clone(), NO_REMEDIATION),
        };

        match self.apply(&remediation).await {
            Ok(message) => FixOutcome::fixed(problem.clone(), message),
            Err(HealError::ManualIntervention) => {
                FixOutcome::unfixed(problem.clone(), MANUAL_INTERVENTION)
            }
            Err(e) => FixOutcome::unfixed(problem.clone(), format!("remediation failed: {e}")),
        }
    }

    async fn apply(&self, remediation: &Remediation) -> Result<String> {
        match remediation {
            Remediation::InstallAll => {
                self.install_all().await?;
                Ok("dependencies installed".to_string())
            }
            Remediation::InstallPackage(package) => {
                let spec = CommandSpec::from_argv(
                    "install package",
                    &self.layout.install_package_command,
                    &self.layout.root,
                )?
                .with_arg(package.as_str());
                self.run_install(&spec).await?;
                Ok(format!("dependency {package} installed"))
            }
            Remediation::CreateFile(path) => {
                self.create_placeholder(path)?;
                Ok(format!("file {path} created"))
            }
            Remediation::Manual => Err(HealError::ManualIntervention),
        }
    }

    /// Run the install-all command in the project root.
    ///
    /// A non-zero exit is logged but still counts as having run.
    pub async fn install_all(&self) -> Result<CommandOutput> {
        let spec = CommandSpec::from_argv(
            "install",
            &self.layout.install_command,
            &self.layout.root,
        )?;
        self.run_install(&spec).await
    }

    async fn run_install(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.executor.execute(spec).await?;
        if !output.success() {
            warn!(
                command = %spec.display(),
                exit_code = ?output.exit_code,
                "install command exited with failure"
            );
        }
        Ok(output)
    }

    fn create_placeholder(&self, relative: &str) -> Result<()> {
        let target = self.layout.resolve(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = placeholder_content(&target, &self.layout.source_extensions);
        std::fs::write(&target, content)?;
        Ok(())
    }

    /// Detect, fix, summarize.
    ///
    /// Errors only when the project root does not exist.
    pub async fn auto_fix(&self, detector: &ProblemDetector) -> Result<AutoFixReport> {
        if !self.layout.root.is_dir() {
            return Err(HealError::ProjectRootMissing(self.layout.root.clone()));
        }

        let problems = detector.detect_all().await;
        if problems.is_empty() {
            info!("no problems detected");
            return Ok(AutoFixReport {
                problems,
                outcomes: Vec::new(),
                success: true,
            });
        }

        let outcomes = self.fix_problems(&problems).await;
        let success = outcomes.iter().any(|o| o.fixed);
        let report = AutoFixReport {
            problems,
            outcomes,
            success,
        };
        info!(summary = %report.summary(), success, "auto-fix finished");
        Ok(report)
    }
}

fn placeholder_content(target: &Path, source_extensions: &[String]) -> String {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    match name {
        "jest.config.js" => "module.exports = {\n  testEnvironment: 'node',\n  collectCoverage: true,\n  coverageDirectory: 'coverage'\n};\n".to_string(),
        "package.json" => {
            let package = target
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("app");
            format!(
                "{{\n  \"name\": \"{}\",\n  \"version\": \"1.0.0\",\n  \"private\": true,\n  \"scripts\": {{\n    \"test\": \"jest\"\n  }}\n}}\n",
                package.to_lowercase()
            )
        }
        _ => {
            let is_source = target
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| source_extensions.iter().any(|s| s == ext))
                .unwrap_or(false);
            if is_source {
                "// generated by autoheal\n".to_string()
            } else {
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use crate::fakes::{FakeResponse, ScriptedExecutor};
    use std::fs;

    fn fixer(root: &Path, exec: Arc<ScriptedExecutor>) -> AutoFixer {
        AutoFixer::new(ProjectLayout::default().with_root(root), exec)
    }

    #[test]
    fn test_manifest_invalid_has_no_remediation() {
        let kind = ProblemKind::ManifestInvalid {
            reason: "eof".to_string(),
        };
        assert_eq!(remediation_for(&kind), None);
        assert_eq!(
            remediation_for(&ProblemKind::PortConflict { port: 1 }),
            Some(Remediation::Manual)
        );
    }

    #[tokio::test]
    async fn test_one_outcome_per_problem_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let problems = vec![
            Problem::missing_dependencies("node_modules", "npm install"),
            Problem::manifest_invalid("package.json", "eof"),
            Problem::missing_file("src/index.js"),
            Problem::port_conflict(3000),
            Problem::missing_dependency("jest", "npm install --save-dev"),
        ];

        let outcomes = fixer(dir.path(), exec.clone()).fix_problems(&problems).await;

        assert_eq!(outcomes.len(), problems.len());
        for (outcome, problem) in outcomes.iter().zip(&problems) {
            assert_eq!(&outcome.problem, problem);
        }
        assert!(outcomes[0].fixed);
        assert_eq!(outcomes[1].message, NO_REMEDIATION);
        assert!(outcomes[2].fixed);
        assert_eq!(outcomes[3].message, MANUAL_INTERVENTION);
        assert!(outcomes[4].fixed);
        assert_eq!(
            exec.command_lines(),
            vec!["npm install", "npm install --save-dev jest"]
        );
    }

    #[tokio::test]
    async fn test_manual_remediation_never_counts_as_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let f = fixer(dir.path(), exec.clone());

        let err = f.apply(&Remediation::Manual).await.unwrap_err();
        assert!(matches!(err, HealError::ManualIntervention));

        let outcomes = f
            .fix_problems(&[
                Problem::syntax_error("src/app.js", "Unexpected token"),
                Problem::port_conflict(5000),
            ])
            .await;
        assert!(outcomes.iter().all(|o| !o.fixed));
        assert!(outcomes.iter().all(|o| o.message == MANUAL_INTERVENTION));
        assert!(exec.command_lines().is_empty());
    }

    #[tokio::test]
    async fn test_install_nonzero_exit_still_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new().on("npm install", FakeResponse::fail(1, "ERR!")));
        let outcomes = fixer(dir.path(), exec)
            .fix_problems(&[Problem::missing_dependencies("node_modules", "npm install")])
            .await;
        assert!(outcomes[0].fixed);
    }

    #[tokio::test]
    async fn test_failing_remediation_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(
            ScriptedExecutor::new().on("--save-dev", FakeResponse::SpawnError("npm missing".into())),
        );
        let problems = vec![
            Problem::missing_dependency("supertest", "npm install --save-dev"),
            Problem::missing_file("jest.config.js"),
        ];

        let outcomes = fixer(dir.path(), exec).fix_problems(&problems).await;

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].fixed);
        assert!(outcomes[0].message.starts_with("remediation failed:"));
        assert!(outcomes[1].fixed);
        assert!(dir.path().join("jest.config.js").exists());
    }

    #[tokio::test]
    async fn test_missing_file_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixer(dir.path(), Arc::new(ScriptedExecutor::new()));
        let problems = vec![
            Problem::missing_file("jest.config.js"),
            Problem::missing_file("src/nested/index.js"),
            Problem::missing_file("package.json"),
            Problem::missing_file("notes/readme.txt"),
        ];

        let outcomes = f.fix_problems(&problems).await;
        assert!(outcomes.iter().all(|o| o.fixed));

        let jest = fs::read_to_string(dir.path().join("jest.config.js")).unwrap();
        assert!(jest.contains("testEnvironment: 'node'"));
        let index = fs::read_to_string(dir.path().join("src/nested/index.js")).unwrap();
        assert!(index.starts_with("//"));
        let manifest = fs::read_to_string(dir.path().join("package.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&manifest).expect("valid json");
        assert_eq!(parsed["version"], "1.0.0");
        let notes = fs::read_to_string(dir.path().join("notes/readme.txt")).unwrap();
        assert!(notes.is_empty());
    }

    #[tokio::test]
    async fn test_auto_fix_requires_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let exec = Arc::new(ScriptedExecutor::new());
        let layout = ProjectLayout::default().with_root(&missing);
        let detector = ProblemDetector::new(layout.clone(), exec.clone()).unwrap();
        let f = AutoFixer::new(layout, exec);

        let err = f.auto_fix(&detector).await.unwrap_err();
        assert!(matches!(err, HealError::ProjectRootMissing(_)));
    }

    #[tokio::test]
    async fn test_auto_fix_success_when_any_fix_lands() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let exec = Arc::new(ScriptedExecutor::new().on("lsof", FakeResponse::fail(1, "")));
        let layout = ProjectLayout::default().with_root(dir.path());
        let detector = ProblemDetector::new(layout.clone(), exec.clone()).unwrap();
        let f = AutoFixer::new(layout, exec);

        let report = f.auto_fix(&detector).await.expect("auto fix");
        assert!(report.success);
        assert_eq!(report.problems.len(), report.outcomes.len());
        assert!(report
            .problems
            .iter()
            .any(|p| p.severity == Severity::High));
        assert!(dir.path().join("src/index.js").exists());
    }

    #[tokio::test]
    async fn test_auto_fix_only_manual_problems_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("jest.config.js"), "").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.js"), "").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/jest")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/supertest")).unwrap();
        let exec = Arc::new(
            ScriptedExecutor::new()
                .on(":3000", FakeResponse::ok_with("node 1 LISTEN"))
                .on("lsof", FakeResponse::fail(1, "")),
        );
        let layout = ProjectLayout::default().with_root(dir.path());
        let detector = ProblemDetector::new(layout.clone(), exec.clone()).unwrap();

        let report = AutoFixer::new(layout, exec)
            .auto_fix(&detector)
            .await
            .expect("auto fix");
        assert_eq!(report.problems.len(), 1);
        assert!(!report.success);
        assert_eq!(report.summary(), "fixed 0 of 1 problems");
    }
}
