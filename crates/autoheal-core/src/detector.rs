//! Problem detection for the project under test.
//!
//! Runs a fixed battery of independent checks and returns their union.
//! A check that fails internally is logged and contributes nothing; it never
//! aborts the scan.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

use crate::config::ProjectLayout;
use crate::domain::{Problem, Result};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::metrics::METRICS;

/// The detector's checks, in the order they are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Dependencies,
    Syntax,
    RequiredFiles,
    Ports,
    Permissions,
}

impl Check {
    pub const ALL: [Check; 5] = [
        Check::Dependencies,
        Check::Syntax,
        Check::RequiredFiles,
        Check::Ports,
        Check::Permissions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Check::Dependencies => "dependencies",
            Check::Syntax => "syntax",
            Check::RequiredFiles => "required_files",
            Check::Ports => "ports",
            Check::Permissions => "permissions",
        }
    }
}

pub struct ProblemDetector {
    layout: ProjectLayout,
    executor: Arc<dyn CommandExecutor>,
    missing_reference: Regex,
}

impl ProblemDetector {
    pub fn new(layout: ProjectLayout, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let missing_reference = Regex::new(&layout.missing_reference_pattern)?;
        Ok(Self {
            layout,
            executor,
            missing_reference,
        })
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Run every check and return all problems found. Never fails.
    pub async fn detect_all(&self) -> Vec<Problem> {
        let mut problems = Vec::new();

        for check in Check::ALL {
            match self.run_check(check).await {
                Ok(found) => {
                    debug!(check = check.name(), found = found.len(), "check finished");
                    problems.extend(found);
                }
                Err(e) => {
                    error!(check = check.name(), error = %e, "detection check failed");
                }
            }
        }

        METRICS.add_problems_detected(problems.len() as u64);
        info!(count = problems.len(), "problem detection finished");
        problems
    }

    /// Run a single check.
    pub async fn run_check(&self, check: Check) -> Result<Vec<Problem>> {
        match check {
            Check::Dependencies => self.check_dependencies(),
            Check::Syntax => self.check_syntax().await,
            Check::RequiredFiles => Ok(self.check_required_files()),
            Check::Ports => self.check_ports().await,
            Check::Permissions => Ok(self.check_permissions()),
        }
    }

    fn check_dependencies(&self) -> Result<Vec<Problem>> {
        let manifest = &self.layout.manifest;
        let parsed = std::fs::read_to_string(self.layout.manifest_path())
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| e.to_string())
            });
        if let Err(reason) = parsed {
            return Ok(vec![Problem::manifest_invalid(manifest, reason)]);
        }

        let mut problems = Vec::new();
        let dependency_root = self.layout.dependency_root_path();
        if !dependency_root.is_dir() {
            problems.push(Problem::missing_dependencies(
                &self.layout.dependency_root,
                &self.layout.install_command.join(" "),
            ));
        }

        let install_hint = self.layout.install_package_command.join(" ");
        for package in &self.layout.required_packages {
            if !dependency_root.join(package).exists() {
                problems.push(Problem::missing_dependency(package, &install_hint));
            }
        }

        Ok(problems)
    }

    async fn check_syntax(&self) -> Result<Vec<Problem>> {
        let mut problems = Vec::new();

        for file in self.source_files() {
            let relative = self.relative(&file);
            let spec = CommandSpec::from_argv(
                "syntax check",
                &self.layout.syntax_check_command,
                &self.layout.root,
            )?
            .with_arg(file.to_string_lossy());

            let output = self.executor.execute(&spec).await?;
            if output.success() {
                continue;
            }

            let details = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            if self.missing_reference.is_match(&details) {
                debug!(file = %relative, "missing reference, not a syntax defect");
                continue;
            }

            problems.push(Problem::syntax_error(&relative, details));
        }

        Ok(problems)
    }

    fn check_required_files(&self) -> Vec<Problem> {
        self.layout
            .required_files
            .iter()
            .filter(|file| !self.layout.resolve(file).exists())
            .map(|file| Problem::missing_file(file))
            .collect()
    }

    async fn check_ports(&self) -> Result<Vec<Problem>> {
        let mut problems = Vec::new();
        for &port in &self.layout.candidate_ports {
            if self.port_in_use(port).await? {
                problems.push(Problem::port_conflict(port));
            }
        }
        Ok(problems)
    }

    /// A query that cannot run or exits non-zero means "not in use".
    async fn port_in_use(&self, port: u16) -> Result<bool> {
        let spec = CommandSpec::from_argv(
            "port query",
            &self.layout.port_query_command,
            &self.layout.root,
        )?
        .with_arg(format!(":{port}"));

        match self.executor.execute(&spec).await {
            Ok(output) => Ok(output.success() && !output.stdout.trim().is_empty()),
            Err(e) => {
                debug!(port, error = %e, "port query failed, treating as free");
                Ok(false)
            }
        }
    }

    fn check_permissions(&self) -> Vec<Problem> {
        let scratch = self.layout.resolve(format!(
            "{}-{}",
            self.layout.scratch_prefix,
            Uuid::new_v4().simple()
        ));

        match check_writable(&scratch) {
            Ok(()) => Vec::new(),
            Err(e) => {
                if scratch.exists() {
                    if let Err(cleanup) = std::fs::remove_dir_all(&scratch) {
                        warn!(
                            path = %scratch.display(),
                            error = %cleanup,
                            "failed to remove permission scratch directory"
                        );
                    }
                }
                vec![Problem::permission_denied(e.to_string())]
            }
        }
    }

    /// Source files under the configured trees, skipping ignored directories.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for dir in &self.layout.source_dirs {
            let root = self.layout.resolve(dir);
            if !root.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !self.is_ignored_dir(e))
            {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if entry.file_type().is_file() && self.has_source_extension(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        }

        files
    }

    fn is_ignored_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| self.layout.ignored_dirs.iter().any(|d| d == name))
                .unwrap_or(false)
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.layout.source_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.layout.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

/// Create a scratch directory, write a file, then remove both.
fn check_writable(scratch: &Path) -> std::io::Result<()> {
    std::fs::create_dir(scratch)?;
    let marker = scratch.join("write_check.txt");
    std::fs::write(&marker, b"autoheal")?;
    std::fs::remove_file(&marker)?;
    std::fs::remove_dir(scratch)?;
    Ok(())
}
