//! Configuration for autoheal runs.
//!
//! Everything has a default matching a Node project with a Jest backend suite
//! and an optional `client/` frontend. A TOML file may override any section;
//! the CLI may override the retry budget on top of that.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coverage::CoverageConfig;
use crate::domain::{HealError, Result, SuiteName};
use crate::watch::WatchConfig;

/// Default config file name looked up in the project root.
pub const DEFAULT_CONFIG_FILE: &str = "autoheal.toml";

/// Retry budget, read once at start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on rounds.
    pub max_retries: u32,

    /// Upper bound on rounds that may include a fix phase.
    pub fix_attempts: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fix_attempts: 2,
        }
    }
}

impl RunConfig {
    pub fn new(max_retries: u32, fix_attempts: u32) -> Self {
        Self {
            max_retries,
            fix_attempts,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(HealError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How to run (and repair) one suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteConfig {
    /// Working directory, relative to the project root.
    pub dir: PathBuf,

    /// File that must exist in `dir` for the suite to run at all.
    pub manifest: Option<PathBuf>,

    /// Test command (first element is the executable).
    pub command: Vec<String>,

    /// Optional repair command run in `dir` during a fix phase.
    #[serde(default)]
    pub fix_command: Option<Vec<String>>,
}

impl SuiteConfig {
    pub fn default_for(suite: SuiteName) -> Self {
        match suite {
            SuiteName::Backend => Self {
                dir: PathBuf::from("."),
                manifest: Some(PathBuf::from("package.json")),
                command: strings(&["npx", "jest", "--config", "jest.config.js"]),
                fix_command: None,
            },
            SuiteName::Frontend => Self {
                dir: PathBuf::from("client"),
                manifest: Some(PathBuf::from("package.json")),
                command: strings(&["npm", "test"]),
                fix_command: Some(strings(&["npm", "run", "lint:fix"])),
            },
        }
    }
}

/// Where things live in the project under test, and the commands that inspect it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub manifest: String,
    pub dependency_root: String,
    pub required_packages: Vec<String>,
    pub source_dirs: Vec<String>,
    pub ignored_dirs: Vec<String>,
    pub source_extensions: Vec<String>,
    pub required_files: Vec<String>,
    pub candidate_ports: Vec<u16>,
    /// Directories the baseline repair makes sure exist.
    pub working_dirs: Vec<String>,
    pub scratch_prefix: String,
    pub install_command: Vec<String>,
    /// Package name is appended as the last argument.
    pub install_package_command: Vec<String>,
    /// File path is appended as the last argument.
    pub syntax_check_command: Vec<String>,
    /// `:<port>` is appended as the last argument.
    pub port_query_command: Vec<String>,
    /// Checker error text matching this is a missing reference, not a defect.
    pub missing_reference_pattern: String,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            manifest: "package.json".to_string(),
            dependency_root: "node_modules".to_string(),
            required_packages: strings(&["jest", "supertest"]),
            source_dirs: strings(&["src", "__tests__"]),
            ignored_dirs: strings(&["node_modules", ".git"]),
            source_extensions: strings(&["js"]),
            required_files: strings(&["package.json", "jest.config.js", "src/index.js"]),
            candidate_ports: vec![5000, 3000, 8080],
            working_dirs: strings(&["uploads"]),
            scratch_prefix: ".autoheal-permcheck".to_string(),
            install_command: strings(&["npm", "install"]),
            install_package_command: strings(&["npm", "install", "--save-dev"]),
            syntax_check_command: strings(&["node", "--check"]),
            port_query_command: strings(&["lsof", "-i"]),
            missing_reference_pattern: r"Cannot find module|MODULE_NOT_FOUND".to_string(),
        }
    }
}

impl ProjectLayout {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub fn dependency_root_path(&self) -> PathBuf {
        self.resolve(&self.dependency_root)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.manifest)
    }
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// Relative paths are resolved against the project root.
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("test_reports"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealConfig {
    pub run: RunConfig,
    pub project: ProjectLayout,
    pub backend: SuiteConfig,
    pub frontend: SuiteConfig,
    pub report: ReportConfig,
    pub watch: WatchConfig,
    pub coverage: CoverageConfig,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            project: ProjectLayout::default(),
            backend: SuiteConfig::default_for(SuiteName::Backend),
            frontend: SuiteConfig::default_for(SuiteName::Frontend),
            report: ReportConfig::default(),
            watch: WatchConfig::default(),
            coverage: CoverageConfig::default(),
        }
    }
}

impl HealConfig {
    /// Load configuration for a project.
    ///
    /// An explicit `path` must exist. Without one, `<root>/autoheal.toml` is
    /// used when present and defaults otherwise. The project root given here
    /// wins over any `project.root` in the file.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = root.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)?
                } else {
                    debug!(root = %root.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.project.root = root.to_path_buf();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn suite(&self, suite: SuiteName) -> &SuiteConfig {
        match suite {
            SuiteName::Backend => &self.backend,
            SuiteName::Frontend => &self.frontend,
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.project.resolve(&self.report.dir)
    }

    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        for suite in SuiteName::RUN_ORDER {
            if self.suite(suite).command.is_empty() {
                return Err(HealError::EmptyCommand(format!("{suite} suite")));
            }
        }
        regex::Regex::new(&self.project.missing_reference_pattern)?;
        if self.coverage.command.is_empty() {
            return Err(HealError::EmptyCommand("coverage".to_string()));
        }
        if self.coverage.threshold > 100 {
            return Err(HealError::InvalidConfig(
                "coverage threshold must be a percentage".to_string(),
            ));
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_default() {
        let config = RunConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.fix_attempts, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let err = RunConfig::new(0, 2).validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_zero_fix_attempts_allowed() {
        assert!(RunConfig::new(3, 0).validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
[run]
fix_attempts = 0

[project]
candidate_ports = [9000]

[frontend]
dir = "web"
manifest = "package.json"
command = ["yarn", "test"]
"#;
        let config: HealConfig = toml::from_str(raw).expect("parse");
        assert_eq!(config.run.max_retries, 3);
        assert_eq!(config.run.fix_attempts, 0);
        assert_eq!(config.project.candidate_ports, vec![9000]);
        assert_eq!(config.project.dependency_root, "node_modules");
        assert_eq!(config.frontend.dir, PathBuf::from("web"));
        assert!(config.frontend.fix_command.is_none());
        assert_eq!(config.backend.command[0], "npx");
    }

    #[test]
    fn test_load_without_file_uses_defaults_and_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HealConfig::load(dir.path(), None).expect("load");
        assert_eq!(config.project.root, dir.path());
        assert_eq!(config.run, RunConfig::default());
        assert_eq!(config.report_dir(), dir.path().join("test_reports"));
    }

    #[test]
    fn test_load_reads_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[run]\nmax_retries = 5\n",
        )
        .expect("write");
        let config = HealConfig::load(dir.path(), None).expect("load");
        assert_eq!(config.run.max_retries, 5);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert!(HealConfig::load(dir.path(), Some(&missing)).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_suite_command() {
        let mut config = HealConfig::default();
        config.backend.command.clear();
        assert!(matches!(
            config.validate(),
            Err(HealError::EmptyCommand(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = HealConfig::default();
        config.coverage.threshold = 120;
        assert!(matches!(
            config.validate(),
            Err(HealError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = HealConfig::default();
        config.project.missing_reference_pattern = "(".to_string();
        assert!(matches!(config.validate(), Err(HealError::Pattern(_))));
    }
}
