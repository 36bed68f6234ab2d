//! Typed problems produced by the detector.

use serde::{Deserialize, Serialize};

/// Severity level for a problem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What went wrong, with the data a fixer needs to act on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProblemKind {
    /// The dependency root directory is absent.
    MissingDependencies,

    /// One required package is absent from the dependency root.
    MissingDependency { package: String },

    /// The dependency manifest could not be read or parsed.
    ManifestInvalid { reason: String },

    /// A source file failed to load for a reason other than a missing reference.
    SyntaxError { file: String, details: String },

    /// A required file is absent.
    MissingFile { path: String },

    /// Some process is bound to a candidate port.
    PortConflict { port: u16 },

    /// The project tree is not writable.
    PermissionDenied { reason: String },
}

impl ProblemKind {
    /// Stable snake_case tag, used in logs and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            ProblemKind::MissingDependencies => "missing_dependencies",
            ProblemKind::MissingDependency { .. } => "missing_dependency",
            ProblemKind::ManifestInvalid { .. } => "manifest_invalid",
            ProblemKind::SyntaxError { .. } => "syntax_error",
            ProblemKind::MissingFile { .. } => "missing_file",
            ProblemKind::PortConflict { .. } => "port_conflict",
            ProblemKind::PermissionDenied { .. } => "permission_denied",
        }
    }
}

/// A single diagnostic finding. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub severity: Severity,
    pub message: String,
    /// Human-readable remediation hint.
    pub fix: String,
}

impl Problem {
    pub fn new(
        kind: ProblemKind,
        severity: Severity,
        message: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            fix: fix.into(),
        }
    }

    pub fn missing_dependencies(dependency_root: &str, install_hint: &str) -> Self {
        Self::new(
            ProblemKind::MissingDependencies,
            Severity::High,
            format!("dependency directory `{dependency_root}` does not exist"),
            install_hint,
        )
    }

    pub fn missing_dependency(package: &str, install_hint: &str) -> Self {
        Self::new(
            ProblemKind::MissingDependency {
                package: package.to_string(),
            },
            Severity::Medium,
            format!("missing dependency: {package}"),
            format!("{install_hint} {package}"),
        )
    }

    pub fn manifest_invalid(manifest: &str, reason: impl Into<String>) -> Self {
        Self::new(
            ProblemKind::ManifestInvalid {
                reason: reason.into(),
            },
            Severity::High,
            format!("failed to read manifest `{manifest}`"),
            format!("check the format of {manifest}"),
        )
    }

    pub fn syntax_error(file: &str, details: impl Into<String>) -> Self {
        Self::new(
            ProblemKind::SyntaxError {
                file: file.to_string(),
                details: details.into(),
            },
            Severity::High,
            format!("syntax error: {file}"),
            "fix the syntax error",
        )
    }

    pub fn missing_file(path: &str) -> Self {
        Self::new(
            ProblemKind::MissingFile {
                path: path.to_string(),
            },
            Severity::Medium,
            format!("missing file: {path}"),
            format!("create file: {path}"),
        )
    }

    pub fn port_conflict(port: u16) -> Self {
        Self::new(
            ProblemKind::PortConflict { port },
            Severity::Low,
            format!("port {port} is in use"),
            "use another port or stop the process holding it",
        )
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(
            ProblemKind::PermissionDenied {
                reason: reason.into(),
            },
            Severity::High,
            "insufficient file system permissions",
            "check folder permissions",
        )
    }
}
