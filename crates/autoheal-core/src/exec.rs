//! External command execution.
//!
//! Defines the `CommandExecutor` async trait, the only seam through which
//! autoheal spawns processes, plus the tokio-backed implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::domain::{HealError, Result};

// ---------------------------------------------------------------------------
// Command spec / output
// ---------------------------------------------------------------------------

/// A command to run: executable, arguments, working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// Build a spec from an argv vector. `label` names the command in errors.
    pub fn from_argv(label: &str, argv: &[String], cwd: &Path) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HealError::EmptyCommand(label.to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        })
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Space-joined command line, for logs and fake matching.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Exit status plus captured streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short failure description for a non-successful exit.
    pub fn failure_message(&self, spec: &CommandSpec) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        let detail = self.stderr.trim();
        if detail.is_empty() {
            format!("`{}` failed with {}", spec.display(), status)
        } else {
            format!("`{}` failed with {}: {}", spec.display(), status, detail)
        }
    }
}

// ---------------------------------------------------------------------------
// Executor trait
// ---------------------------------------------------------------------------

/// Run an external command and wait for it.
///
/// A process that ran returns `Ok` whatever its exit code; `Err` means the
/// command could not be started (or waited on) at all.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Executor backed by `tokio::process`. No timeout is applied.
///
/// Dropping the `execute` future kills the child, so an interrupted run
/// leaves no suite process behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec.display(), cwd = %spec.cwd.display(), "spawning");

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HealError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
