//! Runs one test suite and reports pass/fail.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ProjectLayout, SuiteConfig};
use crate::domain::{SuiteName, SuiteResult};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::metrics::METRICS;

pub struct SuiteRunner {
    layout: ProjectLayout,
    backend: SuiteConfig,
    frontend: SuiteConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl SuiteRunner {
    pub fn new(
        layout: ProjectLayout,
        backend: SuiteConfig,
        frontend: SuiteConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            layout,
            backend,
            frontend,
            executor,
        }
    }

    pub fn config(&self, suite: SuiteName) -> &SuiteConfig {
        match suite {
            SuiteName::Backend => &self.backend,
            SuiteName::Frontend => &self.frontend,
        }
    }

    /// Absolute working directory of a suite.
    pub fn suite_dir(&self, suite: SuiteName) -> PathBuf {
        self.layout.resolve(&self.config(suite).dir)
    }

    /// Whether the suite's directory and manifest are present.
    pub fn is_present(&self, suite: SuiteName) -> bool {
        let dir = self.suite_dir(suite);
        if !dir.is_dir() {
            return false;
        }
        match &self.config(suite).manifest {
            Some(manifest) => dir.join(manifest).is_file(),
            None => true,
        }
    }

    /// Run a suite to completion. Never fails; errors land in the result.
    pub async fn run(&self, suite: SuiteName) -> SuiteResult {
        METRICS.inc_suite_runs();

        if !self.is_present(suite) {
            info!(%suite, dir = %self.suite_dir(suite).display(), "suite not present, skipping");
            return SuiteResult::skipped(suite);
        }

        let config = self.config(suite);
        let label = format!("{suite} suite");
        let spec = match CommandSpec::from_argv(&label, &config.command, &self.suite_dir(suite)) {
            Ok(spec) => spec,
            Err(e) => return SuiteResult::failed(suite, e.to_string()),
        };

        info!(%suite, command = %spec.display(), "running suite");
        match self.executor.execute(&spec).await {
            Ok(output) if output.success() => {
                if !output.stderr.trim().is_empty() {
                    warn!(%suite, stderr = %output.stderr.trim(), "suite passed with stderr output");
                }
                SuiteResult::passed(suite, output.stdout)
            }
            Ok(output) => {
                let message = output.failure_message(&spec);
                warn!(%suite, error = %message, "suite failed");
                SuiteResult::failed(suite, message)
            }
            Err(e) => {
                warn!(%suite, error = %e, "suite could not be started");
                SuiteResult::failed(suite, e.to_string())
            }
        }
    }
}
