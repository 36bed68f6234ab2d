//! autoheal - self-healing test runner CLI
//!
//! The `autoheal` command runs a project's backend and frontend test suites,
//! repairs common environment problems between attempts, and records every
//! run as a verifiable report.
//!
//! ## Commands
//!
//! - `run`: run the bounded test-and-repair loop once
//! - `detect`: list detected problems without fixing anything
//! - `fix`: detect and apply automatic remediations
//! - `watch`: re-run the loop whenever watched files change
//! - `coverage`: run the suite with coverage and suggest where tests are missing
//! - `report`: show a stored run report (or list them)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::sync::watch as broadcast;
use tracing::{error, info, warn, Level};

use autoheal_core::coverage::write_coverage_report;
use autoheal_core::report::list_run_reports;
use autoheal_core::telemetry::init_tracing;
use autoheal_core::{
    read_run_report, AutoFixReport, AutoFixer, CoverageAnalyzer, CoverageReport, FsReportSink,
    Harness, HealConfig, Orchestrator, Problem, ProblemDetector, ProcessExecutor, ProcessHarness,
    ReportSink, RunVerdict, SuiteName,
};

#[derive(Parser)]
#[command(name = "autoheal")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-healing test runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <root>/autoheal.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test-and-repair loop once
    Run {
        /// Maximum number of rounds
        #[arg(long, env = "AUTOHEAL_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Maximum number of fix phases
        #[arg(long, env = "AUTOHEAL_FIX_ATTEMPTS")]
        fix_attempts: Option<u32>,

        /// Do not write a report
        #[arg(long)]
        no_report: bool,
    },

    /// Detect problems without fixing them
    Detect {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Detect problems and apply automatic fixes
    Fix {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Re-run the loop whenever watched files change
    Watch {
        /// Quiet period before a burst of changes triggers a run
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Run tests with coverage and suggest where tests are missing
    Coverage {
        /// Minimum line coverage, in percent
        #[arg(long, env = "AUTOHEAL_COVERAGE_THRESHOLD")]
        threshold: Option<u32>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a stored run report, or list reports when no id is given
    Report {
        run_id: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let mut config = HealConfig::load(&cli.root, cli.config.as_deref())
        .with_context(|| format!("Failed to load configuration for {}", cli.root.display()))?;

    match cli.command {
        Commands::Run {
            max_retries,
            fix_attempts,
            no_report,
        } => {
            if let Some(n) = max_retries {
                config.run.max_retries = n;
            }
            if let Some(n) = fix_attempts {
                config.run.fix_attempts = n;
            }
            cmd_run(&config, no_report).await
        }
        Commands::Detect { format } => cmd_detect(&config, format).await,
        Commands::Fix { format } => cmd_fix(&config, format).await,
        Commands::Watch { debounce_ms } => {
            if let Some(ms) = debounce_ms {
                config.watch.debounce_ms = ms;
            }
            cmd_watch(&config).await
        }
        Commands::Coverage { threshold, format } => {
            if let Some(t) = threshold {
                config.coverage.threshold = t;
            }
            cmd_coverage(&config, format).await
        }
        Commands::Report { run_id, format } => {
            cmd_report(&config.report_dir(), run_id.as_deref(), format)
        }
    }
}

fn process_harness(config: &HealConfig) -> Result<ProcessHarness> {
    ProcessHarness::new(config, Arc::new(ProcessExecutor)).context("Failed to set up test harness")
}

async fn cmd_run(config: &HealConfig, no_report: bool) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let harness: Arc<dyn Harness> = Arc::new(process_harness(config)?);
    let mut orchestrator = Orchestrator::new(harness, config.run)?;
    if !no_report {
        orchestrator = orchestrator.with_sink(Arc::new(FsReportSink::new(config.report_dir())));
    }

    let verdict = orchestrator.run_until(wait_for_shutdown()).await;

    println!("{}", render_verdict_text(&verdict));
    if !no_report {
        println!(
            "Report: {}",
            config.report_dir().join(&verdict.run_id).display()
        );
    }
    Ok(ExitCode::from(verdict.exit_code() as u8))
}

async fn cmd_detect(config: &HealConfig, format: OutputFormat) -> Result<ExitCode> {
    let detector = ProblemDetector::new(config.project.clone(), Arc::new(ProcessExecutor))
        .context("Failed to set up problem detector")?;
    let problems = detector.detect_all().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&problems)?),
        OutputFormat::Text => println!("{}", render_problems_text(&problems)),
    }

    Ok(if problems.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_fix(config: &HealConfig, format: OutputFormat) -> Result<ExitCode> {
    let executor = Arc::new(ProcessExecutor);
    let detector = ProblemDetector::new(config.project.clone(), executor.clone())
        .context("Failed to set up problem detector")?;
    let fixer = AutoFixer::new(config.project.clone(), executor);

    let report = fixer
        .auto_fix(&detector)
        .await
        .context("Auto-fix could not run")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => println!("{}", render_fix_text(&report)),
    }

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_watch(config: &HealConfig) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let harness: Arc<dyn Harness> = Arc::new(process_harness(config)?);
    let sink: Arc<dyn ReportSink> = Arc::new(FsReportSink::new(config.report_dir()));
    let run_config = config.run;
    let (stop_tx, stop_rx) = broadcast::channel(false);

    let trigger = move || {
        let harness = harness.clone();
        let sink = sink.clone();
        let stop = stop_rx.clone();
        async move {
            let orchestrator = match Orchestrator::new(harness, run_config) {
                Ok(o) => o.with_sink(sink),
                Err(e) => {
                    error!(error = %e, "cannot start run");
                    return;
                }
            };
            let verdict = orchestrator.run_until(stopped(stop)).await;
            println!("{}", render_verdict_text(&verdict));
        }
    };

    let shutdown = async move {
        wait_for_shutdown().await;
        if stop_tx.send(true).is_err() {
            warn!("no run listening for shutdown");
        }
    };

    let stats =
        autoheal_core::watch::watch(&config.project.root, &config.watch, trigger, shutdown)
            .await
            .context("Failed to start file watcher")?;
    info!(
        runs_started = stats.runs_started,
        runs_skipped = stats.runs_skipped,
        "watch finished"
    );
    Ok(ExitCode::SUCCESS)
}

async fn cmd_coverage(config: &HealConfig, format: OutputFormat) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let analyzer = CoverageAnalyzer::new(
        config.project.clone(),
        config.coverage.clone(),
        Arc::new(ProcessExecutor),
    );
    let report = analyzer
        .run()
        .await
        .context("Coverage analysis failed")?;

    let path = write_coverage_report(&report, &config.report_dir())
        .context("Failed to write coverage report")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{}", render_coverage_text(&report));
            println!("Report: {}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_report(dir: &Path, run_id: Option<&str>, format: OutputFormat) -> Result<ExitCode> {
    let Some(run_id) = run_id else {
        let ids = list_run_reports(dir)
            .with_context(|| format!("Failed to list reports in {}", dir.display()))?;
        if ids.is_empty() {
            println!("No reports found in {}", dir.display());
        }
        for id in ids {
            println!("{}", id);
        }
        return Ok(ExitCode::SUCCESS);
    };

    let verdict = read_run_report(run_id, dir)
        .with_context(|| format!("Failed to read report for run {}", run_id))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
        OutputFormat::Text => println!("{}", render_verdict_text(&verdict)),
    }
    Ok(ExitCode::SUCCESS)
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("received SIGTERM, stopping");
        }
    }
}

/// Completes once `true` is published, or the sender goes away.
async fn stopped(mut stop: broadcast::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

fn render_verdict_text(verdict: &RunVerdict) -> String {
    let mut out = format!(
        "Run {}: {} ({}, {} round(s), {} fix phase(s), {}ms)\n",
        verdict.run_id,
        if verdict.success { "PASS" } else { "FAIL" },
        verdict.termination,
        verdict.rounds_executed(),
        verdict.fix_phases,
        verdict.duration_ms(),
    );
    for round in &verdict.rounds {
        let status = |suite: SuiteName| match round.suites.iter().find(|s| s.suite == suite) {
            Some(s) if s.is_skipped() => "skipped",
            Some(s) if s.success => "pass",
            Some(_) => "FAIL",
            None => "-",
        };
        out.push_str(&format!(
            "  round {}: backend {} | frontend {}\n",
            round.number,
            status(SuiteName::Backend),
            status(SuiteName::Frontend),
        ));
        for repair in &round.repairs {
            out.push_str(&format!(
                "    repaired {}: {} ({})\n",
                repair.suite,
                if repair.success { "ok" } else { "failed" },
                repair.message,
            ));
        }
    }
    out.trim_end().to_string()
}

fn render_problems_text(problems: &[Problem]) -> String {
    if problems.is_empty() {
        return "No problems detected".to_string();
    }
    let mut out = format!("{} problem(s) detected:\n", problems.len());
    for problem in problems {
        out.push_str(&format!(
            "  [{}] {}\n      fix: {}\n",
            problem.severity, problem.message, problem.fix
        ));
    }
    out.trim_end().to_string()
}

fn render_fix_text(report: &AutoFixReport) -> String {
    let mut out = format!("{}\n", report.summary());
    for outcome in &report.outcomes {
        out.push_str(&format!(
            "  {} {}: {}\n",
            if outcome.fixed { "fixed " } else { "failed" },
            outcome.problem.message,
            outcome.message,
        ));
    }
    out.trim_end().to_string()
}

fn render_coverage_text(report: &CoverageReport) -> String {
    let mut out = format!("Coverage: {}\n", report.summary());
    for suggestion in &report.suggestions {
        out.push_str(&format!("  [{}] {}\n", suggestion.priority, suggestion.message));
    }
    for hint in &report.hints {
        out.push_str(&format!("    {}:{} {}\n", hint.file, hint.line, hint.message));
    }
    out.trim_end().to_string()
}
