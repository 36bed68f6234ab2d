//! Global atomic counters for autoheal runs.
//!
//! Counters are bumped at the call site. Call [`Metrics::flush`] to emit the
//! current values as a single `tracing::info!` event (end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no allocations and no locking.
pub struct Metrics {
    suite_runs: AtomicU64,
    fix_phases: AtomicU64,
    problems_detected: AtomicU64,
    fixes_applied: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            suite_runs: AtomicU64::new(0),
            fix_phases: AtomicU64::new(0),
            problems_detected: AtomicU64::new(0),
            fixes_applied: AtomicU64::new(0),
        }
    }

    pub fn inc_suite_runs(&self) {
        self.suite_runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "suite_runs", "counter incremented");
    }

    pub fn inc_fix_phases(&self) {
        self.fix_phases.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fix_phases", "counter incremented");
    }

    pub fn add_problems_detected(&self, n: u64) {
        self.problems_detected.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "problems_detected", n, "counter incremented");
    }

    pub fn inc_fixes_applied(&self) {
        self.fixes_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fixes_applied", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            suite_runs = self.suite_runs(),
            fix_phases = self.fix_phases(),
            problems_detected = self.problems_detected(),
            fixes_applied = self.fixes_applied(),
        );
    }

    pub fn suite_runs(&self) -> u64 {
        self.suite_runs.load(Ordering::Relaxed)
    }

    pub fn fix_phases(&self) -> u64 {
        self.fix_phases.load(Ordering::Relaxed)
    }

    pub fn problems_detected(&self) -> u64 {
        self.problems_detected.load(Ordering::Relaxed)
    }

    pub fn fixes_applied(&self) -> u64 {
        self.fixes_applied.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.suite_runs.store(0, Ordering::Relaxed);
        self.fix_phases.store(0, Ordering::Relaxed);
        self.problems_detected.store(0, Ordering::Relaxed);
        self.fixes_applied.store(0, Ordering::Relaxed);
    }
}
