//! Re-run the loop when watched files change.
//!
//! File events come from `notify` through a `notify-debouncer-mini`
//! debouncer, which reports a burst of changes once it has been quiet for
//! `debounce_ms`. Each debounced batch is filtered against the watched paths
//! and ignore patterns and forwarded over a channel to [`watch`], where a
//! [`RunGuard`] keeps at most one run in flight. One run is started
//! immediately when watching begins.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::Result;

/// Default quiet period before a burst of changes triggers a run.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Debounced batches waiting for the watch loop.
const CHANGE_BUFFER: usize = 16;

/// Watch trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Files or directories to watch, relative to the project root.
    pub paths: Vec<String>,
    /// Path components whose changes are never reported.
    pub ignore_patterns: Vec<String>,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                "src".to_string(),
                "__tests__".to_string(),
                "package.json".to_string(),
            ],
            ignore_patterns: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "test_reports".to_string(),
                "uploads".to_string(),
            ],
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// Event filtering
// ---------------------------------------------------------------------------

/// Decides whether an event path should trigger a run.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    root: PathBuf,
    watched: Vec<PathBuf>,
    ignored: Vec<String>,
}

impl ChangeFilter {
    pub fn new(root: &Path, config: &WatchConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            watched: config.paths.iter().map(PathBuf::from).collect(),
            ignored: config.ignore_patterns.clone(),
        }
    }

    /// True when `path` lies under a watched entry and no component of it
    /// (relative to the root) is ignored.
    pub fn is_relevant(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        let ignored = relative.components().any(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .map(|name| self.ignored.iter().any(|p| p == name))
                .unwrap_or(false),
            _ => false,
        });
        if ignored {
            return false;
        }

        self.watched.iter().any(|w| relative.starts_with(w))
    }

    /// Relevant paths of a debounced batch, deduplicated.
    pub fn relevant(&self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        let mut kept: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| self.is_relevant(p))
            .collect();
        kept.sort();
        kept.dedup();
        kept
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Debounced file watcher over the configured paths.
///
/// Dropping it stops the underlying `notify` watcher.
pub struct FileWatcher {
    watched: Vec<PathBuf>,
    changes: mpsc::Receiver<Vec<PathBuf>>,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    /// Start watching. Directories are watched recursively; a file is
    /// watched through its parent so replace-on-save editors are seen.
    /// Paths that do not exist yet are skipped.
    pub fn start(root: &Path, config: &WatchConfig) -> Result<Self> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let filter = ChangeFilter::new(&root, config);
        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);

        let mut debouncer = new_debouncer(config.debounce(), move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let changed = filter.relevant(events.into_iter().map(|e| e.path));
                    if changed.is_empty() {
                        return;
                    }
                    if let Err(e) = tx.try_send(changed) {
                        debug!(error = %e, "change batch dropped");
                    }
                }
                Err(e) => warn!(error = %e, "file watch error"),
            }
        })?;

        let mut watched = Vec::new();
        for relative in &config.paths {
            let path = root.join(relative);
            let (target, mode) = if path.is_dir() {
                (path.clone(), RecursiveMode::Recursive)
            } else if path.is_file() {
                match path.parent() {
                    Some(parent) => (parent.to_path_buf(), RecursiveMode::NonRecursive),
                    None => continue,
                }
            } else {
                debug!(path = %path.display(), "watch path missing, skipped");
                continue;
            };
            debouncer.watcher().watch(&target, mode)?;
            watched.push(path);
        }

        Ok(Self {
            watched,
            changes: rx,
            _debouncer: debouncer,
        })
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Next debounced batch of relevant paths. `None` once the watcher is gone.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        self.changes.recv().await
    }
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

/// Single-flight flag: at most one run holds a [`RunPermit`] at a time.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the flag, or `None` if a run is already active.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                active: Arc::clone(&self.active),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Releases the [`RunGuard`] when dropped.
#[derive(Debug)]
pub struct RunPermit {
    active: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Watch loop
// ---------------------------------------------------------------------------

/// Counters reported when watching stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchStats {
    pub runs_started: u64,
    pub runs_skipped: u64,
}

/// Watch `root` until `shutdown` completes, spawning `trigger()` for the
/// initial run and after each debounced batch of changes.
///
/// Fails only if the watcher cannot be set up. A run still in flight at
/// shutdown is awaited before returning.
pub async fn watch<F, Fut, S>(
    root: &Path,
    config: &WatchConfig,
    trigger: F,
    shutdown: S,
) -> Result<WatchStats>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
    S: Future<Output = ()>,
{
    let mut watcher = FileWatcher::start(root, config)?;
    let guard = RunGuard::new();
    let mut stats = WatchStats::default();
    let mut in_flight: Option<JoinHandle<()>> = None;

    info!(
        root = %root.display(),
        paths = watcher.watched_paths().len(),
        debounce_ms = config.debounce_ms,
        "watching for changes"
    );
    start_run(&guard, &trigger, &mut in_flight, &mut stats);

    tokio::pin!(shutdown);
    loop {
        let changed = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            batch = watcher.next_batch() => batch,
        };
        let Some(changed) = changed else {
            warn!("file watcher stopped");
            break;
        };
        debug!(count = changed.len(), paths = ?changed, "files changed");
        start_run(&guard, &trigger, &mut in_flight, &mut stats);
    }

    if let Some(handle) = in_flight.take() {
        if let Err(e) = handle.await {
            warn!(error = %e, "watch-triggered run did not complete");
        }
    }
    info!(
        runs_started = stats.runs_started,
        runs_skipped = stats.runs_skipped,
        "stopped watching"
    );
    Ok(stats)
}

fn start_run<F, Fut>(
    guard: &RunGuard,
    trigger: &F,
    in_flight: &mut Option<JoinHandle<()>>,
    stats: &mut WatchStats,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    match guard.try_acquire() {
        Some(permit) => {
            let run = trigger();
            *in_flight = Some(tokio::spawn(async move {
                let _permit = permit;
                run.await;
            }));
            stats.runs_started += 1;
        }
        None => {
            info!("run already in progress, skipping trigger");
            stats.runs_skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    fn project() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("src/node_modules/x")).unwrap();
        fs::create_dir_all(root.join("uploads")).unwrap();
        fs::write(root.join("src/app.js"), "").unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        (dir, root)
    }

    fn counting_trigger(
        runs: &Arc<AtomicUsize>,
        hold: Duration,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        let runs = runs.clone();
        move || {
            let runs = runs.clone();
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
            })
        }
    }

    fn fast_config() -> WatchConfig {
        WatchConfig {
            debounce_ms: 100,
            ..WatchConfig::default()
        }
    }

    #[test]
    fn test_filter_keeps_watched_and_drops_ignored() {
        let root = PathBuf::from("/work/app");
        let filter = ChangeFilter::new(&root, &WatchConfig::default());

        assert!(filter.is_relevant(&root.join("src/app.js")));
        assert!(filter.is_relevant(&root.join("src/deep/nested/util.js")));
        assert!(filter.is_relevant(&root.join("__tests__/app.test.js")));
        assert!(filter.is_relevant(&root.join("package.json")));

        assert!(!filter.is_relevant(&root.join("src/node_modules/x/index.js")));
        assert!(!filter.is_relevant(&root.join("uploads/file.bin")));
        assert!(!filter.is_relevant(&root.join("README.md")));
        assert!(!filter.is_relevant(&root.join("package.json.bak")));
        assert!(!filter.is_relevant(Path::new("/elsewhere/src/app.js")));
    }

    #[test]
    fn test_filter_dedups_batch() {
        let root = PathBuf::from("/work/app");
        let filter = ChangeFilter::new(&root, &WatchConfig::default());
        let kept = filter.relevant(vec![
            root.join("src/b.js"),
            root.join("src/a.js"),
            root.join("src/b.js"),
            root.join(".git/index"),
        ]);
        assert_eq!(kept, vec![root.join("src/a.js"), root.join("src/b.js")]);
    }

    #[test]
    fn test_run_guard_is_single_flight() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire().expect("first acquire");
        assert!(guard.is_active());
        assert!(guard.clone().try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_active());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_watcher_skips_missing_paths() {
        let (_dir, root) = project();
        let watcher = FileWatcher::start(&root, &fast_config()).expect("watcher");
        assert_eq!(
            watcher.watched_paths(),
            &[root.join("src"), root.join("package.json")]
        );
    }

    #[tokio::test]
    async fn test_watch_runs_initially_and_after_change() {
        let (_dir, root) = project();
        let runs = Arc::new(AtomicUsize::new(0));

        let file = root.join("src/app.js");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            fs::write(&file, "x").unwrap();
            fs::write(&file, "xy").unwrap();
        });

        let stats = watch(
            &root,
            &fast_config(),
            counting_trigger(&runs, Duration::ZERO),
            tokio::time::sleep(Duration::from_millis(1500)),
        )
        .await
        .expect("watch");
        writer.await.unwrap();

        assert!(stats.runs_started >= 2, "stats: {stats:?}");
        assert_eq!(runs.load(Ordering::SeqCst) as u64, stats.runs_started);
    }

    #[tokio::test]
    async fn test_ignored_changes_do_not_trigger() {
        let (_dir, root) = project();
        let runs = Arc::new(AtomicUsize::new(0));

        let ignored = root.join("src/node_modules/x/index.js");
        let unwatched = root.join("uploads/file.bin");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            fs::write(&ignored, "x").unwrap();
            fs::write(&unwatched, "x").unwrap();
        });

        let stats = watch(
            &root,
            &fast_config(),
            counting_trigger(&runs, Duration::ZERO),
            tokio::time::sleep(Duration::from_millis(1200)),
        )
        .await
        .expect("watch");
        writer.await.unwrap();

        assert_eq!(stats.runs_started, 1);
        assert_eq!(stats.runs_skipped, 0);
    }

    #[tokio::test]
    async fn test_change_during_active_run_is_skipped() {
        let (_dir, root) = project();
        let runs = Arc::new(AtomicUsize::new(0));

        let file = root.join("package.json");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            fs::write(&file, r#"{"name":"app"}"#).unwrap();
        });

        let stats = watch(
            &root,
            &fast_config(),
            counting_trigger(&runs, Duration::from_millis(2000)),
            tokio::time::sleep(Duration::from_millis(1200)),
        )
        .await
        .expect("watch");
        writer.await.unwrap();

        assert_eq!(stats.runs_started, 1);
        assert!(stats.runs_skipped >= 1, "stats: {stats:?}");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
