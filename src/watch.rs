//! Watch mode: regenerate templates as they change on disk.
//!
//! Events are debounced per file. Every event bumps the file's version, and
//! a regeneration only writes its output if the version it started with is
//! still current when it finishes.

use crate::batch::{self, BatchError, BatchOptions, FileOutcome};
use notify::{EventKind, RecursiveMode, Watcher};
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_DEBOUNCE_MS: u64 = 100;
const IDLE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("filesystem watch failed: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl From<rayon::ThreadPoolBuildError> for WatchError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        WatchError::Batch(BatchError::Pool(err))
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

/// Latest version per file, shared with the workers
#[derive(Debug, Clone, Default)]
pub struct Versions(Arc<Mutex<HashMap<PathBuf, u64>>>);

impl Versions {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, u64>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bump and return the new version
    pub fn bump(&self, path: &Path) -> u64 {
        let mut versions = self.lock();
        let version = versions.entry(path.to_path_buf()).or_insert(0);
        *version += 1;
        *version
    }

    pub fn current(&self, path: &Path) -> u64 {
        self.lock().get(path).copied().unwrap_or(0)
    }

    /// Run `f` only if `version` is still current. The table stays locked
    /// while `f` runs, so a newer event cannot slip in between.
    pub fn if_current<T>(&self, path: &Path, version: u64, f: impl FnOnce() -> T) -> Option<T> {
        let versions = self.lock();
        if versions.get(path).copied().unwrap_or(0) != version {
            return None;
        }
        let out = f();
        drop(versions);
        Some(out)
    }
}

/// Per-file debounce deadlines
#[derive(Debug, Default)]
pub struct DebounceQueue {
    deadlines: HashMap<PathBuf, Instant>,
}

impl DebounceQueue {
    /// (Re)start the debounce window for `path`
    pub fn touch(&mut self, path: PathBuf, now: Instant, debounce: Duration) {
        self.deadlines.insert(path, now + debounce);
    }

    /// Time until the earliest deadline
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.deadlines.values().min().map(|d| d.saturating_duration_since(now))
    }

    /// Remove and return every file whose window has closed, sorted
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.deadlines.remove(path);
        }
        due.sort();
        due
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Watch `root` until the watcher shuts down, calling `on_outcome` after every
/// regeneration that was not superseded.
pub fn watch(
    root: &Path,
    options: &BatchOptions,
    config: &WatchConfig,
    mut on_outcome: impl FnMut(Result<FileOutcome, BatchError>),
) -> Result<(), WatchError> {
    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = event_tx.send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    tracing::info!(path = %root.display(), debounce_ms = config.debounce.as_millis() as u64, "watching");

    let pool = ThreadPoolBuilder::new().num_threads(options.workers.max(1)).build()?;
    let versions = Versions::default();
    let mut queue = DebounceQueue::default();
    let (done_tx, done_rx) = mpsc::channel();

    loop {
        let timeout = queue.next_timeout(Instant::now()).unwrap_or(IDLE_POLL);
        match event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) if is_change(&event.kind) => {
                for path in event.paths.into_iter().filter(|p| batch::is_template(p)) {
                    tracing::debug!(path = %path.display(), "change detected");
                    versions.bump(&path);
                    queue.touch(path, Instant::now(), config.debounce);
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "filesystem watch error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        for path in queue.take_due(Instant::now()) {
            let version = versions.current(&path);
            let versions = versions.clone();
            let done_tx = done_tx.clone();
            let options = options.clone();
            pool.spawn(move || {
                let outcome = match batch::compile_file(&path, &options) {
                    Ok(compiled) => versions.if_current(&path, version, || compiled.write(&options)),
                    Err(err) => Some(Err(err)),
                };
                match outcome {
                    Some(outcome) => {
                        let _ = done_tx.send(outcome);
                    }
                    None => tracing::debug!(path = %path.display(), version, "superseded, output discarded"),
                }
            });
        }

        while let Ok(outcome) = done_rx.try_recv() {
            on_outcome(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_restarts_window() {
        let mut queue = DebounceQueue::default();
        let start = Instant::now();
        let debounce = Duration::from_millis(100);
        let path = PathBuf::from("a.templ");

        queue.touch(path.clone(), start, debounce);
        queue.touch(path.clone(), start + Duration::from_millis(80), debounce);

        assert!(queue.take_due(start + Duration::from_millis(120)).is_empty());
        assert_eq!(queue.take_due(start + Duration::from_millis(180)), vec![path]);
        assert!(queue.next_timeout(start).is_none());
    }

    #[test]
    fn test_superseded_version_is_discarded() {
        let versions = Versions::default();
        let path = Path::new("a.templ");
        let first = versions.bump(path);
        let second = versions.bump(path);

        assert_eq!(versions.if_current(path, first, || "stale"), None);
        assert_eq!(versions.if_current(path, second, || "fresh"), Some("fresh"));
    }
}
