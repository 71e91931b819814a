// Temp-file lifecycle: startup sweep and deferred deletion

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::storage::{remove_quietly, Storage};

/// Default time an artifact survives after delivery.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(120);

/// Remove every `file_*.mp4` / `file_*.mp3` left by a previous run.
///
/// Best effort: listing or removal failures are logged and ignored.
pub fn sweep_startup(storage: &Storage) -> usize {
    let files = match storage.temp_files() {
        Ok(files) => files,
        Err(e) => {
            debug!(root = %storage.root().display(), error = %e, "startup sweep skipped");
            return 0;
        }
    };

    let removed = files.iter().filter(|p| remove_quietly(p)).count();
    if removed > 0 {
        info!(removed, root = %storage.root().display(), "removed leftover temp files");
    }
    removed
}

/// Deferred, non-cancellable deletion of delivered artifacts.
///
/// Each scheduled path gets its own timer task on the tokio runtime, so the
/// caller returns immediately. Timers read tokio's clock, which tests can
/// pause and advance. Pending deletions are kept in a registry that can be
/// inspected with [`CleanupScheduler::pending`].
#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    delay: Duration,
    registry: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    settled: Arc<Notify>,
}

impl CleanupScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            registry: Arc::new(Mutex::new(HashMap::new())),
            settled: Arc::new(Notify::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delete `path` once the configured delay elapses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, path: PathBuf) -> JoinHandle<bool> {
        self.schedule_in(path, self.delay)
    }

    /// Delete `path` after `delay`. The handle resolves to whether a file was
    /// actually removed; a file already gone is not an error.
    pub fn schedule_in(&self, path: PathBuf, delay: Duration) -> JoinHandle<bool> {
        let deadline = Instant::now() + delay;
        self.lock().insert(path.clone(), deadline);
        debug!(path = %path.display(), delay_secs = delay.as_secs(), "deletion scheduled");

        let registry = Arc::clone(&self.registry);
        let settled = Arc::clone(&self.settled);
        tokio::spawn(async move {
            sleep_until(deadline).await;
            let removed = remove_quietly(&path);
            {
                let mut pending = registry.lock().unwrap_or_else(|e| e.into_inner());
                if pending.get(&path) == Some(&deadline) {
                    pending.remove(&path);
                }
            }
            settled.notify_waiters();
            debug!(path = %path.display(), removed, "scheduled deletion fired");
            removed
        })
    }

    /// Paths still waiting for their timer, sorted.
    pub fn pending(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Wait until every scheduled deletion has fired.
    ///
    /// A short-lived process calls this before exiting; the timer tasks die
    /// with the runtime otherwise.
    pub async fn drain(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// When `path` is due for deletion, if it is scheduled.
    pub fn deadline(&self, path: &Path) -> Option<Instant> {
        self.lock().get(path).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Instant>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CleanupScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn sweep_removes_only_temp_artifacts() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        fs::write(dir.path().join("file_abc12345.mp4"), b"x").unwrap();
        fs::write(dir.path().join("file_def67890.mp3"), b"x").unwrap();
        fs::write(dir.path().join("file_def67890.webm"), b"x").unwrap();
        fs::write(dir.path().join("notes.mp4"), b"x").unwrap();

        assert_eq!(sweep_startup(&storage), 2);
        assert!(!dir.path().join("file_abc12345.mp4").exists());
        assert!(!dir.path().join("file_def67890.mp3").exists());
        assert!(dir.path().join("file_def67890.webm").exists());
        assert!(dir.path().join("notes.mp4").exists());
    }

    #[test]
    fn sweep_of_missing_directory_is_quiet() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("gone"));
        assert_eq!(sweep_startup(&storage), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_fires_after_delay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file_abc12345.mp4");
        fs::write(&path, b"x").unwrap();

        let scheduler = CleanupScheduler::default();
        let handle = scheduler.schedule(path.clone());
        assert_eq!(scheduler.pending(), vec![path.clone()]);

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert!(path.exists());

        assert!(handle.await.unwrap());
        assert!(!path.exists());
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_of_absent_file_does_not_fail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file_abc12345.mp3");

        let scheduler = CleanupScheduler::new(Duration::from_secs(5));
        let first = scheduler.schedule(path.clone());
        assert!(!first.await.unwrap());
        let second = scheduler.schedule(path);
        assert!(!second.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_every_deletion() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("file_aaaa1111.mp3");
        let second = dir.path().join("file_bbbb2222.mp4");
        fs::write(&first, b"x").unwrap();
        fs::write(&second, b"x").unwrap();

        let scheduler = CleanupScheduler::default();
        let start = Instant::now();
        let _ = scheduler.schedule(first.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        let _ = scheduler.schedule(second.clone());

        scheduler.drain().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(150), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(151), "{:?}", elapsed);
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_without_pending_returns_at_once() {
        let scheduler = CleanupScheduler::default();
        let start = Instant::now();
        scheduler.drain().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_recorded() {
        let scheduler = CleanupScheduler::new(Duration::from_secs(30));
        let path = PathBuf::from("/nonexistent/file_abc12345.mp4");
        let before = Instant::now();
        let _handle = scheduler.schedule(path.clone());
        assert_eq!(scheduler.deadline(&path), Some(before + Duration::from_secs(30)));
    }
}
