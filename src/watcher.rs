//! File Watcher (G, §4.7). Polls a set of watched paths for mtime/size/hash
//! changes and invokes registered callbacks, using `tokio::time::interval`
//! and a `CancellationToken` for shutdown (§5, §10 ambient stack).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    mtime: Option<SystemTime>,
    size: u64,
    hash: u64,
}

async fn observe(path: &PathBuf) -> Option<Observation> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let mtime = metadata.modified().ok();
    let size = metadata.len();
    let contents = tokio::fs::read(path).await.ok()?;
    let mut hasher = DefaultHasher::new();
    contents.hash(&mut hasher);
    Some(Observation { mtime, size, hash: hasher.finish() })
}

type Callback = Arc<dyn Fn(&PathBuf) + Send + Sync>;

struct Watched {
    path: PathBuf,
    last: Option<Observation>,
    callbacks: Vec<Callback>,
}

/// Polls a fixed set of paths on an interval, firing registered callbacks
/// when a change is detected. The first observation of any path is a
/// baseline capture only — it never fires a callback.
pub struct FileWatcher {
    poll_interval: Duration,
    watched: Arc<Mutex<Vec<Watched>>>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval, watched: Arc::new(Mutex::new(Vec::new())), token: CancellationToken::new(), task: Mutex::new(None) }
    }

    /// Registers a callback for changes to `path`. Multiple callbacks for
    /// the same path fire in registration order.
    pub async fn register(&self, path: PathBuf, callback: impl Fn(&PathBuf) + Send + Sync + 'static) {
        let mut watched = self.watched.lock().await;
        if let Some(entry) = watched.iter_mut().find(|w| w.path == path) {
            entry.callbacks.push(Arc::new(callback));
        } else {
            watched.push(Watched { path, last: None, callbacks: vec![Arc::new(callback)] });
        }
    }

    /// Begins polling on a background task. Idempotent: calling twice while
    /// already running is a no-op.
    pub async fn start_all(self: &Arc<Self>) {
        let mut task_slot = self.task.lock().await;
        if task_slot.is_some() {
            return;
        }

        let this = self.clone();
        *task_slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.poll_interval);
            loop {
                tokio::select! {
                    _ = this.token.cancelled() => break,
                    _ = ticker.tick() => this.poll_once().await,
                }
            }
        }));
    }

    async fn poll_once(&self) {
        let mut watched = self.watched.lock().await;
        for entry in watched.iter_mut() {
            let current = observe(&entry.path).await;
            match (&entry.last, &current) {
                (None, _) => {
                    trace!(path = %entry.path.display(), "file watcher baseline capture");
                }
                (Some(prev), Some(now)) if prev != now => {
                    debug!(path = %entry.path.display(), "file change detected");
                    for callback in &entry.callbacks {
                        callback(&entry.path);
                    }
                }
                (Some(_), None) => {
                    warn!(path = %entry.path.display(), "watched file disappeared");
                }
                _ => {}
            }
            entry.last = current;
        }
    }

    /// Stops polling and waits for the in-flight poll (and its callbacks)
    /// to finish before returning.
    pub async fn stop_all(&self) {
        self.token.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn first_observation_does_not_fire_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "v1").unwrap();

        let watcher = Arc::new(FileWatcher::new(Duration::from_millis(20)));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        watcher.register(path.clone(), move |_| { fired_clone.fetch_add(1, Ordering::SeqCst); }).await;

        watcher.poll_once().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn content_change_fires_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "v1").unwrap();

        let watcher = Arc::new(FileWatcher::new(Duration::from_millis(20)));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        watcher.register(path.clone(), move |_| { fired_clone.fetch_add(1, Ordering::SeqCst); }).await;

        watcher.poll_once().await;
        std::fs::write(&path, "v2 different length").unwrap();
        watcher.poll_once().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unchanged_file_does_not_refire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "stable").unwrap();

        let watcher = Arc::new(FileWatcher::new(Duration::from_millis(20)));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        watcher.register(path.clone(), move |_| { fired_clone.fetch_add(1, Ordering::SeqCst); }).await;

        watcher.poll_once().await;
        watcher.poll_once().await;
        watcher.poll_once().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_all_then_stop_all_completes() {
        let watcher = Arc::new(FileWatcher::new(Duration::from_millis(10)));
        watcher.start_all().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        watcher.stop_all().await;
    }
}
