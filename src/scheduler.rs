//! Periodic Scheduler (H, §4.8). Invokes a supplied callback at a fixed
//! interval, skipping a tick outright if the previous invocation has not
//! completed rather than letting backlog queue up.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Tick = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Runs `tick` every `interval`. Overlap policy: if the prior tick is still
/// running when the next one is due, the new one is skipped entirely.
pub struct PeriodicScheduler {
    interval: Duration,
    tick: Tick,
    busy: Arc<AtomicBool>,
    token: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicScheduler {
    pub fn new<F, Fut>(interval: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            interval,
            tick: Arc::new(move || Box::pin(tick())),
            busy: Arc::new(AtomicBool::new(false)),
            token: CancellationToken::new(),
            task: std::sync::Mutex::new(None),
        }
    }

    /// Starts the background ticking task. If `run_immediately` is true,
    /// runs one tick before the first interval elapses.
    pub fn start(self: &Arc<Self>, run_immediately: bool) {
        let mut task_slot = self.task.lock().expect("scheduler lock poisoned");
        if task_slot.is_some() {
            return;
        }

        let this = self.clone();
        *task_slot = Some(tokio::spawn(async move {
            if run_immediately {
                this.run_tick_if_free().await;
            }

            let mut ticker = tokio::time::interval(this.interval);
            ticker.tick().await; // first tick fires immediately; consume it
            loop {
                tokio::select! {
                    _ = this.token.cancelled() => break,
                    _ = ticker.tick() => this.run_tick_if_free().await,
                }
            }
        }));
    }

    async fn run_tick_if_free(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            warn!("scheduler tick skipped: previous tick still running");
            return;
        }
        debug!("scheduler tick starting");
        (self.tick)().await;
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Signals the background task to stop and waits for it (and any
    /// in-flight tick) to finish before returning.
    pub async fn stop(&self) {
        self.token.cancel();
        let task = self.task.lock().expect("scheduler lock poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn run_immediately_fires_before_first_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let scheduler = Arc::new(PeriodicScheduler::new(Duration::from_secs(300), move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }));

        scheduler.start(true);
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_tick_does_not_overlap_with_itself() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let c1 = concurrent.clone();
        let m1 = max_concurrent.clone();

        let scheduler = Arc::new(PeriodicScheduler::new(Duration::from_millis(5), move || {
            let concurrent = c1.clone();
            let max_concurrent = m1.clone();
            async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }
        }));

        scheduler.start(true);
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop().await;
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }
}
