//! Real-Time Manager (J, §4.10). Owns the TTL cache, file watcher,
//! scheduler, and circuit breaker; runs the update loop; exposes the public
//! read API consumed by a presentation layer (out of scope for this core).

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use hashbrown::HashMap as HHashMap;
use tracing::{error, info, info_span, warn, Instrument};

use crate::analysis::{analyze, ComprehensiveAnalysis};
use crate::breaker::{BreakerState, CircuitBreaker};
use crate::cache::TtlCache;
use crate::config::VesselCoreConfig;
use crate::crossref::{cross_reference, CrossReferenceReport};
use crate::loader::{load_all, WatchedFeeds};
use crate::model::{FeedFrame, FeedId, HistoricalThroughputPoint, MergedVesselView};
use crate::scheduler::PeriodicScheduler;
use crate::throughput::load_throughput;
use crate::validate::{
    container_freshness, validate_throughput, validate_vessel_frame, vessel_freshness, Freshness, FreshnessThresholds,
    ThroughputValidation, VesselValidation,
};
use crate::watcher::FileWatcher;

const OP_VESSEL_UPDATE: &str = "vessel_update";
const KEY_MERGED: &str = "merged_view";
const KEY_ANALYSIS: &str = "analysis";
const KEY_THROUGHPUT: &str = "throughput";
const KEY_CROSSREF: &str = "cross_reference";

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ManagerStatus {
    pub vessel_update_breaker: BreakerStateDto,
    pub last_successful_update: Option<chrono::DateTime<Utc>>,
    pub last_successful_update_human: Option<String>,
    pub last_failed_update: Option<chrono::DateTime<Utc>>,
    pub cache_stats: crate::cache::CacheStats,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub enum BreakerStateDto {
    Closed,
    Open,
    HalfOpen,
}

impl From<BreakerState> for BreakerStateDto {
    fn from(s: BreakerState) -> Self {
        match s {
            BreakerState::Closed => BreakerStateDto::Closed,
            BreakerState::Open => BreakerStateDto::Open,
            BreakerState::HalfOpen => BreakerStateDto::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DataQualityReport {
    pub per_feed: HHashMap<FeedId, VesselValidation>,
    pub throughput: Option<ThroughputValidation>,
    pub per_feed_freshness: HHashMap<FeedId, Freshness>,
    pub merged_view_freshness: Option<Freshness>,
    pub throughput_freshness: Option<Freshness>,
}

struct Callbacks {
    by_type: Mutex<HHashMap<String, Vec<Callback>>>,
}

impl Callbacks {
    fn new() -> Self {
        Self { by_type: Mutex::new(HHashMap::new()) }
    }

    fn register(&self, data_type: &str, callback: Callback) {
        self.by_type.lock().expect("callback lock poisoned").entry(data_type.to_string()).or_default().push(callback);
    }

    /// Fires every callback registered for `data_type`, in registration
    /// order. A panicking callback is caught and logged; it never aborts
    /// the remaining callbacks or the update loop (§7 CallbackError).
    fn fire(&self, data_type: &str) {
        let callbacks = self.by_type.lock().expect("callback lock poisoned").get(data_type).cloned().unwrap_or_default();
        for callback in callbacks {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                let message = panic_message(&panic);
                error!(data_type, message, "callback panicked");
            }
        }
    }
}

/// Owns F/G/H/I (§4.10) and runs the real-time vessel data update loop.
pub struct RealTimeManager {
    config: VesselCoreConfig,
    frame_cache: TtlCache<FeedId, FeedFrame>,
    merged_cache: TtlCache<&'static str, MergedVesselView>,
    analysis_cache: TtlCache<&'static str, ComprehensiveAnalysis>,
    throughput_cache: TtlCache<&'static str, Vec<HistoricalThroughputPoint>>,
    crossref_cache: TtlCache<&'static str, CrossReferenceReport>,
    breaker: CircuitBreaker,
    watcher: Arc<FileWatcher>,
    scheduler: Mutex<Option<Arc<PeriodicScheduler>>>,
    callbacks: Callbacks,
    last_successful_update: Mutex<Option<chrono::DateTime<Utc>>>,
    last_failed_update: Mutex<Option<chrono::DateTime<Utc>>>,
    freshness_thresholds: FreshnessThresholds,
    run_gate: RunGate,
}

/// Coalesces the scheduler tick and every watcher callback onto a single
/// in-flight update cycle (§5 "Two update cycles never overlap"; §4.10
/// "watcher events coalesce to a single pending run"). A trigger that
/// arrives while a cycle is already running just sets `pending`, which
/// causes exactly one more cycle to run immediately after the current one
/// finishes rather than spawning a concurrent cycle of its own.
struct RunGate {
    state: Mutex<RunGateState>,
    idle: tokio::sync::Notify,
}

struct RunGateState {
    running: bool,
    pending: bool,
}

impl RunGate {
    fn new() -> Self {
        Self { state: Mutex::new(RunGateState { running: false, pending: false }), idle: tokio::sync::Notify::new() }
    }
}

impl RealTimeManager {
    pub fn new(config: VesselCoreConfig) -> Arc<Self> {
        let ttl = Duration::from_secs(config.cache_default_ttl_s);
        let watcher = Arc::new(FileWatcher::new(Duration::from_secs(config.file_poll_interval_s)));
        let freshness_thresholds = FreshnessThresholds::from_config(&config);

        Arc::new(Self {
            frame_cache: TtlCache::new(ttl),
            merged_cache: TtlCache::new(ttl),
            analysis_cache: TtlCache::new(ttl),
            throughput_cache: TtlCache::new(ttl),
            crossref_cache: TtlCache::new(ttl),
            breaker: CircuitBreaker::new(config.breaker_threshold, Duration::from_secs(config.breaker_reset_interval_s)),
            watcher,
            scheduler: Mutex::new(None),
            callbacks: Callbacks::new(),
            last_successful_update: Mutex::new(None),
            last_failed_update: Mutex::new(None),
            freshness_thresholds,
            run_gate: RunGate::new(),
            config,
        })
    }

    fn watched_feeds(&self) -> WatchedFeeds {
        WatchedFeeds(self.config.watched_feeds.as_map())
    }

    /// Registers a callback invoked after a successful cache update for
    /// `data_type` (one of `"merged_view"`, `"analysis"`, `"throughput"`,
    /// `"cross_reference"`).
    pub fn register_callback(&self, data_type: &str, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.register(data_type, Arc::new(callback));
    }

    /// Starts the file watcher (G) and periodic scheduler (H). Idempotent.
    pub async fn start(self: &Arc<Self>) {
        if self.config.enable_file_monitoring {
            for path in self.watched_feeds().0.values().cloned().collect::<Vec<_>>() {
                let this = self.clone();
                if self.config.auto_reload_on_file_change {
                    self.watcher
                        .register(path, move |changed| {
                            info!(path = %changed.display(), "watched feed changed, triggering update");
                            this.request_update();
                        })
                        .await;
                }
            }

            // A change to the historical-throughput file only invalidates its
            // own cache entry; it never triggers the vessel update loop.
            if let Some(path) = self.config.historical_throughput_path.clone() {
                let this = self.clone();
                self.watcher
                    .register(path, move |changed| {
                        info!(path = %changed.display(), "historical throughput file changed, invalidating cache");
                        this.throughput_cache.invalidate(&KEY_THROUGHPUT);
                    })
                    .await;
            }

            self.watcher.start_all().await;
        }

        let mut scheduler_slot = self.scheduler.lock().expect("scheduler slot poisoned");
        if scheduler_slot.is_none() {
            let this = self.clone();
            let scheduler = Arc::new(PeriodicScheduler::new(Duration::from_secs(self.config.vessel_update_interval_s), move || {
                let this = this.clone();
                async move { this.request_update() }
            }));
            scheduler.start(true);
            *scheduler_slot = Some(scheduler);
        }
    }

    /// Requests an update cycle, coalescing with any cycle already in
    /// flight. Called synchronously from both the scheduler tick and every
    /// watcher callback — neither source ever spawns a concurrent cycle of
    /// its own; a trigger arriving mid-cycle is folded into a single
    /// re-run once the in-flight cycle completes.
    fn request_update(self: &Arc<Self>) {
        let mut state = self.run_gate.state.lock().expect("run gate lock poisoned");
        if state.running {
            state.pending = true;
            return;
        }
        state.running = true;
        drop(state);

        let this = self.clone();
        tokio::spawn(async move { this.drive_update_cycles().await });
    }

    /// Runs update cycles until a cycle completes with no further run
    /// requested while it was in flight, then marks the gate idle.
    async fn drive_update_cycles(self: &Arc<Self>) {
        loop {
            self.run_update_cycle().await;

            let mut state = self.run_gate.state.lock().expect("run gate lock poisoned");
            if state.pending {
                state.pending = false;
                drop(state);
                continue;
            }
            state.running = false;
            drop(state);
            self.run_gate.idle.notify_waiters();
            break;
        }
    }

    /// Stops the watcher and scheduler. Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        self.watcher.stop_all().await;
        let scheduler = self.scheduler.lock().expect("scheduler slot poisoned").take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
    }

    /// The §4.10 update loop, steps 1-7.
    async fn run_update_cycle(self: &Arc<Self>) {
        let span = info_span!("vessel_update_cycle");
        async move {
            if self.breaker.is_open(OP_VESSEL_UPDATE) {
                tracing::debug!("vessel_update breaker open, skipping cycle");
                return;
            }

            let timeout = Duration::from_secs(self.config.file_read_timeout_s);
            let frames = match load_all(&self.watched_feeds(), timeout).await {
                Ok(frames) => frames,
                Err(err) => {
                    warn!(error = %err, "feed load failed");
                    self.breaker.record_failure(OP_VESSEL_UPDATE);
                    *self.last_failed_update.lock().expect("update time lock poisoned") = Some(Utc::now());
                    return;
                }
            };

            let mut valid_frames = Vec::with_capacity(frames.len());
            for (feed_id, frame) in frames {
                let validation = validate_vessel_frame(&frame);
                if validation.valid {
                    self.frame_cache.set(feed_id, frame.clone());
                    valid_frames.push(frame);
                } else {
                    warn!(feed = %feed_id, message = ?validation.message, "frame failed validation, not cached");
                }
            }

            let merged = crate::merge::merge(valid_frames);
            let analysis = analyze(&merged, Utc::now().naive_utc());
            self.merged_cache.set(KEY_MERGED, merged);
            self.analysis_cache.set(KEY_ANALYSIS, analysis);
            self.callbacks.fire(KEY_MERGED);
            self.callbacks.fire(KEY_ANALYSIS);

            self.run_cross_reference_best_effort().await;

            self.breaker.record_success(OP_VESSEL_UPDATE);
            *self.last_successful_update.lock().expect("update time lock poisoned") = Some(Utc::now());
        }
        .instrument(span)
        .await
    }

    /// Step 5: best-effort cross-reference against cached historical
    /// throughput. Failures here are logged and do NOT affect the breaker.
    async fn run_cross_reference_best_effort(self: &Arc<Self>) {
        let Some(path) = &self.config.historical_throughput_path else { return };

        let throughput = match self.throughput_cache.get(&KEY_THROUGHPUT, None) {
            Some(cached) => cached,
            None => match load_throughput(path).await {
                Ok(points) => {
                    self.throughput_cache.set(KEY_THROUGHPUT, points.clone());
                    self.callbacks.fire(KEY_THROUGHPUT);
                    Arc::new(points)
                }
                Err(err) => {
                    warn!(error = %err, "historical throughput load failed, skipping cross-reference");
                    return;
                }
            },
        };

        let Some(merged) = self.merged_cache.get(&KEY_MERGED, None) else { return };
        let observed = observed_daily_vessels_by_month(&merged);
        let report = cross_reference(&throughput, &observed, self.config.avg_teu_per_ship, self.config.cross_ref_deviation_threshold_pct);
        self.crossref_cache.set(KEY_CROSSREF, report);
        self.callbacks.fire(KEY_CROSSREF);
    }

    pub fn get_merged_view(&self, max_age: Option<Duration>) -> Option<Arc<MergedVesselView>> {
        self.merged_cache.get(&KEY_MERGED, max_age)
    }

    pub fn get_frame(&self, source_feed: FeedId, max_age: Option<Duration>) -> Option<Arc<FeedFrame>> {
        self.frame_cache.get(&source_feed, max_age)
    }

    pub fn get_comprehensive_analysis(&self) -> Option<Arc<ComprehensiveAnalysis>> {
        self.analysis_cache.get(&KEY_ANALYSIS, None)
    }

    pub fn get_cross_reference_report(&self) -> Option<Arc<CrossReferenceReport>> {
        self.crossref_cache.get(&KEY_CROSSREF, None)
    }

    pub fn status(&self) -> ManagerStatus {
        let last_successful_update = *self.last_successful_update.lock().expect("update time lock poisoned");
        let last_successful_update_human = last_successful_update.map(|at| {
            chrono_humanize::HumanTime::from(at).to_text_en(chrono_humanize::Accuracy::Rough, chrono_humanize::Tense::Past)
        });

        ManagerStatus {
            vessel_update_breaker: self.breaker.state(OP_VESSEL_UPDATE).into(),
            last_successful_update,
            last_successful_update_human,
            last_failed_update: *self.last_failed_update.lock().expect("update time lock poisoned"),
            cache_stats: self.merged_cache.stats(),
        }
    }

    pub fn data_quality_report(&self) -> DataQualityReport {
        let mut per_feed = HHashMap::new();
        let mut per_feed_freshness = HHashMap::new();
        for id in FeedId::ALL {
            if let Some(frame) = self.frame_cache.get(&id, None) {
                per_feed.insert(id, validate_vessel_frame(&frame));
                per_feed_freshness.insert(id, vessel_freshness(frame.loaded_at, &self.freshness_thresholds));
            }
        }

        let merged_view_freshness =
            self.merged_cache.inserted_at(&KEY_MERGED).map(|at| vessel_freshness(at, &self.freshness_thresholds));

        let throughput = self.throughput_cache.get(&KEY_THROUGHPUT, None).map(|points| validate_throughput(&points));
        let throughput_freshness =
            self.throughput_cache.inserted_at(&KEY_THROUGHPUT).map(|at| container_freshness(at, &self.freshness_thresholds));

        DataQualityReport { per_feed, throughput, per_feed_freshness, merged_view_freshness, throughput_freshness }
    }

    /// Triggers an out-of-band update cycle immediately, bypassing the
    /// scheduler's interval (used by tests and manual refresh requests),
    /// coalescing with any cycle already in flight via the same gate the
    /// scheduler and watcher use, and waits for it to finish.
    pub async fn trigger_update(self: &Arc<Self>) {
        self.request_update();
        loop {
            let idle = self.run_gate.idle.notified();
            if !self.run_gate.state.lock().expect("run gate lock poisoned").running {
                break;
            }
            idle.await;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload.downcast_ref::<&str>().copied().or_else(|| payload.downcast_ref::<String>().map(String::as_str)).unwrap_or("non-string panic payload")
}

/// Average vessels observed per day, grouped by `YYYY-MM`, approximated as
/// `records_in_month / distinct_calendar_days_with_activity_in_month`.
fn observed_daily_vessels_by_month(view: &MergedVesselView) -> hashbrown::HashMap<String, f64> {
    let mut counts: HHashMap<String, usize> = HHashMap::new();
    let mut days: HHashMap<String, hashbrown::HashSet<chrono::NaiveDate>> = HHashMap::new();

    for record in &view.records {
        let Some(t) = record.event_time else { continue };
        let month = t.format("%Y-%m").to_string();
        *counts.entry(month.clone()).or_insert(0) += 1;
        days.entry(month).or_default().insert(t.date());
    }

    counts
        .into_iter()
        .map(|(month, count)| {
            let distinct_days = days.get(&month).map(|d| d.len()).unwrap_or(1).max(1);
            (month, count as f64 / distinct_days as f64)
        })
        .collect()
}
