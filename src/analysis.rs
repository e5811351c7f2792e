//! Comprehensive Analysis (§4.11). Summarizes a [`MergedVesselView`] into
//! the aggregate breakdowns the presentation layer needs, replacing the
//! original's `groupby`/`value_counts`/`rolling` idioms with explicit
//! aggregation passes (§9 design note).

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use hashbrown::HashMap;
use itertools::Itertools;
use serde::Serialize;

use crate::model::{FeedId, LocationKind, MergedVesselView, ShipCategory, Status};

#[derive(Debug, Clone, Serialize)]
pub struct DayBucket {
    pub day_start: NaiveDateTime,
    pub arrivals_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RecentActivity {
    pub arrivals_last_24h: usize,
    pub arrivals_last_12h: usize,
    pub arrivals_last_6h: usize,
    pub expected_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveAnalysis {
    pub total_count: usize,
    pub per_source_counts: HashMap<FeedId, usize>,
    pub status_breakdown: HashMap<Status, usize>,
    pub category_breakdown: HashMap<ShipCategory, usize>,
    pub location_breakdown: HashMap<LocationKind, usize>,
    pub per_feed_earliest: HashMap<FeedId, Option<NaiveDateTime>>,
    pub per_feed_latest: HashMap<FeedId, Option<NaiveDateTime>>,
    pub activity_trend: Vec<DayBucket>,
    pub recent_activity: RecentActivity,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Builds the §4.11 summary record. `now` is the reference instant for the
/// activity trend's 7-day window and the recent-activity snapshot,
/// expressed as a naive UTC datetime to compare directly against
/// `event_time`.
pub fn analyze(view: &MergedVesselView, now: NaiveDateTime) -> ComprehensiveAnalysis {
    // Tally breakdowns with itertools' `counts()` rather than four hand-rolled
    // entry-API loops (§9 design note: groupby/value_counts become explicit
    // aggregation passes, but the pass itself is itertools-assisted).
    let per_source_counts: HashMap<_, _> = view.records.iter().map(|r| r.source_feed).counts().into_iter().collect();
    let status_breakdown: HashMap<_, _> = view.records.iter().map(|r| r.status).counts().into_iter().collect();
    let category_breakdown: HashMap<_, _> = view.records.iter().map(|r| r.ship_category).counts().into_iter().collect();
    let location_breakdown: HashMap<_, _> = view.records.iter().map(|r| r.location_kind).counts().into_iter().collect();

    let mut per_feed_earliest: HashMap<FeedId, Option<NaiveDateTime>> = HashMap::new();
    let mut per_feed_latest: HashMap<FeedId, Option<NaiveDateTime>> = HashMap::new();
    let mut recent = RecentActivity::default();

    for record in &view.records {
        if let Some(t) = record.event_time {
            let earliest = per_feed_earliest.entry(record.source_feed).or_insert(None);
            if earliest.is_none_or(|e| t < e) {
                *earliest = Some(t);
            }
            let latest = per_feed_latest.entry(record.source_feed).or_insert(None);
            if latest.is_none_or(|l| t > l) {
                *latest = Some(t);
            }

            // Only vessels currently in port count as "arrivals" (matches the
            // ground-truth `recent_vessels[recent_vessels['status'] == 'in_port']`
            // filter); a departed vessel's old arrival timestamp doesn't.
            if record.status == Status::InPort {
                let age = now.signed_duration_since(t);
                if age >= ChronoDuration::zero() {
                    if age <= ChronoDuration::hours(24) {
                        recent.arrivals_last_24h += 1;
                    }
                    if age <= ChronoDuration::hours(12) {
                        recent.arrivals_last_12h += 1;
                    }
                    if age <= ChronoDuration::hours(6) {
                        recent.arrivals_last_6h += 1;
                    }
                }
            }
        }

        if record.status == Status::Expected || record.status == Status::Arriving {
            recent.expected_count += 1;
        }
    }

    let activity_trend = build_activity_trend(view, now);

    ComprehensiveAnalysis {
        total_count: view.records.len(),
        per_source_counts,
        status_breakdown,
        category_breakdown,
        location_breakdown,
        per_feed_earliest,
        per_feed_latest,
        activity_trend,
        recent_activity: recent,
        analysis_timestamp: Utc::now(),
    }
}

/// Seven daily buckets ending today (inclusive), each counting records
/// whose `event_time` falls within that UTC calendar day.
fn build_activity_trend(view: &MergedVesselView, now: NaiveDateTime) -> Vec<DayBucket> {
    let today = now.date();
    let mut buckets: Vec<DayBucket> = (0..7)
        .rev()
        .map(|days_ago| DayBucket {
            day_start: (today - ChronoDuration::days(days_ago)).and_hms_opt(0, 0, 0).expect("midnight is always valid"),
            arrivals_count: 0,
        })
        .collect();

    for record in &view.records {
        let Some(t) = record.event_time else { continue };
        let day = t.date().and_hms_opt(0, 0, 0).expect("midnight is always valid");
        if let Some(bucket) = buckets.iter_mut().find(|b| b.day_start == day) {
            bucket.arrivals_count += 1;
        }
    }

    buckets
}
