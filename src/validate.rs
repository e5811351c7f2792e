//! Validator & Anomaly Detector (K, §4.12). Per-dataset quality checks:
//! completeness, consistency, IQR outliers, duplicate detection, and
//! freshness categorization.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use serde::Serialize;

use crate::model::{FeedFrame, HistoricalThroughputPoint};

#[derive(Debug, Clone, Serialize)]
pub struct VesselValidation {
    pub records_count: usize,
    pub unique_vessels: usize,
    pub date_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub missing_values: usize,
    pub completeness_pct: f64,
    pub duplicate_records: usize,
    pub valid: bool,
    pub message: Option<String>,
}

/// Validates one feed frame per §4.12. `valid=false` if required columns
/// (`vessel_name`, `event_time`) are missing from every record, if all
/// `event_time` are null, or if the frame is empty.
pub fn validate_vessel_frame(frame: &FeedFrame) -> VesselValidation {
    let records_count = frame.records.len();

    if records_count == 0 {
        return VesselValidation {
            records_count: 0,
            unique_vessels: 0,
            date_range: None,
            missing_values: 0,
            completeness_pct: 0.0,
            duplicate_records: 0,
            valid: false,
            message: Some("frame is empty".to_string()),
        };
    }

    let has_vessel_name = frame.records.iter().any(|r| r.vessel_name.is_some());
    let event_times: Vec<NaiveDateTime> = frame.records.iter().filter_map(|r| r.event_time).collect();
    let has_event_time_column = frame.records.iter().any(|r| r.event_kind.is_some());

    let mut seen = hashbrown::HashSet::new();
    let mut unique_vessels = 0usize;
    let mut duplicate_records = 0usize;
    for record in &frame.records {
        if let Some(key) = record.merge_key() {
            if seen.insert(key) {
                unique_vessels += 1;
            } else {
                duplicate_records += 1;
            }
        } else {
            unique_vessels += 1;
        }
    }

    let total_fields = records_count * 2; // vessel_name, event_time per record
    let missing_values = frame.records.iter().fold(0, |acc, r| {
        acc + usize::from(r.vessel_name.is_none()) + usize::from(r.event_time.is_none())
    });
    let completeness_pct = 100.0 * (1.0 - (missing_values as f64 / total_fields as f64));

    let date_range = if event_times.is_empty() {
        None
    } else {
        let min = *event_times.iter().min().expect("non-empty checked above");
        let max = *event_times.iter().max().expect("non-empty checked above");
        Some((min, max))
    };

    let valid = has_vessel_name && has_event_time_column && !event_times.is_empty();
    let message = if valid {
        None
    } else if !has_vessel_name {
        Some("no record carries a vessel_name".to_string())
    } else if !has_event_time_column {
        Some("no record carries a time field".to_string())
    } else {
        Some("all event_time values are null".to_string())
    };

    VesselValidation { records_count, unique_vessels, date_range, missing_values, completeness_pct, duplicate_records, valid, message }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThroughputValidation {
    pub records_count: usize,
    pub date_range: Option<(String, String)>,
    pub missing_values: usize,
    pub completeness_pct: f64,
    pub consistency_errors: usize,
    pub iqr_outlier_months: Vec<String>,
    pub sudden_change_months: Vec<String>,
}

/// Validates the historical throughput series per §4.12: reconciles
/// `total ≈ seaborne + river` within 1%, flags IQR outliers per numeric
/// column, and flags month-over-month `|pct_change| > 20%` as sudden
/// changes.
pub fn validate_throughput(points: &[HistoricalThroughputPoint]) -> ThroughputValidation {
    let records_count = points.len();
    let date_range = points.first().zip(points.last()).map(|(f, l)| (f.month.clone(), l.month.clone()));

    let consistency_errors = points
        .iter()
        .filter(|p| {
            let reconciled = p.seaborne_teu + p.river_teu;
            p.total_teu > 0.0 && (p.total_teu - reconciled).abs() > 0.01 * p.total_teu
        })
        .count();

    let totals: Vec<f64> = points.iter().map(|p| p.total_teu).collect();
    let iqr_outlier_months = iqr_outliers(&totals)
        .into_iter()
        .map(|idx| points[idx].month.clone())
        .collect();

    let mut sudden_change_months = Vec::new();
    for window in points.windows(2) {
        let [prev, curr] = window else { continue };
        if prev.total_teu == 0.0 {
            continue;
        }
        let pct_change = (curr.total_teu - prev.total_teu) / prev.total_teu * 100.0;
        if pct_change.abs() > 20.0 {
            sudden_change_months.push(curr.month.clone());
        }
    }

    ThroughputValidation {
        records_count,
        date_range,
        missing_values: 0,
        completeness_pct: 100.0,
        consistency_errors,
        iqr_outlier_months,
        sudden_change_months,
    }
}

/// Indices of values lying outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`.
fn iqr_outliers(values: &[f64]) -> Vec<usize> {
    if values.len() < 4 {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("throughput values are never NaN"));

    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    values.iter().enumerate().filter(|(_, &v)| v < lower || v > upper).map(|(i, _)| i).collect()
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    Fresh,
    Stale,
    VeryOld,
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessThresholds {
    pub container_fresh: ChronoDuration,
    pub container_stale: ChronoDuration,
    pub vessel_real_time: ChronoDuration,
    pub vessel_recent: ChronoDuration,
}

impl Default for FreshnessThresholds {
    fn default() -> Self {
        Self {
            container_fresh: ChronoDuration::days(60),
            container_stale: ChronoDuration::days(180),
            vessel_real_time: ChronoDuration::hours(1),
            vessel_recent: ChronoDuration::hours(24),
        }
    }
}

impl FreshnessThresholds {
    /// Builds the thresholds the Real-Time Manager applies for its whole
    /// lifetime from the layered configuration (§4.12 "thresholds configured
    /// on construction").
    pub fn from_config(config: &crate::config::VesselCoreConfig) -> Self {
        Self {
            container_fresh: ChronoDuration::days(config.container_freshness_fresh_days),
            container_stale: ChronoDuration::days(config.container_freshness_stale_days),
            vessel_real_time: ChronoDuration::hours(config.vessel_freshness_real_time_hours),
            vessel_recent: ChronoDuration::hours(config.vessel_freshness_recent_hours),
        }
    }
}

/// Categorizes the age of a vessel dataset (a feed frame or the merged
/// view) relative to `now`.
pub fn vessel_freshness(loaded_at: chrono::DateTime<Utc>, thresholds: &FreshnessThresholds) -> Freshness {
    let age = Utc::now().signed_duration_since(loaded_at);
    if age <= thresholds.vessel_real_time {
        Freshness::Fresh
    } else if age <= thresholds.vessel_recent {
        Freshness::Stale
    } else {
        Freshness::VeryOld
    }
}

/// Categorizes the age of the historical container-throughput dataset
/// relative to `now`.
pub fn container_freshness(loaded_at: chrono::DateTime<Utc>, thresholds: &FreshnessThresholds) -> Freshness {
    let age = Utc::now().signed_duration_since(loaded_at);
    if age <= thresholds.container_fresh {
        Freshness::Fresh
    } else if age <= thresholds.container_stale {
        Freshness::Stale
    } else {
        Freshness::VeryOld
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, FeedId, LocationKind, ShipCategory, Status, VesselRecord};
    use chrono::NaiveDate;

    fn record(vessel_name: Option<&str>, event_time: Option<NaiveDateTime>) -> VesselRecord {
        VesselRecord {
            call_sign: Some("C1".to_string()),
            vessel_name: vessel_name.map(str::to_string),
            ship_type_raw: None,
            ship_category: ShipCategory::Unknown,
            agent_name: None,
            location_raw: None,
            location_kind: LocationKind::Unknown,
            event_time,
            event_kind: Some(EventKind::Arrival),
            status: Status::InPort,
            remark: None,
            source_feed: FeedId::Arrived,
        }
    }

    #[test]
    fn empty_frame_is_invalid() {
        let frame = FeedFrame::empty(FeedId::Arrived, Utc::now());
        let result = validate_vessel_frame(&frame);
        assert!(!result.valid);
    }

    #[test]
    fn frame_with_all_fields_is_valid() {
        let t = NaiveDate::from_ymd_opt(2025, 8, 17).unwrap().and_hms_opt(0, 0, 0);
        let frame = FeedFrame { source_feed: FeedId::Arrived, loaded_at: Utc::now(), records: vec![record(Some("EVER ACE"), t)] };
        let result = validate_vessel_frame(&frame);
        assert!(result.valid);
        assert_eq!(result.completeness_pct, 100.0);
    }

    #[test]
    fn all_null_event_time_is_invalid() {
        let frame = FeedFrame { source_feed: FeedId::Arrived, loaded_at: Utc::now(), records: vec![record(Some("X"), None)] };
        let result = validate_vessel_frame(&frame);
        assert!(!result.valid);
    }

    #[test]
    fn consistency_error_flags_mismatched_total() {
        let points = vec![
            HistoricalThroughputPoint { month: "2025-01".to_string(), seaborne_teu: 100.0, river_teu: 50.0, total_teu: 200.0 },
        ];
        let result = validate_throughput(&points);
        assert_eq!(result.consistency_errors, 1);
    }

    #[test]
    fn sudden_change_detected() {
        let points = vec![
            HistoricalThroughputPoint { month: "2025-01".to_string(), seaborne_teu: 70.0, river_teu: 30.0, total_teu: 100.0 },
            HistoricalThroughputPoint { month: "2025-02".to_string(), seaborne_teu: 91.0, river_teu: 39.0, total_teu: 130.0 },
        ];
        let result = validate_throughput(&points);
        assert_eq!(result.sudden_change_months, vec!["2025-02".to_string()]);
    }

    #[test]
    fn vessel_freshness_thresholds() {
        let thresholds = FreshnessThresholds::default();
        assert_eq!(vessel_freshness(Utc::now(), &thresholds), Freshness::Fresh);
        assert_eq!(vessel_freshness(Utc::now() - ChronoDuration::hours(12), &thresholds), Freshness::Stale);
        assert_eq!(vessel_freshness(Utc::now() - ChronoDuration::hours(48), &thresholds), Freshness::VeryOld);
    }

    #[test]
    fn container_freshness_thresholds() {
        let thresholds = FreshnessThresholds::default();
        assert_eq!(container_freshness(Utc::now(), &thresholds), Freshness::Fresh);
        assert_eq!(container_freshness(Utc::now() - ChronoDuration::days(90), &thresholds), Freshness::Stale);
        assert_eq!(container_freshness(Utc::now() - ChronoDuration::days(200), &thresholds), Freshness::VeryOld);
    }

    #[test]
    fn freshness_thresholds_from_config_match_defaults() {
        let config = crate::config::VesselCoreConfig::default();
        let thresholds = FreshnessThresholds::from_config(&config);
        assert_eq!(thresholds.container_fresh, ChronoDuration::days(60));
        assert_eq!(thresholds.container_stale, ChronoDuration::days(180));
        assert_eq!(thresholds.vessel_real_time, ChronoDuration::hours(1));
        assert_eq!(thresholds.vessel_recent, ChronoDuration::hours(24));
    }
}
