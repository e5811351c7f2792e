//! Cross-Reference Analyzer (L, §4.12). Joins current vessel counts with
//! historical monthly container throughput to compute an expected vessel
//! rate and the observed deviation from it. Best-effort: failures here never
//! trip the `vessel_update` circuit breaker (§4.10 step 5).

use serde::Serialize;

use crate::model::HistoricalThroughputPoint;

#[derive(Debug, Clone, Serialize)]
pub struct MonthDeviation {
    pub month: String,
    pub expected_daily_vessels: f64,
    pub observed_daily_vessels: f64,
    pub deviation_pct: f64,
    pub anomalous: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossReferenceReport {
    pub deviations: Vec<MonthDeviation>,
}

/// `expected_daily_vessels = (avg_monthly_teus * 1000) / (30 * avg_teu_per_ship)`.
/// A month is anomalous if `|deviation_pct| > threshold_pct`.
pub fn cross_reference(
    throughput: &[HistoricalThroughputPoint],
    observed_daily_vessels_by_month: &hashbrown::HashMap<String, f64>,
    avg_teu_per_ship: f64,
    threshold_pct: f64,
) -> CrossReferenceReport {
    let deviations = throughput
        .iter()
        .filter_map(|point| {
            let observed = *observed_daily_vessels_by_month.get(&point.month)?;
            let expected = (point.total_teu * 1000.0) / (30.0 * avg_teu_per_ship);
            let deviation_pct = if expected > 0.0 { (observed - expected) / expected * 100.0 } else { 0.0 };
            Some(MonthDeviation {
                month: point.month.clone(),
                expected_daily_vessels: expected,
                observed_daily_vessels: observed,
                deviation_pct,
                anomalous: deviation_pct.abs() > threshold_pct,
            })
        })
        .collect();

    CrossReferenceReport { deviations }
}
