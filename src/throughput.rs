//! Historical throughput loader, feeding the Cross-Reference Analyzer (L).
//! Parses the monthly container-throughput CSV series (`Year`, `Month`,
//! `Seaborne ('000 TEUs)`, `River ('000 TEUs)`, `Total ('000 TEUs)`),
//! skipping the `"All"` annual-summary rows the source file carries
//! alongside the monthly ones.

use std::path::Path;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::ThroughputLoadError;
use crate::model::HistoricalThroughputPoint;

const MONTH_ABBREVIATIONS: &[&str] =
    &["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

fn parse_month_number(abbrev: &str) -> Option<u32> {
    MONTH_ABBREVIATIONS.iter().position(|m| m.eq_ignore_ascii_case(abbrev)).map(|i| i as u32 + 1)
}

/// Loads the historical throughput CSV at `path`, skipping rows whose
/// `Month` column is `"All"` (annual summaries) or whose `Year`/`Month`
/// cannot be resolved to a calendar month. Numeric columns that fail to
/// parse default to `0.0`, matching the original's `errors='coerce'`
/// tolerance for ragged source data.
pub async fn load_throughput(path: &Path) -> Result<Vec<HistoricalThroughputPoint>, ThroughputLoadError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ThroughputLoadError::Io { path: path.display().to_string(), source })?;

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(contents.as_bytes());
    let mut points = Vec::new();

    for (row_index, result) in reader.records().enumerate() {
        let record = result.map_err(|source| ThroughputLoadError::Csv { row: row_index, source })?;

        let Some(year) = record.get(0).and_then(|s| s.trim().parse::<i32>().ok()) else {
            warn!(row = row_index, "throughput row has unparseable year, skipping");
            continue;
        };
        let Some(month_abbrev) = record.get(1).map(str::trim) else { continue };
        if month_abbrev.eq_ignore_ascii_case("all") {
            continue;
        }
        let Some(month_number) = parse_month_number(month_abbrev) else {
            warn!(row = row_index, month = month_abbrev, "throughput row has unrecognized month, skipping");
            continue;
        };
        if NaiveDate::from_ymd_opt(year, month_number, 1).is_none() {
            continue;
        }

        let seaborne_teu = record.get(2).and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0);
        let river_teu = record.get(3).and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0);
        let total_teu = record.get(4).and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0);

        points.push(HistoricalThroughputPoint { month: format!("{year:04}-{month_number:02}"), seaborne_teu, river_teu, total_teu });
    }

    points.sort_by(|a, b| a.month.cmp(&b.month));
    Ok(points)
}
