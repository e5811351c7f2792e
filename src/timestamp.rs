//! Timestamp Normalizer (B, §4.2). Converts the free-form datetime strings
//! found across the vessel feeds into a single canonical
//! [`chrono::NaiveDateTime`], rejecting implausible years.

use chrono::NaiveDateTime;
use tracing::warn;

/// Formats tried in order, matching the original data's observed variants.
const FORMATS: &[&str] = &[
    "%d-%b-%Y %H:%M", // 17-Aug-2025 12:30
    "%Y/%m/%d %H:%M", // 2025/08/17 12:30
    "%Y-%m-%d %H:%M", // 2025-08-17 12:30
    "%d/%m/%Y %H:%M", // 17/08/2025 12:30
];

/// The earliest year a parsed instant may carry; anything older is treated
/// as a data-entry error rather than a real historical record (§3.2 invariant 2).
const MIN_PLAUSIBLE_YEAR: i32 = 2020;

/// Parses a free-form vessel timestamp, returning `None` if every format
/// fails or if the parsed year predates [`MIN_PLAUSIBLE_YEAR`].
pub fn parse_instant(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| permissive_parse(s));

    match parsed {
        Some(dt) if dt.year_is_plausible() => Some(dt),
        Some(dt) => {
            warn!(year = dt.format("%Y").to_string(), raw = s, "rejecting implausible timestamp");
            None
        }
        None => {
            warn!(raw = s, "could not parse vessel timestamp");
            None
        }
    }
}

/// Last-resort fallback: a handful of additional layouts seen in the wild,
/// tried before giving up entirely.
fn permissive_parse(s: &str) -> Option<NaiveDateTime> {
    const FALLBACK_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
        "%d-%b-%Y",
        "%Y/%m/%d",
    ];

    FALLBACK_FORMATS.iter().find_map(|fmt| {
        if fmt.contains("%H") {
            NaiveDateTime::parse_from_str(s, fmt).ok()
        } else {
            chrono::NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    })
}

trait YearPlausible {
    fn year_is_plausible(&self) -> bool;
}

impl YearPlausible for NaiveDateTime {
    fn year_is_plausible(&self) -> bool {
        use chrono::Datelike;
        self.year() >= MIN_PLAUSIBLE_YEAR
    }
}
