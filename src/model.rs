//! The typed vessel data model. Replaces the dynamic dict-of-columns the
//! original source carried as a pandas DataFrame: one row becomes one
//! [`VesselRecord`], and "column access" becomes field access.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The four known feed files, in the order the Feed Loader (D) reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeedId {
    Arrived,
    Departed,
    ExpectedArrivals,
    ExpectedDepartures,
}

impl FeedId {
    pub const ALL: [FeedId; 4] = [
        FeedId::Arrived,
        FeedId::Departed,
        FeedId::ExpectedArrivals,
        FeedId::ExpectedDepartures,
    ];
}

/// Where in the arrival/departure lifecycle a [`VesselRecord`] currently sits.
/// A tagged variant instead of the original's mixed-type status column, with
/// precedence defined once (§3.2 invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Arriving,
    InPort,
    Departed,
    Expected,
}

impl Status {
    /// Merge precedence: higher wins. `in_port=3, departed=2, arriving=1, expected=0`.
    pub fn precedence(self) -> u8 {
        match self {
            Status::InPort => 3,
            Status::Departed => 2,
            Status::Arriving => 1,
            Status::Expected => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Arrival,
    Departure,
    Expected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShipCategory {
    Container,
    BulkCarrier,
    ChemicalTanker,
    GeneralCargo,
    Tanker,
    Other,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Berth,
    Anchorage,
    Channel,
    Other,
    Unknown,
}

/// The atom of the data model (§3.1). All fields but `source_feed` are
/// optional — a missing field is a null attribute, never a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselRecord {
    pub call_sign: Option<String>,
    pub vessel_name: Option<String>,
    pub ship_type_raw: Option<String>,
    pub ship_category: ShipCategory,
    pub agent_name: Option<String>,
    pub location_raw: Option<String>,
    pub location_kind: LocationKind,
    pub event_time: Option<NaiveDateTime>,
    pub event_kind: Option<EventKind>,
    pub status: Status,
    pub remark: Option<String>,
    pub source_feed: FeedId,
}

impl VesselRecord {
    /// The merge/dedup key (§4.5). Two records collapse into one iff both
    /// halves match exactly; a record missing both halves never collapses
    /// with anything (kept as its own singleton key).
    pub fn merge_key(&self) -> Option<(String, String)> {
        match (&self.call_sign, &self.vessel_name) {
            (Some(c), Some(v)) => Some((c.clone(), v.clone())),
            _ => None,
        }
    }
}

/// An ordered collection of [`VesselRecord`] parsed from one feed at one
/// point in time (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFrame {
    pub source_feed: FeedId,
    pub loaded_at: DateTime<Utc>,
    pub records: Vec<VesselRecord>,
}

impl FeedFrame {
    pub fn empty(source_feed: FeedId, loaded_at: DateTime<Utc>) -> Self {
        Self {
            source_feed,
            loaded_at,
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The deduplicated union of all current frames with status precedence
/// applied (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedVesselView {
    pub records: Vec<VesselRecord>,
    pub computed_at: DateTime<Utc>,
}

/// One row of the historical monthly container-throughput series (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalThroughputPoint {
    /// `YYYY-MM`.
    pub month: String,
    pub seaborne_teu: f64,
    pub river_teu: f64,
    pub total_teu: f64,
}
