//! Categorizer (C, §4.3). Case-insensitive substring matching, first match
//! wins, exactly as the original classified ship types and locations.

use crate::model::{LocationKind, ShipCategory};

pub fn categorize_ship_type(ship_type: Option<&str>) -> ShipCategory {
    let Some(raw) = ship_type else {
        return ShipCategory::Unknown;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return ShipCategory::Unknown;
    }

    let lower = raw.to_lowercase();
    if lower.contains("container") {
        ShipCategory::Container
    } else if ["bulk", "ore", "cement", "woodchip"].iter().any(|t| lower.contains(t)) {
        ShipCategory::BulkCarrier
    } else if lower.contains("chemical") {
        ShipCategory::ChemicalTanker
    } else if ["general", "cargo", "heavy lift"].iter().any(|t| lower.contains(t)) {
        ShipCategory::GeneralCargo
    } else if lower.contains("tanker") {
        ShipCategory::Tanker
    } else {
        ShipCategory::Other
    }
}

pub fn categorize_location(location: Option<&str>) -> LocationKind {
    let Some(raw) = location else {
        return LocationKind::Unknown;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return LocationKind::Unknown;
    }

    let lower = raw.to_lowercase();
    if lower.contains("berth") || lower.contains("terminal") {
        LocationKind::Berth
    } else if lower.contains("anchorage") {
        LocationKind::Anchorage
    } else if lower.contains("channel") || lower.contains("buoy") {
        LocationKind::Channel
    } else {
        LocationKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ship_type_first_match_wins() {
        assert_eq!(categorize_ship_type(Some("Container Ship")), ShipCategory::Container);
        assert_eq!(categorize_ship_type(Some("Bulk Ore Carrier")), ShipCategory::BulkCarrier);
        assert_eq!(categorize_ship_type(Some("Chemical Tanker")), ShipCategory::ChemicalTanker);
        assert_eq!(categorize_ship_type(Some("General Cargo")), ShipCategory::GeneralCargo);
        assert_eq!(categorize_ship_type(Some("Oil Tanker")), ShipCategory::Tanker);
        assert_eq!(categorize_ship_type(Some("Yacht")), ShipCategory::Other);
        assert_eq!(categorize_ship_type(None), ShipCategory::Unknown);
        assert_eq!(categorize_ship_type(Some("")), ShipCategory::Unknown);
    }

    #[test]
    fn location_first_match_wins() {
        assert_eq!(categorize_location(Some("Kwai Chung Berth 3")), LocationKind::Berth);
        assert_eq!(categorize_location(Some("Container Terminal 9")), LocationKind::Berth);
        assert_eq!(categorize_location(Some("Western Anchorage")), LocationKind::Anchorage);
        assert_eq!(categorize_location(Some("Tathong Channel")), LocationKind::Channel);
        assert_eq!(categorize_location(Some("Buoy 12")), LocationKind::Channel);
        assert_eq!(categorize_location(Some("Open Water")), LocationKind::Other);
        assert_eq!(categorize_location(None), LocationKind::Unknown);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(categorize_ship_type(Some("CONTAINER VESSEL")), ShipCategory::Container);
        assert_eq!(categorize_location(Some("BERTH 1")), LocationKind::Berth);
    }
}
