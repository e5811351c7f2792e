//! Merger (E, §4.5). Combines per-feed frames into one deduplicated,
//! precedence-ordered [`MergedVesselView`].

use chrono::Utc;

use crate::model::{FeedFrame, MergedVesselView, VesselRecord};

/// Merges frames per §4.5: concatenate, stable-sort by status precedence
/// descending, dedupe by `(call_sign, vessel_name)` keeping the first
/// (highest-precedence) occurrence, then a final stable sort by
/// `event_time` ascending with nulls last.
pub fn merge(frames: impl IntoIterator<Item = FeedFrame>) -> MergedVesselView {
    let mut all: Vec<VesselRecord> = frames.into_iter().flat_map(|f| f.records).collect();

    all.sort_by(|a, b| b.status.precedence().cmp(&a.status.precedence()));

    let mut seen = hashbrown::HashSet::new();
    all.retain(|record| match record.merge_key() {
        Some(key) => seen.insert(key),
        None => true,
    });

    all.sort_by(|a, b| match (a.event_time, b.event_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    MergedVesselView { records: all, computed_at: Utc::now() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, FeedId, LocationKind, ShipCategory, Status};
    use chrono::NaiveDate;

    fn record(call_sign: &str, vessel_name: &str, status: Status, feed: FeedId) -> VesselRecord {
        VesselRecord {
            call_sign: Some(call_sign.to_string()),
            vessel_name: Some(vessel_name.to_string()),
            ship_type_raw: None,
            ship_category: ShipCategory::Unknown,
            agent_name: None,
            location_raw: None,
            location_kind: LocationKind::Unknown,
            event_time: None,
            event_kind: Some(EventKind::Arrival),
            status,
            remark: None,
            source_feed: feed,
        }
    }

    fn frame(feed: FeedId, records: Vec<VesselRecord>) -> FeedFrame {
        FeedFrame { source_feed: feed, loaded_at: Utc::now(), records }
    }

    #[test]
    fn duplicate_key_keeps_higher_precedence() {
        let in_port = record("AB1", "EVER ACE", Status::InPort, FeedId::Arrived);
        let expected = record("AB1", "EVER ACE", Status::Expected, FeedId::ExpectedArrivals);

        let view = merge(vec![frame(FeedId::Arrived, vec![in_port]), frame(FeedId::ExpectedArrivals, vec![expected])]);

        assert_eq!(view.records.len(), 1);
        assert_eq!(view.records[0].status, Status::InPort);
    }

    #[test]
    fn records_missing_both_key_halves_are_never_collapsed() {
        let mut a = record("X", "Y", Status::InPort, FeedId::Arrived);
        a.call_sign = None;
        a.vessel_name = None;
        let mut b = a.clone();
        b.ship_type_raw = Some("Container".to_string());

        let view = merge(vec![frame(FeedId::Arrived, vec![a, b])]);
        assert_eq!(view.records.len(), 2);
    }

    #[test]
    fn final_sort_is_by_event_time_ascending_nulls_last() {
        let mut early = record("A", "V1", Status::InPort, FeedId::Arrived);
        early.event_time = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0);
        let mut late = record("B", "V2", Status::InPort, FeedId::Arrived);
        late.event_time = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(0, 0, 0);
        let null_time = record("C", "V3", Status::InPort, FeedId::Arrived);

        let view = merge(vec![frame(FeedId::Arrived, vec![late, null_time, early])]);
        let names: Vec<_> = view.records.iter().map(|r| r.vessel_name.clone().unwrap()).collect();
        assert_eq!(names, vec!["V1", "V2", "V3"]);
    }

    #[test]
    fn idempotent_merge() {
        let records = vec![
            record("A", "V1", Status::InPort, FeedId::Arrived),
            record("B", "V2", Status::Departed, FeedId::Departed),
        ];
        let f1 = frame(FeedId::Arrived, records.clone());
        let view1 = merge(vec![f1]);
        let f2 = frame(FeedId::Arrived, records);
        let view2 = merge(vec![f2]);

        let keys1: Vec<_> = view1.records.iter().map(|r| r.merge_key()).collect();
        let keys2: Vec<_> = view2.records.iter().map(|r| r.merge_key()).collect();
        assert_eq!(keys1, keys2);
    }
}
