//! Feed Parser (A, §4.1). Turns one raw XML feed into a typed [`FeedFrame`],
//! tolerating the preamble noise and unescaped ampersands the real feeds
//! carry, and deriving [`EventKind`] from whichever time field is present.

use std::fmt;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

use crate::categorize::{categorize_location, categorize_ship_type};
use crate::error::ParseError;
use crate::model::{EventKind, FeedFrame, FeedId, Status, VesselRecord};
use crate::timestamp::parse_instant;

const KNOWN_TAGS: &[&str] = &[
    "CALL_SIGN",
    "VESSEL_NAME",
    "SHIP_TYPE",
    "AGENT_NAME",
    "CURRENT_LOCATION",
    "ARRIVAL_TIME",
    "DEPARTURE_TIME",
    "EXPECTED_TIME",
    "REMARK",
];

const ELEMENT_TAG: &str = "G_SQL1";

/// Internal read error for one `<G_SQL1>` element: either the underlying
/// XML stream is broken (bubbles up as a top-level [`ParseError`]), or the
/// element was truncated (treated as a single skipped, warned-about record).
#[derive(Debug)]
enum ReadError {
    Xml(quick_xml::Error),
    Truncated(&'static str),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Xml(e) => write!(f, "{e}"),
            ReadError::Truncated(what) => write!(f, "reached end of feed while still inside {what}"),
        }
    }
}

impl From<quick_xml::Error> for ReadError {
    fn from(e: quick_xml::Error) -> Self {
        ReadError::Xml(e)
    }
}

/// Strips the free-text preamble lines and repairs unescaped ampersands
/// (§4.1 preprocessing) so the remainder is well-formed-enough XML.
fn preprocess(raw: &str) -> String {
    raw.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("This XML file") || trimmed.starts_with("associated with it"))
        })
        .map(|line| line.replace(" & ", " &amp; "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses one raw feed into a [`FeedFrame`]. An empty or preamble-only file
/// yields an empty frame, not an error.
pub fn parse_feed(raw_bytes: &[u8], source_feed: FeedId, loaded_at: DateTime<Utc>) -> Result<FeedFrame, ParseError> {
    let text = String::from_utf8_lossy(raw_bytes);
    let cleaned = preprocess(&text);

    if cleaned.trim().is_empty() {
        return Ok(FeedFrame::empty(source_feed, loaded_at));
    }

    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut buf = Vec::new();
    let to_parse_error = |err: ReadError| ParseError::MalformedXml {
        source_feed: source_feed.to_string(),
        reason: err.to_string(),
    };

    loop {
        let event = reader.read_event_into(&mut buf).map_err(ReadError::from).map_err(to_parse_error)?;

        match event {
            Event::Start(e) if e.name().as_ref() == ELEMENT_TAG.as_bytes() => {
                match parse_vessel_element(&mut reader, source_feed) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => warn!(source_feed = %source_feed, "skipping malformed G_SQL1 element"),
                    Err(err) => return Err(to_parse_error(err)),
                }
            }
            Event::Empty(e) if e.name().as_ref() == ELEMENT_TAG.as_bytes() => {
                // A self-closing <G_SQL1/> has no fields at all.
                records.push(build_record(source_feed, HashMap::new()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(FeedFrame { source_feed, loaded_at, records })
}

/// Reads one `<G_SQL1>...</G_SQL1>` element, returning `Ok(None)` if the
/// element is truncated before its closing tag (skipped with a warning, the
/// rest of the feed is unaffected), or `Err` if the underlying XML stream
/// itself is unrecoverable (a true top-level parse failure).
fn parse_vessel_element(reader: &mut Reader<&[u8]>, source_feed: FeedId) -> Result<Option<VesselRecord>, ReadError> {
    let mut fields: HashMap<&'static str, String> = HashMap::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name();
                if let Some(&tag) = KNOWN_TAGS.iter().find(|t| t.as_bytes() == name.as_ref()) {
                    match read_leaf_text(reader) {
                        Ok(text) => {
                            fields.insert(tag, text);
                        }
                        Err(ReadError::Truncated(_)) => return Ok(None),
                        Err(err) => return Err(err),
                    }
                } else if let Err(err) = skip_subtree(reader) {
                    match err {
                        ReadError::Truncated(_) => return Ok(None),
                        err => return Err(err),
                    }
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                if let Some(&tag) = KNOWN_TAGS.iter().find(|t| t.as_bytes() == name.as_ref()) {
                    fields.insert(tag, String::new());
                }
            }
            Event::End(e) if e.name().as_ref() == ELEMENT_TAG.as_bytes() => break,
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }

    Ok(Some(build_record(source_feed, fields)))
}

/// Reads the text content of a leaf element, skipping over any unexpected
/// grandchildren, until the matching end tag for the element already opened.
fn read_leaf_text(reader: &mut Reader<&[u8]>) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::CData(t) => text.push_str(&String::from_utf8_lossy(t.as_ref())),
            Event::Start(_) => depth += 1,
            Event::Empty(_) => {}
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => return Err(ReadError::Truncated("a leaf element")),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Skips an entire subtree rooted at an element whose `Start` was just
/// consumed, used for child elements this schema doesn't recognize.
fn skip_subtree(reader: &mut Reader<&[u8]>) -> Result<(), ReadError> {
    let mut buf = Vec::new();
    let mut depth = 1u32;

    while depth > 0 {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(ReadError::Truncated("an unrecognized element")),
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    })
}

fn build_record(source_feed: FeedId, mut fields: HashMap<&'static str, String>) -> VesselRecord {
    let call_sign = non_empty(fields.remove("CALL_SIGN"));
    let vessel_name = non_empty(fields.remove("VESSEL_NAME"));
    let ship_type_raw = non_empty(fields.remove("SHIP_TYPE"));
    let agent_name = non_empty(fields.remove("AGENT_NAME"));
    let location_raw = non_empty(fields.remove("CURRENT_LOCATION"));
    let remark = non_empty(fields.remove("REMARK"));

    // The first present time field, in this order, determines event_kind
    // (§4.1) — presence of the element matters, not just non-empty text.
    let (time_str, event_kind) = if let Some(v) = fields.remove("ARRIVAL_TIME") {
        (Some(v), Some(EventKind::Arrival))
    } else if let Some(v) = fields.remove("DEPARTURE_TIME") {
        (Some(v), Some(EventKind::Departure))
    } else if let Some(v) = fields.remove("EXPECTED_TIME") {
        (Some(v), Some(EventKind::Expected))
    } else {
        (None, None)
    };

    let event_time = parse_instant(time_str.as_deref());
    let ship_category = categorize_ship_type(ship_type_raw.as_deref());
    let location_kind = categorize_location(location_raw.as_deref());

    // Placeholder; the Feed Loader (D) overwrites this per the feed-specific
    // rules in §4.4, which this parser has no knowledge of.
    let status = match event_kind {
        Some(EventKind::Departure) => Status::Departed,
        Some(EventKind::Expected) => Status::Expected,
        _ => Status::Arriving,
    };

    VesselRecord {
        call_sign,
        vessel_name,
        ship_type_raw,
        ship_category,
        agent_name,
        location_raw,
        location_kind,
        event_time,
        event_kind,
        status,
        remark,
        source_feed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-08-18T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn empty_file_yields_empty_frame() {
        let frame = parse_feed(b"", FeedId::Arrived, now()).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn preamble_only_file_yields_empty_frame() {
        let raw = b"This XML file was generated for your convenience\nassociated with it you may find nothing\n";
        let frame = parse_feed(raw, FeedId::Arrived, now()).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn ampersand_repair() {
        let raw = br#"<ROOT><G_SQL1><AGENT_NAME>COSCO & OOCL</AGENT_NAME></G_SQL1></ROOT>"#;
        let frame = parse_feed(raw, FeedId::Arrived, now()).unwrap();
        assert_eq!(frame.records.len(), 1);
        assert_eq!(frame.records[0].agent_name.as_deref(), Some("COSCO & OOCL"));
    }

    #[test]
    fn basic_fields_and_event_kind() {
        let raw = br#"<ROOT>
            <G_SQL1>
                <CALL_SIGN>VRAB7</CALL_SIGN>
                <VESSEL_NAME>EVER ACE</VESSEL_NAME>
                <SHIP_TYPE>Container Ship</SHIP_TYPE>
                <CURRENT_LOCATION>Berth 3</CURRENT_LOCATION>
                <ARRIVAL_TIME>2025/08/17 12:30</ARRIVAL_TIME>
            </G_SQL1>
        </ROOT>"#;
        let frame = parse_feed(raw, FeedId::Arrived, now()).unwrap();
        assert_eq!(frame.records.len(), 1);
        let r = &frame.records[0];
        assert_eq!(r.call_sign.as_deref(), Some("VRAB7"));
        assert_eq!(r.vessel_name.as_deref(), Some("EVER ACE"));
        assert_eq!(r.event_kind, Some(EventKind::Arrival));
        assert!(r.event_time.is_some());
        assert_eq!(r.ship_category, crate::model::ShipCategory::Container);
        assert_eq!(r.location_kind, crate::model::LocationKind::Berth);
    }

    #[test]
    fn missing_fields_are_null_not_failures() {
        let raw = br#"<ROOT><G_SQL1><CALL_SIGN>ABC1</CALL_SIGN></G_SQL1></ROOT>"#;
        let frame = parse_feed(raw, FeedId::Arrived, now()).unwrap();
        assert_eq!(frame.records.len(), 1);
        let r = &frame.records[0];
        assert_eq!(r.vessel_name, None);
        assert_eq!(r.event_time, None);
    }

    #[test]
    fn multiple_records_preserve_order() {
        let raw = br#"<ROOT>
            <G_SQL1><CALL_SIGN>A1</CALL_SIGN></G_SQL1>
            <G_SQL1><CALL_SIGN>B2</CALL_SIGN></G_SQL1>
            <G_SQL1><CALL_SIGN>C3</CALL_SIGN></G_SQL1>
        </ROOT>"#;
        let frame = parse_feed(raw, FeedId::Arrived, now()).unwrap();
        let names: Vec<_> = frame.records.iter().map(|r| r.call_sign.clone().unwrap()).collect();
        assert_eq!(names, vec!["A1", "B2", "C3"]);
    }

    #[test]
    fn mismatched_closing_tag_is_a_parse_error() {
        let raw = b"<ROOT><G_SQL1><CALL_SIGN>ABC1</CALL_SIGN></WRONGTAG></ROOT>";
        let result = parse_feed(raw, FeedId::Arrived, now());
        assert!(result.is_err());
    }

    #[test]
    fn truncated_element_is_skipped_not_fatal() {
        let raw = b"<ROOT><G_SQL1><CALL_SIGN>ABC1</CALL_SIGN>";
        let frame = parse_feed(raw, FeedId::Arrived, now()).unwrap();
        assert!(frame.records.is_empty());
    }
}
