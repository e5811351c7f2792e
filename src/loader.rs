//! Feed Loader (D, §4.4). Orchestrates the Parser (A) over the four known
//! feed files and assigns the feed-specific `status`/`event_kind` rules the
//! parser itself has no knowledge of.

use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::LoadFailure;
use crate::model::{FeedFrame, FeedId, Status};
use crate::parser::parse_feed;

/// Paths for the four known feeds, keyed by [`FeedId`].
#[derive(Debug, Clone)]
pub struct WatchedFeeds(pub StdHashMap<FeedId, PathBuf>);

impl WatchedFeeds {
    pub fn get(&self, id: FeedId) -> Option<&Path> {
        self.0.get(&id).map(PathBuf::as_path)
    }
}

/// Reads one feed file (applying `file_read_timeout`) and parses it,
/// returning an empty frame rather than an error when the file is missing.
async fn load_one(path: &Path, source_feed: FeedId, file_read_timeout: Duration) -> Result<FeedFrame, LoadFailure> {
    let loaded_at = Utc::now();

    if !path.exists() {
        warn!(source_feed = %source_feed, path = %path.display(), "feed file missing, emitting empty frame");
        return Ok(FeedFrame::empty(source_feed, loaded_at));
    }

    let read = tokio::time::timeout(file_read_timeout, tokio::fs::read(path))
        .await
        .map_err(|_| LoadFailure::Timeout { path: path.display().to_string() })?
        .map_err(|source| LoadFailure::Io { path: path.display().to_string(), source })?;

    if read.is_empty() {
        debug!(source_feed = %source_feed, path = %path.display(), "feed file is empty");
        return Ok(FeedFrame::empty(source_feed, loaded_at));
    }

    let frame = parse_feed(&read, source_feed, loaded_at)?;
    Ok(apply_feed_rules(frame, source_feed))
}

/// Applies the feed-specific status/event_kind overrides from §4.4. The
/// parser assigns a placeholder status purely from field presence; this is
/// the only place that knows which *file* a record came from.
fn apply_feed_rules(mut frame: FeedFrame, source_feed: FeedId) -> FeedFrame {
    for record in &mut frame.records {
        record.status = match source_feed {
            FeedId::Arrived => {
                if record.remark.as_deref() == Some("Departed") {
                    Status::Departed
                } else {
                    Status::InPort
                }
            }
            FeedId::Departed => Status::Departed,
            FeedId::ExpectedArrivals => Status::Arriving,
            FeedId::ExpectedDepartures => Status::Expected,
        };
    }
    frame
}

/// Loads all four configured feeds. A single feed's I/O/parse failure is
/// surfaced to the caller (who records it on the `vessel_update` breaker,
/// per §4.10 step 2); it does not prevent the other feeds from being
/// attempted in this call, but the overall result is an `Err` if any failed.
pub async fn load_all(feeds: &WatchedFeeds, file_read_timeout: Duration) -> Result<StdHashMap<FeedId, FeedFrame>, LoadFailure> {
    let mut out = StdHashMap::with_capacity(FeedId::ALL.len());
    let mut first_err = None;

    for id in FeedId::ALL {
        let Some(path) = feeds.get(id) else {
            warn!(source_feed = %id, "no configured path for feed, emitting empty frame");
            out.insert(id, FeedFrame::empty(id, Utc::now()));
            continue;
        };

        match load_one(path, id, file_read_timeout).await {
            Ok(frame) => {
                out.insert(id, frame);
            }
            Err(err) => {
                warn!(source_feed = %id, error = %err, "failed to load feed");
                first_err.get_or_insert(err);
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn feeds_with(entries: &[(FeedId, &Path)]) -> WatchedFeeds {
        WatchedFeeds(entries.iter().map(|(id, p)| (*id, p.to_path_buf())).collect())
    }

    #[tokio::test]
    async fn missing_file_yields_empty_frame_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.xml");
        let feeds = feeds_with(&[(FeedId::Arrived, &missing)]);
        let result = load_all(&feeds, Duration::from_secs(5)).await.unwrap();
        assert!(result[&FeedId::Arrived].is_empty());
    }

    #[tokio::test]
    async fn arrived_feed_defaults_to_in_port_unless_remark_departed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arrived.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<ROOT>
                <G_SQL1><CALL_SIGN>A1</CALL_SIGN></G_SQL1>
                <G_SQL1><CALL_SIGN>A2</CALL_SIGN><REMARK>Departed</REMARK></G_SQL1>
            </ROOT>"#
        )
        .unwrap();

        let feeds = feeds_with(&[(FeedId::Arrived, &path)]);
        let result = load_all(&feeds, Duration::from_secs(5)).await.unwrap();
        let frame = &result[&FeedId::Arrived];
        assert_eq!(frame.records[0].status, Status::InPort);
        assert_eq!(frame.records[1].status, Status::Departed);
    }

    #[tokio::test]
    async fn expected_arrivals_feed_status_is_arriving() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expected_arrivals.xml");
        std::fs::write(&path, "<ROOT><G_SQL1><CALL_SIGN>X1</CALL_SIGN></G_SQL1></ROOT>").unwrap();

        let feeds = feeds_with(&[(FeedId::ExpectedArrivals, &path)]);
        let result = load_all(&feeds, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result[&FeedId::ExpectedArrivals].records[0].status, Status::Arriving);
    }

    #[tokio::test]
    async fn empty_file_yields_empty_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("departed.xml");
        std::fs::write(&path, "").unwrap();

        let feeds = feeds_with(&[(FeedId::Departed, &path)]);
        let result = load_all(&feeds, Duration::from_secs(5)).await.unwrap();
        assert!(result[&FeedId::Departed].is_empty());
    }
}
