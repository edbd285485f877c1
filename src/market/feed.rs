use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{MarketFeed, MarketSnapshot};

/// Market feed backed by a JSON snapshot file that an external collector
/// rewrites in place. The file is re-read on every fetch.
///
/// ```json
/// {
///   "pregame": [{"event_id": "401", "league": "NBA", "home_spread": -6.5,
///                "home_price": -250, "format": "american"}],
///   "live": [{"event_id": "401", "league": "NBA", "side": 1, "price": 64,
///             "format": "zero_to_hundred", "game_clock": "7:23 3Q", "score_diff": 4}]
/// }
/// ```
pub struct SnapshotFileFeed {
    path: PathBuf,
}

impl SnapshotFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotFileFeed { path: path.into() }
    }
}

#[async_trait]
impl MarketFeed for SnapshotFileFeed {
    fn name(&self) -> &str {
        "snapshot-file"
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot> {
        debug!("Reading market snapshot from {}", self.path.display());
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;
        parse_snapshot(&raw)
            .with_context(|| format!("Failed to parse snapshot {}", self.path.display()))
    }
}

pub fn parse_snapshot(raw: &str) -> Result<MarketSnapshot> {
    let snapshot: MarketSnapshot = serde_json::from_str(raw)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{PriceFormat, Side};

    const SAMPLE: &str = r#"{
        "pregame": [
            {"event_id": "401", "league": "NBA", "home_spread": -6.5,
             "home_price": -250, "format": "american"}
        ],
        "live": [
            {"event_id": "401", "league": "NBA", "side": 1, "price": 64,
             "format": "zero_to_hundred", "game_clock": "7:23 3Q", "score_diff": 4},
            {"event_id": "401", "league": "NBA", "side": 0, "price": 36,
             "format": "zero_to_hundred", "game_clock": "7:23 3Q", "score_diff": -4,
             "spread": 5.5}
        ]
    }"#;

    #[test]
    fn parses_sample_snapshot() {
        let snap = parse_snapshot(SAMPLE).unwrap();
        assert_eq!(snap.pregame.len(), 1);
        assert_eq!(snap.pregame[0].format, PriceFormat::American);
        assert_eq!(snap.live.len(), 2);
        assert_eq!(snap.live[0].side, Side::Home);
        assert_eq!(snap.live[1].side, Side::Away);
        assert_eq!(snap.live[1].spread, Some(5.5));
        assert_eq!(snap.live[0].spread, None);
        assert_eq!(snap.live[0].game_clock.as_deref(), Some("7:23 3Q"));
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let snap = parse_snapshot("{}").unwrap();
        assert!(snap.pregame.is_empty());
        assert!(snap.live.is_empty());
    }

    #[test]
    fn rejects_bad_side_index() {
        let raw = r#"{"live": [{"event_id": "1", "league": "NBA", "side": 3,
                      "price": 50, "format": "zero_to_hundred"}]}"#;
        assert!(parse_snapshot(raw).is_err());
    }

    #[tokio::test]
    async fn reads_file_each_fetch() {
        let path = std::env::temp_dir().join(format!("voltrade-feed-{}.json", std::process::id()));
        tokio::fs::write(&path, "{}").await.unwrap();
        let feed = SnapshotFileFeed::new(&path);
        assert!(feed.fetch_snapshot().await.unwrap().live.is_empty());

        tokio::fs::write(&path, SAMPLE).await.unwrap();
        assert_eq!(feed.fetch_snapshot().await.unwrap().live.len(), 2);

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(feed.fetch_snapshot().await.is_err());
    }
}
