pub mod clock;
pub mod feed;
pub mod probability;

pub use feed::SnapshotFileFeed;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a binary market. Index 0 is away/under, 1 is home/over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Side {
    Away,
    Home,
}

impl Side {
    pub fn index(self) -> u8 {
        match self {
            Side::Away => 0,
            Side::Home => 1,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = String;

    fn try_from(index: u8) -> std::result::Result<Self, Self::Error> {
        match index {
            0 => Ok(Side::Away),
            1 => Ok(Side::Home),
            other => Err(format!("side index must be 0 or 1, got {}", other)),
        }
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        side.index()
    }
}

/// Encoding of a quoted price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceFormat {
    American,
    Decimal,
    Percent,
    Probability,
    /// Exchange-traded 0–100 price. The only format live signals accept.
    ZeroToHundred,
    #[serde(other)]
    Unknown,
}

impl PriceFormat {
    pub fn is_tradeable(self) -> bool {
        self == PriceFormat::ZeroToHundred
    }
}

impl fmt::Display for PriceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceFormat::American => "american",
            PriceFormat::Decimal => "decimal",
            PriceFormat::Percent => "percent",
            PriceFormat::Probability => "probability",
            PriceFormat::ZeroToHundred => "zero_to_hundred",
            PriceFormat::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// (event, side) pair. Positions, baselines and quotes are all keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSide {
    pub event_id: String,
    pub side: Side,
}

impl EventSide {
    pub fn new(event_id: impl Into<String>, side: Side) -> Self {
        EventSide {
            event_id: event_id.into(),
            side,
        }
    }
}

impl fmt::Display for EventSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {} side {}", self.event_id, self.side.index())
    }
}

/// One live quote for an event+side, as read from the market data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub event_id: String,
    pub league: String,
    pub side: Side,
    pub price: f64,
    pub format: PriceFormat,
    /// Current live point spread, when the source publishes one
    #[serde(default)]
    pub spread: Option<f64>,
    /// League clock text, e.g. "7:23 4Q" or "8:45 2nd"
    #[serde(default)]
    pub game_clock: Option<String>,
    /// Lead of this side (positive = ahead)
    #[serde(default)]
    pub score_diff: Option<f64>,
}

impl MarketQuote {
    pub fn key(&self) -> EventSide {
        EventSide::new(self.event_id.clone(), self.side)
    }
}

/// Consensus pregame line for an event, quoted from the home side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PregameLine {
    pub event_id: String,
    pub league: String,
    /// Home point spread as quoted (negative when home is favoured)
    pub home_spread: f64,
    /// Vig-free home moneyline price
    pub home_price: f64,
    pub format: PriceFormat,
}

/// Everything the feed knows about at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub pregame: Vec<PregameLine>,
    #[serde(default)]
    pub live: Vec<MarketQuote>,
}

/// Source of pregame lines and live quotes.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<MarketSnapshot>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
