use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bot::position::{ExitReason, Position};
use crate::market::{EventSide, Side};

/// Pregame implied volatility for one event+side. Computed once, then fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PregameBaseline {
    pub key: EventSide,
    pub league: String,
    /// Home spread as quoted; the side convention is applied at use
    pub raw_spread: f64,
    pub pregame_vol: f64,
    pub computed_at: DateTime<Utc>,
}

/// Journal row for an opened (and possibly closed) position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Option<i64>,
    pub event_id: String,
    pub side: Side,
    pub league: String,
    /// "BUY_VOL" | "SELL_VOL"
    pub direction: String,
    /// Currency units committed
    pub size: f64,
    pub initial_deviation: f64,
    pub entry_live_vol: f64,
    pub entry_expected_vol: f64,
    pub entry_score_diff: f64,
    pub entry_prob: f64,
    /// "open" | "closed" | "abandoned"
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub exit_live_vol: Option<f64>,
    pub exit_expected_vol: Option<f64>,
    pub pnl: Option<f64>,
}

impl TradeRecord {
    pub fn opened(pos: &Position) -> Self {
        TradeRecord {
            id: None,
            event_id: pos.key.event_id.clone(),
            side: pos.key.side,
            league: pos.league.clone(),
            direction: pos.position_type.to_string(),
            size: pos.size,
            initial_deviation: pos.initial_deviation,
            entry_live_vol: pos.initial_live_vol,
            entry_expected_vol: pos.initial_expected_vol,
            entry_score_diff: pos.entry_score_diff,
            entry_prob: pos.entry_prob,
            status: "open".into(),
            opened_at: pos.entry_time,
            closed_at: None,
            exit_reason: None,
            exit_live_vol: None,
            exit_expected_vol: None,
            pnl: None,
        }
    }
}

/// Exit details written back onto an open trade row
#[derive(Debug, Clone, PartialEq)]
pub struct TradeExit {
    pub reason: ExitReason,
    pub live_vol: f64,
    pub expected_vol: f64,
    pub pnl: f64,
    pub closed_at: DateTime<Utc>,
}
