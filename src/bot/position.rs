use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::error::VolError;
use crate::league::LeagueProfile;
use crate::market::EventSide;

/// Exit once the gap has shrunk below this fraction of the entry gap.
const MEAN_REVERSION_FRACTION: f64 = 0.3;
/// Exit once the gap has grown beyond this multiple of the entry gap.
const STOP_LOSS_MULTIPLE: f64 = 1.5;
const MIN_ENTRY_GAP: f64 = 1e-9;

/// Which way a position is betting on volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    BuyVol,
    SellVol,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::BuyVol => f.write_str("BUY_VOL"),
            Direction::SellVol => f.write_str("SELL_VOL"),
        }
    }
}

/// Why a position was closed. Variant order is the evaluation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    MeanReversion,
    StopLoss,
    TimeBased,
    GameState,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::MeanReversion => "MEAN_REVERSION",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TimeBased => "TIME_BASED",
            ExitReason::GameState => "GAME_STATE",
        };
        f.write_str(s)
    }
}

/// Decision made by the position manager for an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Hold – no action needed
    Hold,
    Exit(ExitReason),
}

impl ExitDecision {
    pub fn should_exit(self) -> bool {
        matches!(self, ExitDecision::Exit(_))
    }

    pub fn reason(self) -> Option<ExitReason> {
        match self {
            ExitDecision::Hold => None,
            ExitDecision::Exit(r) => Some(r),
        }
    }
}

/// An open volatility position. Never mutated after open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub key: EventSide,
    pub league: String,
    pub entry_time: DateTime<Utc>,
    pub position_type: Direction,
    /// Currency units committed
    pub size: f64,
    /// |σ_iv,t − σ_e,t| at entry
    pub initial_deviation: f64,
    pub initial_live_vol: f64,
    pub initial_expected_vol: f64,
    pub entry_score_diff: f64,
    pub entry_prob: f64,
    /// Copied from the league profile at open time
    pub max_hold_minutes: f64,
    /// Copied from the league profile at open time
    pub score_shock_threshold: f64,
}

impl Position {
    pub fn minutes_held(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_milliseconds() as f64 / 60_000.0
    }

    /// Simplified PnL proxy, not a marked-to-market valuation:
    ///
    ///   pnl = size × (entry_gap − exit_gap) / entry_gap
    ///
    /// negated for SELL_VOL. `None` when the entry gap is zero.
    pub fn realized_pnl(&self, exit_live_vol: f64, exit_expected_vol: f64) -> Option<f64> {
        let entry_gap = (self.initial_live_vol - self.initial_expected_vol).abs();
        if entry_gap < MIN_ENTRY_GAP {
            return None;
        }
        let exit_gap = (exit_live_vol - exit_expected_vol).abs();
        let pnl = self.size * (entry_gap - exit_gap) / entry_gap;
        Some(match self.position_type {
            Direction::BuyVol => pnl,
            Direction::SellVol => -pnl,
        })
    }
}

/// Everything needed to open a position, as measured at entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub key: EventSide,
    pub league: String,
    pub position_type: Direction,
    pub size: f64,
    pub live_vol: f64,
    pub expected_vol: f64,
    pub score_diff: f64,
    pub probability: f64,
}

/// Current market state supplied on each exit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitCheck {
    pub live_vol: f64,
    pub expected_vol: f64,
    pub score_diff: f64,
    pub now: DateTime<Utc>,
}

/// Evaluate the exit triggers for a position. First match wins:
/// mean reversion, stop loss, time limit, game-state shock.
pub fn evaluate_exit(pos: &Position, check: &ExitCheck) -> ExitDecision {
    let gap = (check.live_vol - check.expected_vol).abs();

    if gap < MEAN_REVERSION_FRACTION * pos.initial_deviation {
        ExitDecision::Exit(ExitReason::MeanReversion)
    } else if gap > STOP_LOSS_MULTIPLE * pos.initial_deviation {
        ExitDecision::Exit(ExitReason::StopLoss)
    } else if pos.minutes_held(check.now) >= pos.max_hold_minutes {
        ExitDecision::Exit(ExitReason::TimeBased)
    } else if (check.score_diff - pos.entry_score_diff).abs() > pos.score_shock_threshold {
        ExitDecision::Exit(ExitReason::GameState)
    } else {
        ExitDecision::Hold
    }
}

/// Owns the open positions, at most one per (event, side).
///
/// Each key is either absent or open; close returns it to absent and a
/// fresh position may be opened afterwards.
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: HashMap<EventSide, Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a position. Fails if the key is already open.
    pub fn open_position(
        &mut self,
        req: OpenRequest,
        profile: &LeagueProfile,
        now: DateTime<Utc>,
    ) -> Result<&Position, VolError> {
        use std::collections::hash_map::Entry;

        match self.positions.entry(req.key.clone()) {
            Entry::Occupied(_) => Err(VolError::PositionAlreadyOpen(req.key)),
            Entry::Vacant(slot) => {
                let position = Position {
                    key: req.key,
                    league: req.league,
                    entry_time: now,
                    position_type: req.position_type,
                    size: req.size,
                    initial_deviation: (req.live_vol - req.expected_vol).abs(),
                    initial_live_vol: req.live_vol,
                    initial_expected_vol: req.expected_vol,
                    entry_score_diff: req.score_diff,
                    entry_prob: req.probability,
                    max_hold_minutes: profile.max_hold_minutes,
                    score_shock_threshold: profile.score_shock_threshold,
                };
                info!(
                    "Opened {} position for {} size={:.2}",
                    position.position_type, position.key, position.size
                );
                Ok(slot.insert(position))
            }
        }
    }

    /// Pure query: does the open position at `key` need closing?
    pub fn check_exit_conditions(
        &self,
        key: &EventSide,
        check: &ExitCheck,
    ) -> Result<ExitDecision, VolError> {
        self.positions
            .get(key)
            .map(|pos| evaluate_exit(pos, check))
            .ok_or_else(|| VolError::NoOpenPosition(key.clone()))
    }

    /// Remove and return the position. Closing an absent key is a no-op.
    pub fn close_position(&mut self, key: &EventSide, reason: ExitReason) -> Option<Position> {
        let position = self.positions.remove(key);
        if position.is_some() {
            info!("Closed position for {}: {}", key, reason);
        }
        position
    }

    /// Drop an open position without an exit, undoing an open whose
    /// bookkeeping failed.
    pub fn discard(&mut self, key: &EventSide) -> Option<Position> {
        let position = self.positions.remove(key);
        if position.is_some() {
            warn!("Discarded position for {}", key);
        }
        position
    }

    pub fn get_position(&self, key: &EventSide) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn has_position(&self, key: &EventSide) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }
}
