//! Volatility signal thresholding and risk-scaled position sizing.
//!
//! Size as a percentage of capital:
//!   size% = min(20, 5 × league_mult × min(1, confidence) × min(2, |dev| / threshold))
//!
//! Trades are only sized when the advisory confidence clears
//! [`MIN_CONFIDENCE`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Direction;
use super::volatility::{deviation_pct, VolatilityMeasurement};
use crate::error::VolError;
use crate::league::LeagueProfile;
use crate::market::probability::TradeableProbability;

/// Advisory confidence below this suppresses the trade outright.
pub const MIN_CONFIDENCE: f64 = 0.7;
const BASE_SIZE_PCT: f64 = 5.0;
const MAX_SIZE_PCT: f64 = 20.0;
const MAX_DEVIATION_MULTIPLE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    BuyVol,
    SellVol,
    NoAction,
}

impl Action {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Action::BuyVol => Some(Direction::BuyVol),
            Action::SellVol => Some(Direction::SellVol),
            Action::NoAction => None,
        }
    }
}

impl From<Direction> for Action {
    fn from(d: Direction) -> Self {
        match d {
            Direction::BuyVol => Action::BuyVol,
            Direction::SellVol => Action::SellVol,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::BuyVol => f.write_str("BUY_VOL"),
            Action::SellVol => f.write_str("SELL_VOL"),
            Action::NoAction => f.write_str("NO_ACTION"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub should_trade: bool,
    pub action: Action,
    pub deviation_pct: f64,
    pub threshold: f64,
}

/// Threshold the live/expected deviation for a league.
///
/// `_probability` is the proof that the live volatility came from an
/// exchange-traded quote; there is no way to call this with any other
/// encoding.
pub fn evaluate(
    live_vol: f64,
    expected_vol: f64,
    _probability: TradeableProbability,
    profile: &LeagueProfile,
) -> Result<Signal, VolError> {
    let threshold = profile.vol_threshold;
    let deviation = deviation_pct(live_vol, expected_vol)
        .ok_or(VolError::Undefined("volatility deviation"))?;

    let action = if deviation.abs() < threshold {
        Action::NoAction
    } else if deviation > 0.0 {
        // Market is pricing more uncertainty than the decay model.
        Action::SellVol
    } else {
        Action::BuyVol
    };

    Ok(Signal {
        should_trade: action != Action::NoAction,
        action,
        deviation_pct: deviation,
        threshold,
    })
}

pub fn evaluate_measurement(
    m: &VolatilityMeasurement,
    profile: &LeagueProfile,
) -> Result<Signal, VolError> {
    evaluate(m.live_vol, m.expected_vol, m.probability, profile)
}

/// Position size as a percentage of capital, or `None` when confidence is
/// below [`MIN_CONFIDENCE`] (including NaN).
pub fn position_size_pct(profile: &LeagueProfile, confidence: f64, deviation_pct: f64) -> Option<f64> {
    if !(confidence >= MIN_CONFIDENCE) || !deviation_pct.is_finite() {
        return None;
    }
    let conf_mult = confidence.min(1.0);
    let vol_mult = (deviation_pct.abs() / profile.vol_threshold).min(MAX_DEVIATION_MULTIPLE);
    let size = BASE_SIZE_PCT * profile.size_multiplier * conf_mult * vol_mult;
    Some(size.min(MAX_SIZE_PCT))
}
