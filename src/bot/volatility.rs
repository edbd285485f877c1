//! Polson–Stern implied volatility of the final scoring margin.
//!
//! Model: the home margin follows a Brownian motion with drift μ (the
//! pregame spread) and volatility σ over one unit of game time, so
//!
//!   P(win | lead l at time t) = Φ((l + μ(1−t)) / (σ·√(1−t)))
//!
//! Inverting for σ gives:
//! - pregame:   σ_iv   = |μ / Φ⁻¹(p)|
//! - live:      σ_iv,t = |(l + μ(1−t)) / (Φ⁻¹(p_t)·√(1−t))|
//! - expected:  σ_e,t  = σ_iv·√(1−t)   (decay with no new information)
//!
//! The deviation `(σ_iv,t − σ_e,t) / σ_e,t × 100` is the trading signal.
//! Positive: the market prices more uncertainty than the decay model.
//!
//! Every function returns `None` rather than a fabricated number when its
//! inputs are out of domain.

use chrono::{DateTime, Utc};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::db::models::PregameBaseline;
use crate::error::VolError;
use crate::league::LeagueProfile;
use crate::market::clock::fraction_elapsed;
use crate::market::probability::{pregame_probability, TradeableProbability};
use crate::market::{EventSide, MarketQuote, PregameLine, Side};

/// |Φ⁻¹(p)| below this is treated as even money: σ is unidentifiable.
const MIN_QUANTILE: f64 = 1e-6;
const MIN_DENOMINATOR: f64 = 1e-9;

/// Standard normal quantile Φ⁻¹(p), defined for p in (0, 1).
pub fn normal_quantile(p: f64) -> Option<f64> {
    if !(p > 0.0 && p < 1.0) {
        return None;
    }
    let z = Normal::new(0.0, 1.0).ok()?.inverse_cdf(p);
    z.is_finite().then_some(z)
}

fn informative_quantile(p: f64) -> Option<f64> {
    normal_quantile(p).filter(|z| z.abs() >= MIN_QUANTILE)
}

/// Pregame implied volatility `|spread / Φ⁻¹(p)|`.
pub fn pregame_implied_vol(spread: f64, prob: f64) -> Option<f64> {
    if !spread.is_finite() {
        return None;
    }
    let z = informative_quantile(prob)?;
    Some((spread / z).abs())
}

/// Expected margin μ for a side, from the home spread as quoted.
///
/// A quoted home spread of −7 means home is expected to win by 7, so the
/// home side negates it and the away side uses it as is.
pub fn side_spread(raw_spread: f64, side: Side) -> f64 {
    match side {
        Side::Home => -raw_spread,
        Side::Away => raw_spread,
    }
}

/// Live implied volatility.
///
/// * `lead`         – this side's current lead (negative when trailing)
/// * `raw_spread`   – pregame home spread as quoted
/// * `time_elapsed` – fraction of regulation played, in [0, 1)
/// * `prob`         – current exchange-traded win probability for this side
pub fn live_implied_vol(
    lead: f64,
    raw_spread: f64,
    time_elapsed: f64,
    side: Side,
    prob: TradeableProbability,
) -> Option<f64> {
    if !lead.is_finite() || !raw_spread.is_finite() {
        return None;
    }
    if !(0.0..1.0).contains(&time_elapsed) {
        return None;
    }
    let remain = 1.0 - time_elapsed;
    let z = informative_quantile(prob.value())?;
    let denom = z * remain.sqrt();
    if denom.abs() < MIN_DENOMINATOR {
        return None;
    }
    let mu = side_spread(raw_spread, side);
    let vol = ((lead + mu * remain) / denom).abs();
    vol.is_finite().then_some(vol)
}

/// Expected volatility after `time_elapsed` with no new information.
pub fn expected_vol(pregame_vol: f64, time_elapsed: f64) -> Option<f64> {
    if !pregame_vol.is_finite() || pregame_vol < 0.0 {
        return None;
    }
    if !(0.0..1.0).contains(&time_elapsed) {
        return None;
    }
    Some(pregame_vol * (1.0 - time_elapsed).sqrt())
}

/// Signed percentage gap between live and expected volatility.
pub fn deviation_pct(live_vol: f64, expected_vol: f64) -> Option<f64> {
    if expected_vol.abs() < MIN_DENOMINATOR {
        return None;
    }
    let dev = (live_vol - expected_vol) / expected_vol * 100.0;
    dev.is_finite().then_some(dev)
}

/// Both sides' baselines from a consensus pregame line.
///
/// Home uses (spread, p_home); away uses (−spread, 1 − p_home). Any price
/// encoding is accepted here since no trade is taken on it.
pub fn pregame_baselines(
    line: &PregameLine,
    computed_at: DateTime<Utc>,
) -> Result<[PregameBaseline; 2], VolError> {
    let p_home = pregame_probability(line.home_price, line.format)
        .ok_or(VolError::Undefined("pregame price outside its format's domain"))?;
    let home_vol = pregame_implied_vol(line.home_spread, p_home)
        .ok_or(VolError::Undefined("pregame implied volatility"))?;
    let away_vol = pregame_implied_vol(-line.home_spread, 1.0 - p_home)
        .ok_or(VolError::Undefined("pregame implied volatility"))?;

    let make = |side, pregame_vol| PregameBaseline {
        key: EventSide::new(line.event_id.clone(), side),
        league: line.league.clone(),
        raw_spread: line.home_spread,
        pregame_vol,
        computed_at,
    };
    Ok([make(Side::Away, away_vol), make(Side::Home, home_vol)])
}

/// One evaluation of an event+side. Recomputed from scratch every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityMeasurement {
    pub key: EventSide,
    pub time_elapsed: f64,
    pub probability: TradeableProbability,
    pub pregame_vol: f64,
    pub live_vol: f64,
    pub expected_vol: f64,
    pub deviation_pct: f64,
}

impl VolatilityMeasurement {
    /// |σ_iv,t − σ_e,t|, the quantity exits are judged on.
    pub fn abs_gap(&self) -> f64 {
        (self.live_vol - self.expected_vol).abs()
    }
}

/// Measure a live quote against its pregame baseline.
///
/// Fails with `NonTradeableQuote` before anything else if the quote is not
/// in the exchange format.
pub fn measure(
    quote: &MarketQuote,
    baseline: &PregameBaseline,
    profile: &LeagueProfile,
) -> Result<VolatilityMeasurement, VolError> {
    let probability = TradeableProbability::from_quote(quote.price, quote.format)?;
    let clock = quote
        .game_clock
        .as_deref()
        .ok_or(VolError::Undefined("missing game clock"))?;
    let time_elapsed =
        fraction_elapsed(clock, profile).ok_or(VolError::Undefined("unparseable game clock"))?;
    let lead = quote
        .score_diff
        .ok_or(VolError::Undefined("missing score differential"))?;

    let live_vol = live_implied_vol(
        lead,
        baseline.raw_spread,
        time_elapsed,
        quote.side,
        probability,
    )
    .ok_or(VolError::Undefined("live implied volatility"))?;
    let expected_vol = expected_vol(baseline.pregame_vol, time_elapsed)
        .ok_or(VolError::Undefined("expected volatility"))?;
    let deviation_pct =
        deviation_pct(live_vol, expected_vol).ok_or(VolError::Undefined("volatility deviation"))?;

    Ok(VolatilityMeasurement {
        key: quote.key(),
        time_elapsed,
        probability,
        pregame_vol: baseline.pregame_vol,
        live_vol,
        expected_vol,
        deviation_pct,
    })
}
