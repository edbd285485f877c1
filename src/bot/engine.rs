use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertSink, EntryAlert, ExitAlert, PregameGame, PregameSummary};
use crate::db::models::{PregameBaseline, TradeExit, TradeRecord};
use crate::db::Database;
use crate::error::VolError;
use crate::league::LeagueTable;
use crate::market::{EventSide, MarketQuote, MarketSnapshot, PregameLine};

use super::advisory::{Advice, AdvisoryContext, ConfidenceSource};
use super::position::{
    ExitCheck, ExitDecision, ExitReason, OpenRequest, Position, PositionManager,
};
use super::signal::{evaluate_measurement, position_size_pct};
use super::volatility::{measure, pregame_baselines, VolatilityMeasurement};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Capital that position size percentages apply to
    pub initial_capital: f64,
    /// Upper bound on one advisory call
    pub advisory_timeout: Duration,
}

/// Counters for one evaluation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub baselines_added: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub signals: usize,
    pub opened: usize,
    pub closed: usize,
}

/// Market state at which a position is closed.
struct ExitMark {
    live_vol: f64,
    expected_vol: f64,
    pnl: f64,
    measurement: Option<VolatilityMeasurement>,
    score_diff: f64,
    game_clock: Option<String>,
}

/// Composes measurement, signal, advisory and position management for every
/// live quote, once per cycle. Exits are processed before entries.
pub struct VolatilityEngine {
    settings: EngineSettings,
    leagues: LeagueTable,
    positions: PositionManager,
    /// Pregame σ per event+side, fixed once computed.
    baselines: HashMap<EventSide, PregameBaseline>,
    /// Journal row id per open position.
    trade_ids: HashMap<EventSide, i64>,
    db: Database,
    advisor: Arc<dyn ConfidenceSource>,
    alerts: Arc<dyn AlertSink>,
    total_pnl: f64,
}

impl VolatilityEngine {
    pub fn new(
        settings: EngineSettings,
        leagues: LeagueTable,
        db: Database,
        advisor: Arc<dyn ConfidenceSource>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self> {
        let abandoned = db.abandon_open_trades()?;
        if abandoned > 0 {
            warn!(
                "Marked {} open trade(s) from a previous run as abandoned",
                abandoned
            );
        }
        let baselines: HashMap<EventSide, PregameBaseline> = db
            .load_baselines()?
            .into_iter()
            .map(|b| (b.key.clone(), b))
            .collect();
        if !baselines.is_empty() {
            info!("Loaded {} pregame baseline(s)", baselines.len());
        }
        info!(
            "Volatility engine ready: capital=${:.2}, advisor={}, leagues={}",
            settings.initial_capital,
            advisor.name(),
            leagues.len()
        );
        Ok(VolatilityEngine {
            settings,
            leagues,
            positions: PositionManager::new(),
            baselines,
            trade_ids: HashMap::new(),
            db,
            advisor,
            alerts,
            total_pnl: 0.0,
        })
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    pub fn baseline(&self, key: &EventSide) -> Option<&PregameBaseline> {
        self.baselines.get(key)
    }

    /// One full pass over a snapshot: baselines, exits, then entries.
    ///
    /// Nothing here is fatal. Per-quote problems and journal failures are
    /// logged and the cycle moves on to the next quote.
    pub async fn run_cycle(
        &mut self,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> CycleSummary {
        let pregame = self.ingest_pregame(&snapshot.pregame, now);
        let mut summary = CycleSummary {
            baselines_added: pregame.sides_added,
            ..CycleSummary::default()
        };
        if !pregame.is_empty() {
            if let Err(e) = self.alerts.on_pregame_summary(&pregame).await {
                warn!("Pregame summary alert failed: {}", e);
            }
        }

        let mut marked = HashSet::new();
        for quote in &snapshot.live {
            let key = quote.key();
            if !self.positions.has_position(&key) {
                continue;
            }
            if self.manage_exit(quote, now, &mut summary).await {
                marked.insert(key);
            }
        }
        self.expire_unmarked(&marked, now, &mut summary).await;

        for quote in &snapshot.live {
            if !self.positions.has_position(&quote.key()) {
                self.consider_entry(quote, now, &mut summary).await;
            }
        }

        debug!("Cycle complete: {:?}", summary);
        summary
    }

    /// Compute baselines for lines not seen before.
    ///
    /// A side whose baseline cannot be journaled is left out and retried on
    /// the next pass.
    pub fn ingest_pregame(
        &mut self,
        lines: &[PregameLine],
        now: DateTime<Utc>,
    ) -> PregameSummary {
        let mut summary = PregameSummary::new(now);
        for line in lines {
            if let Err(e) = self.leagues.get(&line.league) {
                debug!("Skipping pregame line for event {}: {}", line.event_id, e);
                continue;
            }
            let baselines = match pregame_baselines(line, now) {
                Ok(b) => b,
                Err(e) => {
                    debug!("No pregame baseline for event {}: {}", line.event_id, e);
                    continue;
                }
            };

            let mut added = 0;
            for baseline in &baselines {
                if self.baselines.contains_key(&baseline.key) {
                    continue;
                }
                if let Err(e) = self.db.insert_baseline(baseline) {
                    error!("Failed to journal baseline for {}: {:#}", baseline.key, e);
                    continue;
                }
                info!(
                    "Pregame baseline {} ({}): σ={:.2} spread={:+.1}",
                    baseline.key, baseline.league, baseline.pregame_vol, baseline.raw_spread
                );
                self.baselines.insert(baseline.key.clone(), baseline.clone());
                added += 1;
            }

            if added > 0 {
                let [away, home] = &baselines;
                summary.sides_added += added;
                summary.games.push(PregameGame {
                    event_id: line.event_id.clone(),
                    league: line.league.clone(),
                    spread: line.home_spread,
                    home_vol: home.pregame_vol,
                    away_vol: away.pregame_vol,
                });
            }
        }
        summary
    }

    /// Measure a live quote against its stored baseline.
    pub fn measure(&self, quote: &MarketQuote) -> Result<VolatilityMeasurement, VolError> {
        let profile = self.leagues.get(&quote.league)?;
        let key = quote.key();
        let baseline = self
            .baselines
            .get(&key)
            .ok_or(VolError::MissingBaseline(key))?;
        measure(quote, baseline, profile)
    }

    fn log_skip(quote: &MarketQuote, err: &VolError, summary: &mut CycleSummary) {
        summary.skipped += 1;
        match err {
            VolError::NonTradeableQuote(_) => warn!("Refusing {}: {}", quote.key(), err),
            _ => debug!("Skipping {}: {}", quote.key(), err),
        }
    }

    /// Check an open position against its live quote. Returns whether the
    /// quote gave a usable mark.
    async fn manage_exit(
        &mut self,
        quote: &MarketQuote,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) -> bool {
        let key = quote.key();
        let m = match self.measure(quote) {
            Ok(m) => m,
            Err(e) => {
                Self::log_skip(quote, &e, summary);
                return false;
            }
        };
        summary.evaluated += 1;

        let check = ExitCheck {
            live_vol: m.live_vol,
            expected_vol: m.expected_vol,
            score_diff: quote.score_diff.unwrap_or_default(),
            now,
        };
        let reason = match self.positions.check_exit_conditions(&key, &check) {
            Ok(ExitDecision::Hold) => return true,
            Ok(ExitDecision::Exit(reason)) => reason,
            Err(e) => {
                Self::log_skip(quote, &e, summary);
                return true;
            }
        };

        let Some(position) = self.positions.close_position(&key, reason) else {
            return true;
        };
        let pnl = position
            .realized_pnl(m.live_vol, m.expected_vol)
            .unwrap_or_else(|| {
                warn!("Zero entry gap for {}; booking PnL as 0", key);
                0.0
            });
        let mark = ExitMark {
            live_vol: m.live_vol,
            expected_vol: m.expected_vol,
            pnl,
            measurement: Some(m),
            score_diff: check.score_diff,
            game_clock: quote.game_clock.clone(),
        };
        self.book_exit(position, reason, mark, now, summary).await;
        true
    }

    /// Positions with no usable mark this cycle (quote gone, final whistle,
    /// unreadable clock) can still hit their time limit.
    async fn expire_unmarked(
        &mut self,
        marked: &HashSet<EventSide>,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) {
        let unmarked: Vec<EventSide> = self
            .positions
            .positions()
            .filter(|p| !marked.contains(&p.key))
            .map(|p| p.key.clone())
            .collect();

        for key in unmarked {
            let Some(pos) = self.positions.get_position(&key) else {
                continue;
            };
            // At the entry mark only the time limit can fire.
            let check = ExitCheck {
                live_vol: pos.initial_live_vol,
                expected_vol: pos.initial_expected_vol,
                score_diff: pos.entry_score_diff,
                now,
            };
            let reason = match self.positions.check_exit_conditions(&key, &check) {
                Ok(ExitDecision::Exit(reason)) => reason,
                _ => {
                    warn!("No live mark for open position {}", key);
                    continue;
                }
            };
            let Some(position) = self.positions.close_position(&key, reason) else {
                continue;
            };
            warn!(
                "{} expired after {:.0} min without a live mark; booking PnL as 0",
                key,
                position.minutes_held(now)
            );
            let mark = ExitMark {
                live_vol: position.initial_live_vol,
                expected_vol: position.initial_expected_vol,
                pnl: 0.0,
                measurement: None,
                score_diff: position.entry_score_diff,
                game_clock: None,
            };
            self.book_exit(position, reason, mark, now, summary).await;
        }
    }

    /// Book a closed position: PnL, journal and alert. A journal failure is
    /// logged and the alert still goes out.
    async fn book_exit(
        &mut self,
        position: Position,
        reason: ExitReason,
        mark: ExitMark,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) {
        self.total_pnl += mark.pnl;
        summary.closed += 1;
        let key = &position.key;

        if let Some(id) = self.trade_ids.remove(key) {
            let exit = TradeExit {
                reason,
                live_vol: mark.live_vol,
                expected_vol: mark.expected_vol,
                pnl: mark.pnl,
                closed_at: now,
            };
            if let Err(e) = self.db.close_trade(id, &exit) {
                error!("Failed to journal exit of {} (trade {}): {:#}", key, id, e);
            }
        }

        let alert = ExitAlert {
            key: key.clone(),
            league: position.league.clone(),
            direction: position.position_type,
            reason,
            pnl: mark.pnl,
            total_pnl: self.total_pnl,
            measurement: mark.measurement,
            score_diff: mark.score_diff,
            game_clock: mark.game_clock,
        };
        if let Err(e) = self.alerts.on_exit(&alert).await {
            warn!("Exit alert for {} failed: {}", key, e);
        }
        info!(
            "Closed {} {}: reason={} pnl=${:.2} total_pnl=${:.2}",
            position.position_type, key, reason, mark.pnl, self.total_pnl
        );
    }

    async fn consider_entry(
        &mut self,
        quote: &MarketQuote,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) {
        let key = quote.key();
        let m = match self.measure(quote) {
            Ok(m) => m,
            Err(e) => {
                Self::log_skip(quote, &e, summary);
                return;
            }
        };
        summary.evaluated += 1;

        // measure() already resolved the league, so this lookup cannot miss.
        let profile = match self.leagues.get(&quote.league) {
            Ok(p) => p.clone(),
            Err(e) => {
                Self::log_skip(quote, &e, summary);
                return;
            }
        };
        let signal = match evaluate_measurement(&m, &profile) {
            Ok(s) => s,
            Err(e) => {
                Self::log_skip(quote, &e, summary);
                return;
            }
        };
        let Some(direction) = signal.action.direction() else {
            debug!(
                "{}: dev={:+.2}% within ±{:.2}%",
                key, signal.deviation_pct, signal.threshold
            );
            return;
        };
        summary.signals += 1;

        let score_diff = quote.score_diff.unwrap_or_default();
        let context = AdvisoryContext {
            league: quote.league.clone(),
            measurement: m.clone(),
            score_diff,
            game_clock: quote.game_clock.clone(),
            threshold: signal.threshold,
            proposed: direction,
        };
        let advice = self.advise(&context).await;
        if !advice.endorses(direction) {
            info!(
                "{} {} not endorsed: confidence={:.2} recommendation={}",
                direction, key, advice.confidence, advice.recommendation
            );
            return;
        }

        let Some(size_pct) = position_size_pct(&profile, advice.confidence, signal.deviation_pct)
        else {
            return;
        };
        let size = size_pct / 100.0 * self.settings.initial_capital;

        let request = OpenRequest {
            key: key.clone(),
            league: quote.league.clone(),
            position_type: direction,
            size,
            live_vol: m.live_vol,
            expected_vol: m.expected_vol,
            score_diff,
            probability: m.probability.value(),
        };
        let record = match self.positions.open_position(request, &profile, now) {
            Ok(pos) => TradeRecord::opened(pos),
            Err(e) => {
                Self::log_skip(quote, &e, summary);
                return;
            }
        };
        match self.db.insert_trade(&record) {
            Ok(id) => {
                self.trade_ids.insert(key.clone(), id);
            }
            Err(e) => {
                // A position missing from the journal could never be closed on the books.
                error!("Failed to journal entry for {}: {:#}; discarding it", key, e);
                self.positions.discard(&key);
                summary.skipped += 1;
                return;
            }
        }
        summary.opened += 1;

        let alert = EntryAlert {
            league: quote.league.clone(),
            direction,
            size,
            size_pct,
            confidence: advice.confidence,
            measurement: m,
            score_diff,
            game_clock: quote.game_clock.clone(),
        };
        if let Err(e) = self.alerts.on_entry(&alert).await {
            warn!("Entry alert for {} failed: {}", key, e);
        }
    }

    /// Ask the advisor, falling back to NO_ACTION on timeout, error or an
    /// out-of-range confidence.
    async fn advise(&self, context: &AdvisoryContext) -> Advice {
        let key = &context.measurement.key;
        match tokio::time::timeout(
            self.settings.advisory_timeout,
            self.advisor.confidence_of(context),
        )
        .await
        {
            Ok(Ok(advice)) => match advice.validated() {
                Ok(advice) => advice,
                Err(e) => {
                    warn!("Advisor {} returned bad advice for {}: {}", self.advisor.name(), key, e);
                    Advice::no_action()
                }
            },
            Ok(Err(e)) => {
                warn!("Advisor {} failed for {}: {}", self.advisor.name(), key, e);
                Advice::no_action()
            }
            Err(_) => {
                warn!(
                    "Advisor {} timed out after {:?} for {}",
                    self.advisor.name(),
                    self.settings.advisory_timeout,
                    key
                );
                Advice::no_action()
            }
        }
    }
}
