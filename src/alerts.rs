use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::info;

use crate::bot::position::{Direction, ExitReason};
use crate::bot::volatility::VolatilityMeasurement;
use crate::market::EventSide;

/// Payload handed to the output collaborator when a position opens.
#[derive(Debug, Clone)]
pub struct EntryAlert {
    pub league: String,
    pub direction: Direction,
    /// Currency units
    pub size: f64,
    /// Percent of capital
    pub size_pct: f64,
    pub confidence: f64,
    pub measurement: VolatilityMeasurement,
    pub score_diff: f64,
    pub game_clock: Option<String>,
}

impl EntryAlert {
    pub fn render(&self) -> String {
        let m = &self.measurement;
        format!(
            "ENTRY {} {} ({}) size=${:.2} ({:.1}%) conf={:.0}% | live={:.2} expected={:.2} dev={:+.1}% | clock={} score={:+.1} p={:.3}",
            self.direction,
            m.key,
            self.league,
            self.size,
            self.size_pct,
            self.confidence * 100.0,
            m.live_vol,
            m.expected_vol,
            m.deviation_pct,
            self.game_clock.as_deref().unwrap_or("N/A"),
            self.score_diff,
            m.probability.value(),
        )
    }
}

/// Payload handed to the output collaborator when a position closes.
#[derive(Debug, Clone)]
pub struct ExitAlert {
    pub key: EventSide,
    pub league: String,
    pub direction: Direction,
    pub reason: ExitReason,
    pub pnl: f64,
    pub total_pnl: f64,
    /// `None` when the position expired without a usable live mark
    pub measurement: Option<VolatilityMeasurement>,
    pub score_diff: f64,
    pub game_clock: Option<String>,
}

impl ExitAlert {
    pub fn render(&self) -> String {
        let mark = match &self.measurement {
            Some(m) => format!(
                "live={:.2} expected={:.2} dev={:+.1}%",
                m.live_vol, m.expected_vol, m.deviation_pct
            ),
            None => "no live mark".to_string(),
        };
        format!(
            "EXIT {} {} ({}) reason={} pnl=${:+.2} total=${:+.2} | {} | clock={} score={:+.1}",
            self.direction,
            self.key,
            self.league,
            self.reason,
            self.pnl,
            self.total_pnl,
            mark,
            self.game_clock.as_deref().unwrap_or("N/A"),
            self.score_diff,
        )
    }
}

/// Both sides' pregame volatility for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct PregameGame {
    pub event_id: String,
    pub league: String,
    /// Home spread as quoted
    pub spread: f64,
    pub home_vol: f64,
    pub away_vol: f64,
}

/// Baselines computed in one pass over the pregame lines.
#[derive(Debug, Clone, PartialEq)]
pub struct PregameSummary {
    pub generated_at: DateTime<Utc>,
    /// Event+side baselines newly stored
    pub sides_added: usize,
    pub games: Vec<PregameGame>,
}

impl PregameSummary {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        PregameSummary {
            generated_at,
            sides_added: 0,
            games: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Multi-line report grouped by league.
    pub fn render(&self) -> String {
        let mut by_league: BTreeMap<&str, Vec<&PregameGame>> = BTreeMap::new();
        for game in &self.games {
            by_league.entry(game.league.as_str()).or_default().push(game);
        }

        let mut out = format!(
            "Pregame Volatility Summary\n{}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for (league, games) in by_league {
            let _ = writeln!(out, "\n{} Games ({})", league, games.len());
            for g in games {
                let _ = writeln!(
                    out,
                    "event {} spread {:+.1}: home vol {:.2}, away vol {:.2}",
                    g.event_id, g.spread, g.home_vol, g.away_vol
                );
            }
        }
        out
    }
}

/// Output collaborator: execution, messaging, dashboards...
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn on_entry(&self, alert: &EntryAlert) -> Result<()>;
    async fn on_exit(&self, alert: &ExitAlert) -> Result<()>;
    async fn on_pregame_summary(&self, summary: &PregameSummary) -> Result<()>;
}

/// Writes alerts to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn on_entry(&self, alert: &EntryAlert) -> Result<()> {
        info!("{}", alert.render());
        Ok(())
    }

    async fn on_exit(&self, alert: &ExitAlert) -> Result<()> {
        info!("{}", alert.render());
        Ok(())
    }

    async fn on_pregame_summary(&self, summary: &PregameSummary) -> Result<()> {
        info!("{}", summary.render());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::probability::TradeableProbability;
    use crate::market::{PriceFormat, Side};
    use chrono::TimeZone;

    fn measurement() -> VolatilityMeasurement {
        VolatilityMeasurement {
            key: EventSide::new("401", Side::Home),
            time_elapsed: 0.5,
            probability: TradeableProbability::from_quote(70.0, PriceFormat::ZeroToHundred)
                .unwrap(),
            pregame_vol: 10.4,
            live_vol: 36.4,
            expected_vol: 7.34,
            deviation_pct: 395.9,
        }
    }

    fn exit_alert(measurement: Option<VolatilityMeasurement>) -> ExitAlert {
        ExitAlert {
            key: EventSide::new("401", Side::Home),
            league: "NBA".into(),
            direction: Direction::SellVol,
            reason: ExitReason::TimeBased,
            pnl: -3.5,
            total_pnl: 12.25,
            measurement,
            score_diff: 10.0,
            game_clock: None,
        }
    }

    #[test]
    fn entry_render() {
        let alert = EntryAlert {
            league: "NBA".into(),
            direction: Direction::SellVol,
            size: 72.0,
            size_pct: 7.2,
            confidence: 0.9,
            measurement: measurement(),
            score_diff: 10.0,
            game_clock: Some("12:00 3Q".into()),
        };
        let s = alert.render();
        assert!(s.starts_with("ENTRY SELL_VOL event 401 side 1 (NBA)"), "{}", s);
        assert!(s.contains("size=$72.00 (7.2%)"));
        assert!(s.contains("conf=90%"));
        assert!(s.contains("clock=12:00 3Q"));
        assert!(s.contains("p=0.700"));
    }

    #[test]
    fn exit_render_with_and_without_mark() {
        let s = exit_alert(Some(measurement())).render();
        assert!(s.contains("reason=TIME_BASED"));
        assert!(s.contains("pnl=$-3.50 total=$+12.25"));
        assert!(s.contains("live=36.40"));
        assert!(s.contains("clock=N/A"));

        let s = exit_alert(None).render();
        assert!(s.contains("EXIT SELL_VOL event 401 side 1"));
        assert!(s.contains("no live mark"));
    }

    #[test]
    fn pregame_summary_groups_by_league() {
        let mut summary = PregameSummary::new(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        assert!(summary.is_empty());
        for (event, league) in [("n1", "NFL"), ("b1", "NBA"), ("b2", "NBA")] {
            summary.games.push(PregameGame {
                event_id: event.into(),
                league: league.into(),
                spread: -7.0,
                home_vol: 10.38,
                away_vol: 10.38,
            });
        }
        let s = summary.render();
        assert!(s.contains("2024-03-02 00:00:00 UTC"));
        let nba = s.find("NBA Games (2)").unwrap();
        let nfl = s.find("NFL Games (1)").unwrap();
        assert!(nba < nfl);
        assert!(s.contains("event b2 spread -7.0: home vol 10.38, away vol 10.38"));
    }

    #[tokio::test]
    async fn log_sink_accepts_every_alert() {
        let sink: Box<dyn AlertSink> = Box::new(LogAlertSink);
        sink.on_exit(&exit_alert(None)).await.unwrap();
        sink.on_exit(&exit_alert(Some(measurement()))).await.unwrap();
        sink.on_pregame_summary(&PregameSummary::new(Utc::now()))
            .await
            .unwrap();
    }
}
