use anyhow::Result;
use async_trait::async_trait;

use super::position::Direction;
use super::signal::{Action, MIN_CONFIDENCE};
use super::volatility::VolatilityMeasurement;

/// What the advisor sees about a candidate entry.
#[derive(Debug, Clone)]
pub struct AdvisoryContext {
    pub league: String,
    pub measurement: VolatilityMeasurement,
    pub score_diff: f64,
    pub game_clock: Option<String>,
    pub threshold: f64,
    /// Direction the signal evaluator proposes
    pub proposed: Direction,
}

impl AdvisoryContext {
    /// Textual summary of the computed metrics, suitable for a model prompt.
    pub fn summary(&self) -> String {
        let m = &self.measurement;
        format!(
            "LIVE MARKET STATE (exchange)\n\
             Event: {} ({})\n\
             Side: {}\n\
             Game Clock: {}\n\
             Score Differential: {:+.1}\n\
             Time Elapsed: {:.1}%\n\
             Current Probability: {:.3}\n\
             Pregame Implied Vol: {:.2}\n\
             Live Implied Vol: {:.2}\n\
             Expected Vol: {:.2}\n\
             Vol Deviation: {:.1}% (threshold {:.1}%)\n\
             Proposed Action: {}",
            m.key.event_id,
            self.league,
            if m.key.side.index() == 0 { "Away" } else { "Home" },
            self.game_clock.as_deref().unwrap_or("N/A"),
            self.score_diff,
            m.time_elapsed * 100.0,
            m.probability.value(),
            m.pregame_vol,
            m.live_vol,
            m.expected_vol,
            m.deviation_pct,
            self.threshold,
            self.proposed,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advice {
    /// In [0, 1]
    pub confidence: f64,
    pub recommendation: Action,
}

impl Advice {
    pub fn no_action() -> Self {
        Advice {
            confidence: 0.0,
            recommendation: Action::NoAction,
        }
    }

    /// Reject confidences outside [0, 1] (or NaN).
    pub fn validated(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.confidence) {
            anyhow::bail!("advisor confidence {} outside [0, 1]", self.confidence);
        }
        Ok(self)
    }

    /// Whether this advice backs entering `proposed`.
    pub fn endorses(&self, proposed: Direction) -> bool {
        self.confidence >= MIN_CONFIDENCE && self.recommendation == Action::from(proposed)
    }
}

/// Opaque source of entry confidence (rules, a model, a human...).
///
/// Callers bound each call with a timeout and treat timeouts and errors as
/// NO_ACTION.
#[async_trait]
pub trait ConfidenceSource: Send + Sync {
    async fn confidence_of(&self, context: &AdvisoryContext) -> Result<Advice>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Deterministic advisor.
///
/// Confidence grows with how far past the threshold the deviation is and is
/// discounted in the closing stretch, where the √(1−t) decay makes the
/// volatility estimates noisy.
#[derive(Debug, Clone)]
pub struct RuleBasedAdvisor {
    /// Deviation multiple (|dev| / threshold) that earns full strength
    pub full_strength_multiple: f64,
    /// Fraction of the game after which confidence is discounted
    pub late_game_cutoff: f64,
    pub late_game_discount: f64,
}

impl Default for RuleBasedAdvisor {
    fn default() -> Self {
        RuleBasedAdvisor {
            full_strength_multiple: 4.0,
            late_game_cutoff: 0.9,
            late_game_discount: 0.8,
        }
    }
}

impl RuleBasedAdvisor {
    pub fn score(&self, context: &AdvisoryContext) -> Advice {
        let m = &context.measurement;
        if !(context.threshold > 0.0) {
            return Advice::no_action();
        }
        let multiple = m.deviation_pct.abs() / context.threshold;
        let strength = (multiple / self.full_strength_multiple).clamp(0.0, 1.0);
        let mut confidence = 0.55 + 0.45 * strength;
        if m.time_elapsed > self.late_game_cutoff {
            confidence *= self.late_game_discount;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let recommendation = if confidence >= MIN_CONFIDENCE {
            Action::from(context.proposed)
        } else {
            Action::NoAction
        };
        Advice {
            confidence,
            recommendation,
        }
    }
}

#[async_trait]
impl ConfidenceSource for RuleBasedAdvisor {
    async fn confidence_of(&self, context: &AdvisoryContext) -> Result<Advice> {
        Ok(self.score(context))
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::probability::TradeableProbability;
    use crate::market::{EventSide, PriceFormat, Side};
    use approx::assert_relative_eq;

    fn context(deviation_pct: f64, time_elapsed: f64) -> AdvisoryContext {
        AdvisoryContext {
            league: "NBA".into(),
            measurement: VolatilityMeasurement {
                key: EventSide::new("e1", Side::Away),
                time_elapsed,
                probability: TradeableProbability::from_quote(35.0, PriceFormat::ZeroToHundred)
                    .unwrap(),
                pregame_vol: 12.0,
                live_vol: 10.0,
                expected_vol: 9.0,
                deviation_pct,
            },
            score_diff: -4.0,
            game_clock: Some("5:00 3Q".into()),
            threshold: 1.5,
            proposed: Direction::SellVol,
        }
    }

    #[test]
    fn summary_mentions_metrics() {
        let s = context(11.1, 0.6).summary();
        assert!(s.contains("Event: e1 (NBA)"));
        assert!(s.contains("Side: Away"));
        assert!(s.contains("Vol Deviation: 11.1%"));
        assert!(s.contains("Proposed Action: SELL_VOL"));
        assert!(s.contains("Game Clock: 5:00 3Q"));
    }

    #[test]
    fn strong_deviation_earns_full_confidence() {
        let advice = RuleBasedAdvisor::default().score(&context(12.0, 0.5));
        assert_relative_eq!(advice.confidence, 1.0, epsilon = 1e-12);
        assert_eq!(advice.recommendation, Action::SellVol);
        assert!(advice.endorses(Direction::SellVol));
        assert!(!advice.endorses(Direction::BuyVol));
    }

    #[test]
    fn marginal_deviation_is_not_endorsed() {
        // multiple 1 → strength 0.25 → 0.6625
        let advice = RuleBasedAdvisor::default().score(&context(1.5, 0.5));
        assert_relative_eq!(advice.confidence, 0.6625, epsilon = 1e-12);
        assert_eq!(advice.recommendation, Action::NoAction);
    }

    #[test]
    fn late_game_discount() {
        let advice = RuleBasedAdvisor::default().score(&context(12.0, 0.95));
        assert_relative_eq!(advice.confidence, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn validation_rejects_out_of_range() {
        let bad = Advice {
            confidence: 1.2,
            recommendation: Action::BuyVol,
        };
        assert!(bad.validated().is_err());
        let nan = Advice {
            confidence: f64::NAN,
            recommendation: Action::BuyVol,
        };
        assert!(nan.validated().is_err());
        assert!(Advice::no_action().validated().is_ok());
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let advisor: Box<dyn ConfidenceSource> = Box::new(RuleBasedAdvisor::default());
        let advice = advisor.confidence_of(&context(12.0, 0.2)).await.unwrap();
        assert_eq!(advice.recommendation, Action::SellVol);
        assert_eq!(advisor.name(), "rule-based");
    }
}
