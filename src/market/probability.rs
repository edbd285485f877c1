//! Price → probability conversion for every source encoding.

use tracing::warn;

use super::PriceFormat;
use crate::error::VolError;

/// Convert a quoted price to a probability in (0, 1).
///
/// Returns `None` when the price is outside the domain of its format
/// (American 0, decimal ≤ 1, percent/0–100 outside (0, 100), probability
/// outside (0, 1)) or when the format is unknown.
pub fn to_probability(price: f64, format: PriceFormat) -> Option<f64> {
    if !price.is_finite() {
        return None;
    }
    let p = match format {
        PriceFormat::American => {
            if price > 0.0 {
                100.0 / (100.0 + price)
            } else if price < 0.0 {
                price.abs() / (price.abs() + 100.0)
            } else {
                return None;
            }
        }
        PriceFormat::Decimal if price > 1.0 => 1.0 / price,
        PriceFormat::Percent | PriceFormat::ZeroToHundred if price > 0.0 && price < 100.0 => {
            price / 100.0
        }
        PriceFormat::Probability if price > 0.0 && price < 1.0 => price,
        _ => return None,
    };
    Some(p)
}

/// Conversion for pregame summaries, where an unknown encoding falls back to
/// American odds. Never use this for live decisions.
pub fn pregame_probability(price: f64, format: PriceFormat) -> Option<f64> {
    match format {
        PriceFormat::Unknown => {
            warn!(
                "Unknown price format for pregame price {}; assuming American odds",
                price
            );
            to_probability(price, PriceFormat::American)
        }
        other => to_probability(price, other),
    }
}

/// A probability that is known to come from the exchange-traded 0–100 format.
///
/// Live volatility and signal evaluation take this type instead of a bare
/// `f64`, so a probability from any other encoding cannot reach them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeableProbability(f64);

impl TradeableProbability {
    pub fn from_quote(price: f64, format: PriceFormat) -> Result<Self, VolError> {
        if !format.is_tradeable() {
            return Err(VolError::NonTradeableQuote(format));
        }
        to_probability(price, format)
            .map(TradeableProbability)
            .ok_or(VolError::Undefined("exchange price outside (0, 100)"))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exchange_format_is_exact_division() {
        for cents in 1..100 {
            let price = cents as f64;
            assert_eq!(
                to_probability(price, PriceFormat::ZeroToHundred),
                Some(price / 100.0)
            );
        }
        assert_eq!(to_probability(0.5, PriceFormat::ZeroToHundred), Some(0.005));
    }

    #[test]
    fn exchange_format_rejects_boundaries() {
        for price in [0.0, -1.0, 100.0, 100.5, f64::NAN, f64::INFINITY] {
            assert_eq!(to_probability(price, PriceFormat::ZeroToHundred), None);
        }
    }

    #[test]
    fn american_odds() {
        assert_relative_eq!(
            to_probability(150.0, PriceFormat::American).unwrap(),
            0.4,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            to_probability(-150.0, PriceFormat::American).unwrap(),
            0.6,
            epsilon = 1e-12
        );
        assert_eq!(to_probability(0.0, PriceFormat::American), None);
    }

    #[test]
    fn decimal_odds() {
        assert_relative_eq!(
            to_probability(2.5, PriceFormat::Decimal).unwrap(),
            0.4,
            epsilon = 1e-12
        );
        assert_eq!(to_probability(1.0, PriceFormat::Decimal), None);
        assert_eq!(to_probability(0.5, PriceFormat::Decimal), None);
    }

    #[test]
    fn percent_and_probability() {
        assert_eq!(to_probability(62.0, PriceFormat::Percent), Some(0.62));
        assert_eq!(to_probability(0.62, PriceFormat::Probability), Some(0.62));
        assert_eq!(to_probability(1.0, PriceFormat::Probability), None);
        assert_eq!(to_probability(0.0, PriceFormat::Probability), None);
    }

    #[test]
    fn unknown_format_is_undefined_live_but_american_pregame() {
        assert_eq!(to_probability(-150.0, PriceFormat::Unknown), None);
        assert_relative_eq!(
            pregame_probability(-150.0, PriceFormat::Unknown).unwrap(),
            0.6,
            epsilon = 1e-12
        );
    }

    #[test]
    fn tradeable_probability_requires_exchange_format() {
        assert_eq!(
            TradeableProbability::from_quote(0.55, PriceFormat::Probability),
            Err(VolError::NonTradeableQuote(PriceFormat::Probability))
        );
        assert!(matches!(
            TradeableProbability::from_quote(100.0, PriceFormat::ZeroToHundred),
            Err(VolError::Undefined(_))
        ));
        let p = TradeableProbability::from_quote(55.0, PriceFormat::ZeroToHundred).unwrap();
        assert_relative_eq!(p.value(), 0.55, epsilon = 1e-12);
    }
}
