use thiserror::Error;

use crate::market::{EventSide, PriceFormat};

/// Recoverable conditions raised while evaluating one event+side.
///
/// None of these are fatal: the engine logs the error, skips the key and
/// carries on with the rest of the cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VolError {
    /// Inputs were out of domain (time ≥ 1, probability on the boundary,
    /// near-zero denominator, missing clock...).
    #[error("undefined measurement: {0}")]
    Undefined(&'static str),

    /// A live computation was handed a price that did not come from the
    /// exchange-traded 0–100 format.
    #[error("live evaluation requires a tradeable zero_to_hundred quote, got {0}")]
    NonTradeableQuote(PriceFormat),

    #[error("no league profile for '{0}'")]
    UnknownLeague(String),

    #[error("no pregame baseline for {0}")]
    MissingBaseline(EventSide),

    #[error("position already open for {0}")]
    PositionAlreadyOpen(EventSide),

    #[error("no open position for {0}")]
    NoOpenPosition(EventSide),
}

impl VolError {
    /// Open/close/check called against a key in the wrong state.
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            VolError::PositionAlreadyOpen(_) | VolError::NoOpenPosition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Side;

    #[test]
    fn state_violation_classification() {
        let key = EventSide::new("evt-1", Side::Home);
        assert!(VolError::PositionAlreadyOpen(key.clone()).is_state_violation());
        assert!(VolError::NoOpenPosition(key).is_state_violation());
        assert!(!VolError::Undefined("time elapsed").is_state_violation());
        assert!(!VolError::UnknownLeague("XFL".into()).is_state_violation());
    }

    #[test]
    fn non_tradeable_message_names_format() {
        let msg = VolError::NonTradeableQuote(PriceFormat::American).to_string();
        assert!(msg.contains("american"), "got {}", msg);
    }
}
