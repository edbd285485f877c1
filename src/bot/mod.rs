pub mod advisory;
pub mod engine;
pub mod position;
pub mod signal;
pub mod volatility;

pub use engine::{CycleSummary, EngineSettings, VolatilityEngine};
