use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::VolError;

/// Score swing (points) since entry that forces a GAME_STATE exit.
const DEFAULT_SCORE_SHOCK: f64 = 14.0;

fn default_score_shock() -> f64 {
    DEFAULT_SCORE_SHOCK
}

/// Static per-league trading parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueProfile {
    /// Regulation length in minutes
    pub total_minutes: f64,
    /// 4 for quarter-based leagues, 2 for halves
    pub periods: u32,
    /// Minimum |deviation| (percent) before a signal fires
    pub vol_threshold: f64,
    pub size_multiplier: f64,
    pub max_hold_minutes: f64,
    #[serde(default = "default_score_shock")]
    pub score_shock_threshold: f64,
}

impl LeagueProfile {
    pub fn period_length(&self) -> f64 {
        self.total_minutes / self.periods as f64
    }

    pub fn validate(&self, league: &str) -> Result<()> {
        if !(self.total_minutes > 0.0) {
            anyhow::bail!("{}: total_minutes must be positive", league);
        }
        if self.periods != 2 && self.periods != 4 {
            anyhow::bail!("{}: periods must be 2 (halves) or 4 (quarters)", league);
        }
        if !(self.vol_threshold > 0.0) {
            anyhow::bail!("{}: vol_threshold must be positive", league);
        }
        if !(self.size_multiplier > 0.0) {
            anyhow::bail!("{}: size_multiplier must be positive", league);
        }
        if !(self.max_hold_minutes > 0.0) {
            anyhow::bail!("{}: max_hold_minutes must be positive", league);
        }
        if !(self.score_shock_threshold > 0.0) {
            anyhow::bail!("{}: score_shock_threshold must be positive", league);
        }
        Ok(())
    }
}

/// League name → profile lookup. Names are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct LeagueTable {
    profiles: HashMap<String, LeagueProfile>,
}

impl Default for LeagueTable {
    fn default() -> Self {
        let mut table = LeagueTable {
            profiles: HashMap::new(),
        };
        table.insert(
            "NFL",
            LeagueProfile {
                total_minutes: 60.0,
                periods: 4,
                vol_threshold: 2.0,
                size_multiplier: 1.0,
                max_hold_minutes: 15.0,
                score_shock_threshold: DEFAULT_SCORE_SHOCK,
            },
        );
        table.insert(
            "NBA",
            LeagueProfile {
                total_minutes: 48.0,
                periods: 4,
                vol_threshold: 1.5,
                size_multiplier: 0.8,
                max_hold_minutes: 12.0,
                score_shock_threshold: DEFAULT_SCORE_SHOCK,
            },
        );
        // College basketball plays two 20-minute halves.
        table.insert(
            "CBB",
            LeagueProfile {
                total_minutes: 40.0,
                periods: 2,
                vol_threshold: 1.8,
                size_multiplier: 0.6,
                max_hold_minutes: 10.0,
                score_shock_threshold: DEFAULT_SCORE_SHOCK,
            },
        );
        table
    }
}

impl LeagueTable {
    fn normalize(league: &str) -> String {
        league.trim().to_uppercase()
    }

    pub fn get(&self, league: &str) -> Result<&LeagueProfile, VolError> {
        self.profiles
            .get(&Self::normalize(league))
            .ok_or_else(|| VolError::UnknownLeague(league.to_string()))
    }

    pub fn insert(&mut self, league: &str, profile: LeagueProfile) {
        self.profiles.insert(Self::normalize(league), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Apply overrides on top of the defaults. Every override is validated.
    pub fn with_overrides(mut self, overrides: HashMap<String, LeagueProfile>) -> Result<Self> {
        for (league, profile) in overrides {
            profile.validate(&league)?;
            self.insert(&league, profile);
        }
        Ok(self)
    }

    /// Defaults plus overrides read from a JSON object of `league → profile`.
    pub fn load_with_overrides(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read league profiles from {}", path.display()))?;
        let overrides: HashMap<String, LeagueProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse league profiles in {}", path.display()))?;
        Self::default().with_overrides(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let table = LeagueTable::default();
        assert_eq!(table.len(), 3);
        for league in ["NFL", "NBA", "CBB"] {
            table.get(league).unwrap().validate(league).unwrap();
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = LeagueTable::default();
        assert_eq!(table.get(" nba ").unwrap().vol_threshold, 1.5);
    }

    #[test]
    fn unknown_league() {
        let table = LeagueTable::default();
        assert_eq!(
            table.get("XFL"),
            Err(VolError::UnknownLeague("XFL".to_string()))
        );
    }

    #[test]
    fn period_length_by_league() {
        let table = LeagueTable::default();
        assert_eq!(table.get("NBA").unwrap().period_length(), 12.0);
        assert_eq!(table.get("CBB").unwrap().period_length(), 20.0);
    }

    #[test]
    fn overrides_parse_and_validate() {
        let raw = r#"{
            "wnba": {"total_minutes": 40, "periods": 4, "vol_threshold": 1.6,
                     "size_multiplier": 0.5, "max_hold_minutes": 10}
        }"#;
        let overrides: HashMap<String, LeagueProfile> = serde_json::from_str(raw).unwrap();
        let table = LeagueTable::default().with_overrides(overrides).unwrap();
        let wnba = table.get("WNBA").unwrap();
        assert_eq!(wnba.score_shock_threshold, 14.0);
        assert_eq!(wnba.period_length(), 10.0);

        let bad = r#"{"NBA": {"total_minutes": 0, "periods": 4, "vol_threshold": 1.5,
                              "size_multiplier": 0.8, "max_hold_minutes": 12}}"#;
        let overrides: HashMap<String, LeagueProfile> = serde_json::from_str(bad).unwrap();
        assert!(LeagueTable::default().with_overrides(overrides).is_err());
    }
}
