use clap::Parser;
use std::time::Duration;

/// In-play volatility trader for sports exchange markets
#[derive(Parser, Debug, Clone)]
#[command(name = "voltrade", version, about)]
pub struct Config {
    /// JSON market snapshot rewritten by the odds collector
    #[arg(long, env = "SNAPSHOT_PATH")]
    pub snapshot_path: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "voltrade.db")]
    pub database_path: String,

    /// Capital that position sizes are a percentage of (USD)
    #[arg(long, env = "INITIAL_CAPITAL", default_value = "1000.0")]
    pub initial_capital: f64,

    /// Seconds between evaluation cycles
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "60")]
    pub poll_interval_secs: u64,

    /// Upper bound on one advisory call in milliseconds
    #[arg(long, env = "ADVISORY_TIMEOUT_MS", default_value = "2000")]
    pub advisory_timeout_ms: u64,

    /// Optional JSON file overriding or adding league profiles
    #[arg(long, env = "LEAGUES_PATH")]
    pub leagues_path: Option<String>,

    /// Cap on the retry delay after feed failures
    #[arg(long, env = "MAX_BACKOFF_SECS", default_value = "300")]
    pub max_backoff_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.initial_capital > 0.0) || !self.initial_capital.is_finite() {
            anyhow::bail!("initial_capital must be positive");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.advisory_timeout_ms == 0 {
            anyhow::bail!("advisory_timeout_ms must be at least 1");
        }
        if self.max_backoff_secs == 0 {
            anyhow::bail!("max_backoff_secs must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory_timeout_ms)
    }
}
