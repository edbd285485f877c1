use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod alerts;
mod backoff;
mod bot;
mod config;
mod db;
mod error;
mod league;
mod market;

use alerts::LogAlertSink;
use backoff::Backoff;
use bot::advisory::RuleBasedAdvisor;
use bot::{EngineSettings, VolatilityEngine};
use config::Config;
use db::Database;
use league::LeagueTable;
use market::{MarketFeed, SnapshotFileFeed};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let leagues = match &config.leagues_path {
        Some(path) => {
            let table = LeagueTable::load_with_overrides(path)?;
            info!("League profiles loaded from {} ({} leagues)", path, table.len());
            table
        }
        None => LeagueTable::default(),
    };

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let feed = SnapshotFileFeed::new(&config.snapshot_path);
    let mut engine = VolatilityEngine::new(
        EngineSettings {
            initial_capital: config.initial_capital,
            advisory_timeout: config.advisory_timeout(),
        },
        leagues,
        db.clone(),
        Arc::new(RuleBasedAdvisor::default()),
        Arc::new(LogAlertSink),
    )?;

    info!(
        "Polling {} ({}) every {}s",
        config.snapshot_path,
        feed.name(),
        config.poll_interval_secs
    );

    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut backoff = Backoff::new(
        Duration::from_secs(1),
        Duration::from_secs(config.max_backoff_secs),
    );
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        // Shutdown is only observed between cycles.
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = interval.tick() => {}
        }

        let snapshot = match feed.fetch_snapshot().await {
            Ok(s) => {
                backoff.reset();
                s
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("Market feed failed: {:#}; retrying in {:?}", e, delay);
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown requested");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
        };

        let summary = engine.run_cycle(&snapshot, Utc::now()).await;
        info!(
            "Cycle: {} quotes evaluated, {} skipped, {} signals, {} opened, {} closed, {} open",
            summary.evaluated,
            summary.skipped,
            summary.signals,
            summary.opened,
            summary.closed,
            engine.positions().len()
        );
    }

    let stats = db.get_stats()?;
    info!(
        "Stopped with {} open position(s). Closed trades: {} ({} winning), session PnL ${:.2}, journal PnL ${:.2}",
        engine.positions().len(),
        stats.closed_trades,
        stats.winning_trades,
        engine.total_pnl(),
        stats.total_pnl
    );
    Ok(())
}
