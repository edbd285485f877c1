use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::market::{EventSide, Side};

/// SQLite journal owned by the caller of the engine (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    /// `":memory:"` gives a throwaway database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Pregame baselines ────────────────────────────────────────────────────

    /// Store a baseline unless one already exists for the event+side.
    /// Returns `true` when a row was written.
    pub fn insert_baseline(&self, baseline: &PregameBaseline) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO pregame_baselines (
                event_id, side, league, raw_spread, pregame_vol, computed_at
             ) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                baseline.key.event_id,
                baseline.key.side.index(),
                baseline.league,
                baseline.raw_spread,
                baseline.pregame_vol,
                baseline.computed_at,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn load_baselines(&self) -> Result<Vec<PregameBaseline>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, side, league, raw_spread, pregame_vol, computed_at
             FROM pregame_baselines ORDER BY computed_at",
        )?;
        let rows = stmt
            .query_map([], map_baseline)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Trades ───────────────────────────────────────────────────────────────

    /// Insert a newly opened trade
    pub fn insert_trade(&self, trade: &TradeRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trades (
                event_id, side, league, direction, size, initial_deviation,
                entry_live_vol, entry_expected_vol, entry_score_diff, entry_prob,
                status, opened_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                trade.event_id,
                trade.side.index(),
                trade.league,
                trade.direction,
                trade.size,
                trade.initial_deviation,
                trade.entry_live_vol,
                trade.entry_expected_vol,
                trade.entry_score_diff,
                trade.entry_prob,
                trade.status,
                trade.opened_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark a trade closed with its exit metrics and PnL
    pub fn close_trade(&self, id: i64, exit: &TradeExit) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE trades SET status='closed', exit_reason=?1, exit_live_vol=?2,
                    exit_expected_vol=?3, pnl=?4, closed_at=?5
             WHERE id=?6 AND status='open'",
            params![
                exit.reason.to_string(),
                exit.live_vol,
                exit.expected_vol,
                exit.pnl,
                exit.closed_at,
                id
            ],
        )?;
        Ok(())
    }

    /// Open rows left behind by a previous run can no longer be managed;
    /// mark them abandoned. Returns how many were touched.
    pub fn abandon_open_trades(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE trades SET status='abandoned', closed_at=?1 WHERE status='open'",
            params![Utc::now()],
        )?;
        Ok(n)
    }

    pub fn list_open_trades(&self) -> Result<Vec<TradeRecord>> {
        self.query_trades("WHERE status='open' ORDER BY opened_at DESC")
    }

    pub fn list_trades(&self, key: &EventSide) -> Result<Vec<TradeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE event_id=?1 AND side=?2 ORDER BY opened_at",
            TRADE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![key.event_id, key.side.index()], map_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_trades(&self, tail: &str) -> Result<Vec<TradeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} {}", TRADE_COLUMNS, tail))?;
        let rows = stmt
            .query_map([], map_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Stats ────────────────────────────────────────────────────────────────

    pub fn get_stats(&self) -> Result<Stats> {
        let conn = self.conn()?;
        let closed_trades: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE status='closed'",
            [],
            |r| r.get(0),
        )?;
        let winning_trades: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE status='closed' AND pnl > 0",
            [],
            |r| r.get(0),
        )?;
        let total_pnl: f64 = conn.query_row(
            "SELECT COALESCE(SUM(pnl), 0) FROM trades WHERE status='closed'",
            [],
            |r| r.get(0),
        )?;
        let open_trades: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE status='open'",
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            closed_trades,
            winning_trades,
            total_pnl,
            open_trades,
        })
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const TRADE_COLUMNS: &str = "SELECT id, event_id, side, league, direction, size,
        initial_deviation, entry_live_vol, entry_expected_vol, entry_score_diff,
        entry_prob, status, opened_at, closed_at, exit_reason, exit_live_vol,
        exit_expected_vol, pnl
    FROM trades";

fn side_from_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Side> {
    let raw: u8 = row.get(idx)?;
    Side::try_from(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            e.into(),
        )
    })
}

fn map_baseline(row: &rusqlite::Row) -> rusqlite::Result<PregameBaseline> {
    Ok(PregameBaseline {
        key: EventSide::new(row.get::<_, String>(0)?, side_from_column(row, 1)?),
        league: row.get(2)?,
        raw_spread: row.get(3)?,
        pregame_vol: row.get(4)?,
        computed_at: row.get(5)?,
    })
}

fn map_trade(row: &rusqlite::Row) -> rusqlite::Result<TradeRecord> {
    Ok(TradeRecord {
        id: row.get(0)?,
        event_id: row.get(1)?,
        side: side_from_column(row, 2)?,
        league: row.get(3)?,
        direction: row.get(4)?,
        size: row.get(5)?,
        initial_deviation: row.get(6)?,
        entry_live_vol: row.get(7)?,
        entry_expected_vol: row.get(8)?,
        entry_score_diff: row.get(9)?,
        entry_prob: row.get(10)?,
        status: row.get(11)?,
        opened_at: row.get(12)?,
        closed_at: row.get(13)?,
        exit_reason: row.get(14)?,
        exit_live_vol: row.get(15)?,
        exit_expected_vol: row.get(16)?,
        pnl: row.get(17)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pregame_baselines (
    event_id    TEXT    NOT NULL,
    side        INTEGER NOT NULL,
    league      TEXT    NOT NULL,
    raw_spread  REAL    NOT NULL,
    pregame_vol REAL    NOT NULL,
    computed_at TEXT    NOT NULL,
    PRIMARY KEY (event_id, side)
);

CREATE TABLE IF NOT EXISTS trades (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id           TEXT    NOT NULL,
    side               INTEGER NOT NULL,
    league             TEXT    NOT NULL,
    direction          TEXT    NOT NULL,
    size               REAL    NOT NULL,
    initial_deviation  REAL    NOT NULL,
    entry_live_vol     REAL    NOT NULL,
    entry_expected_vol REAL    NOT NULL,
    entry_score_diff   REAL    NOT NULL,
    entry_prob         REAL    NOT NULL,
    status             TEXT    NOT NULL DEFAULT 'open',
    opened_at          TEXT    NOT NULL,
    closed_at          TEXT,
    exit_reason        TEXT,
    exit_live_vol      REAL,
    exit_expected_vol  REAL,
    pnl                REAL
);

CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);
CREATE INDEX IF NOT EXISTS idx_trades_event ON trades(event_id, side);
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub closed_trades: i64,
    pub winning_trades: i64,
    pub total_pnl: f64,
    pub open_trades: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::position::{Direction, ExitReason};

    fn baseline(event: &str, side: Side, vol: f64) -> PregameBaseline {
        PregameBaseline {
            key: EventSide::new(event, side),
            league: "NBA".into(),
            raw_spread: -6.5,
            pregame_vol: vol,
            computed_at: Utc::now(),
        }
    }

    fn trade(event: &str) -> TradeRecord {
        TradeRecord {
            id: None,
            event_id: event.into(),
            side: Side::Home,
            league: "NBA".into(),
            direction: Direction::SellVol.to_string(),
            size: 100.0,
            initial_deviation: 2.0,
            entry_live_vol: 12.0,
            entry_expected_vol: 10.0,
            entry_score_diff: 4.0,
            entry_prob: 0.6,
            status: "open".into(),
            opened_at: Utc::now(),
            closed_at: None,
            exit_reason: None,
            exit_live_vol: None,
            exit_expected_vol: None,
            pnl: None,
        }
    }

    #[test]
    fn baseline_is_written_once() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.insert_baseline(&baseline("e1", Side::Home, 13.2)).unwrap());
        assert!(!db.insert_baseline(&baseline("e1", Side::Home, 99.0)).unwrap());
        assert!(db.insert_baseline(&baseline("e1", Side::Away, 13.2)).unwrap());

        let rows = db.load_baselines().unwrap();
        assert_eq!(rows.len(), 2);
        let home = rows.iter().find(|b| b.key.side == Side::Home).unwrap();
        assert_eq!(home.pregame_vol, 13.2);
        assert_eq!(home.raw_spread, -6.5);
    }

    #[test]
    fn trade_open_close_and_stats() {
        let db = Database::open(":memory:").unwrap();
        let id = db.insert_trade(&trade("e1")).unwrap();
        db.insert_trade(&trade("e2")).unwrap();
        assert_eq!(db.list_open_trades().unwrap().len(), 2);

        db.close_trade(
            id,
            &TradeExit {
                reason: ExitReason::MeanReversion,
                live_vol: 10.2,
                expected_vol: 10.0,
                pnl: 25.0,
                closed_at: Utc::now(),
            },
        )
        .unwrap();

        let closed = db.list_trades(&EventSide::new("e1", Side::Home)).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, "closed");
        assert_eq!(closed[0].exit_reason.as_deref(), Some("MEAN_REVERSION"));
        assert_eq!(closed[0].pnl, Some(25.0));

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.closed_trades, 1);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.open_trades, 1);
        assert_eq!(stats.total_pnl, 25.0);
    }

    #[test]
    fn abandon_leftover_open_trades() {
        let db = Database::open(":memory:").unwrap();
        db.insert_trade(&trade("e1")).unwrap();
        assert_eq!(db.abandon_open_trades().unwrap(), 1);
        assert!(db.list_open_trades().unwrap().is_empty());
        assert_eq!(db.get_stats().unwrap().closed_trades, 0);
    }
}
