use crate::errors::{EngineError, EngineResult};
use crate::models::CalibrationObservation;
use crate::paper::{BankrollSnapshot, Bet, BetStatus};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

/// Sqlite-backed store for bets, bankroll history, and calibration
/// observations.
///
/// Owned by a single writer; every call is one auto-committing statement,
/// so a crash between "decision computed" and "bet recorded" never leaves
/// a half-written row.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(data_dir: &Path) -> EngineResult<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
        let db_path = data_dir.join("stakeline.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA cache_size=-64000;",
        )?;
        Self::init(conn, Some(&db_path))
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> EngineResult<Self> {
        let schema = include_str!("../migrations/001_init.sql");
        conn.execute_batch(schema)?;
        match path {
            Some(p) => tracing::info!("database initialized at {}", p.display()),
            None => tracing::debug!("in-memory database initialized"),
        }
        Ok(Self { conn })
    }

    // ── bets ──

    pub fn insert_bet(&self, bet: &Bet) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO bets (bet_id, timestamp, subject_id, side, amount, price, forecast_prob, edge, status, outcome, payout, profit_loss, closing_price, clv, kelly_fraction, bankroll_at_bet)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            rusqlite::params![
                bet.bet_id,
                bet.timestamp.to_rfc3339(),
                bet.subject_id,
                bet.side,
                bet.amount,
                bet.price,
                bet.forecast_prob,
                bet.edge,
                bet.status.as_str(),
                bet.outcome,
                bet.payout,
                bet.profit_loss,
                bet.closing_price,
                bet.clv,
                bet.kelly_fraction,
                bet.bankroll_at_bet,
            ],
        )?;
        Ok(())
    }

    /// Write settlement fields; the only mutation a bet ever receives.
    pub fn update_bet_settlement(&self, bet: &Bet) -> EngineResult<()> {
        let n = self.conn.execute(
            "UPDATE bets SET status = ?1, outcome = ?2, payout = ?3, profit_loss = ?4, closing_price = ?5, clv = ?6 WHERE bet_id = ?7",
            rusqlite::params![
                bet.status.as_str(),
                bet.outcome,
                bet.payout,
                bet.profit_loss,
                bet.closing_price,
                bet.clv,
                bet.bet_id,
            ],
        )?;
        if n == 0 {
            return Err(EngineError::Database(format!(
                "no bet with id {}",
                bet.bet_id
            )));
        }
        Ok(())
    }

    pub fn get_bet(&self, bet_id: &str) -> EngineResult<Option<Bet>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_BET} WHERE bet_id = ?1"))?;
        let mut rows = stmt.query_map(rusqlite::params![bet_id], row_to_bet)?;
        match rows.next() {
            Some(r) => Ok(Some(r?)),
            None => Ok(None),
        }
    }

    /// All bets in placement order.
    pub fn get_bets(&self) -> EngineResult<Vec<Bet>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_BET} ORDER BY timestamp ASC"))?;
        let rows = stmt.query_map([], row_to_bet)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_bets_by_status(&self, status: BetStatus) -> EngineResult<Vec<Bet>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_BET} WHERE status = ?1 ORDER BY timestamp ASC"
        ))?;
        let rows = stmt.query_map(rusqlite::params![status.as_str()], row_to_bet)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Settled bets in placement order: the input to performance stats.
    pub fn get_settled_bets(&self) -> EngineResult<Vec<Bet>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_BET} WHERE status IN ('won', 'lost', 'pushed') ORDER BY timestamp ASC"
        ))?;
        let rows = stmt.query_map([], row_to_bet)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Sum of settled profit/loss: the recovery source of truth for the
    /// bankroll, preferred over any stored running total.
    pub fn settled_profit_loss(&self) -> EngineResult<f64> {
        let sum: Option<f64> = self.conn.query_row(
            "SELECT SUM(profit_loss) FROM bets WHERE status IN ('won', 'lost', 'pushed')",
            [],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0.0))
    }

    // ── bankroll history ──

    pub fn insert_snapshot(&self, snap: &BankrollSnapshot) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO bankroll_history (timestamp, bankroll, total_bets, total_won, total_lost, total_profit_loss)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                snap.timestamp.to_rfc3339(),
                snap.bankroll,
                snap.total_bets,
                snap.total_won,
                snap.total_lost,
                snap.total_profit_loss,
            ],
        )?;
        Ok(())
    }

    pub fn get_bankroll_history(&self) -> EngineResult<Vec<BankrollSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, bankroll, total_bets, total_won, total_lost, total_profit_loss
             FROM bankroll_history ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BankrollSnapshot {
                timestamp: parse_ts(row.get::<_, String>(0)?),
                bankroll: row.get(1)?,
                total_bets: row.get(2)?,
                total_won: row.get(3)?,
                total_lost: row.get(4)?,
                total_profit_loss: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── calibration observations ──

    pub fn insert_observation(
        &self,
        subject_id: &str,
        obs: &CalibrationObservation,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO calibration_observations (timestamp, subject_id, forecast_prob, outcome, market_fair_prob)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                obs.timestamp.to_rfc3339(),
                subject_id,
                obs.forecast_prob,
                obs.outcome,
                obs.market_fair_prob,
            ],
        )?;
        Ok(())
    }

    pub fn get_observations(&self) -> EngineResult<Vec<CalibrationObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, forecast_prob, outcome, market_fair_prob
             FROM calibration_observations ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CalibrationObservation {
                timestamp: parse_ts(row.get::<_, String>(0)?),
                forecast_prob: row.get(1)?,
                outcome: row.get(2)?,
                market_fair_prob: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

const SELECT_BET: &str = "SELECT bet_id, timestamp, subject_id, side, amount, price, forecast_prob, edge, status, outcome, payout, profit_loss, closing_price, clv, kelly_fraction, bankroll_at_bet FROM bets";

fn row_to_bet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bet> {
    let status_str: String = row.get(8)?;
    let status = BetStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown bet status: {status_str}").into(),
        )
    })?;
    Ok(Bet {
        bet_id: row.get(0)?,
        timestamp: parse_ts(row.get::<_, String>(1)?),
        subject_id: row.get(2)?,
        side: row.get(3)?,
        amount: row.get(4)?,
        price: row.get(5)?,
        forecast_prob: row.get(6)?,
        edge: row.get(7)?,
        status,
        outcome: row.get(9)?,
        payout: row.get(10)?,
        profit_loss: row.get(11)?,
        closing_price: row.get(12)?,
        clv: row.get(13)?,
        kelly_fraction: row.get(14)?,
        bankroll_at_bet: row.get(15)?,
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
