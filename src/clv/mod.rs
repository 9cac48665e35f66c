/// Closing-line-value tracking.
///
/// CLV compares the price a bet obtained against the market's closing
/// price. Consistently beating the close is the standard evidence that an
/// observed edge is real rather than calibration noise; consistently
/// losing to it gates sizing down.
use crate::config::ClvConfig;
use crate::errors::EngineResult;
use crate::market::implied_probability;
use chrono::{DateTime, Utc};

/// One settled bet's closing-line record.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ClvRecord {
    pub timestamp: DateTime<Utc>,
    pub bet_price: f64,
    pub closing_price: f64,
    /// (closing_implied - bet_implied) / bet_implied; positive means the
    /// bet beat the close.
    pub clv: f64,
    pub stake: f64,
    pub profit_loss: f64,
    pub won: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClosingLineTracker {
    records: Vec<ClvRecord>,
}

/// CLV of a single bet given its price and the closing price.
pub fn closing_line_value(bet_price: f64, closing_price: f64) -> EngineResult<f64> {
    let bet_implied = implied_probability(bet_price)?;
    let closing_implied = implied_probability(closing_price)?;
    Ok((closing_implied - bet_implied) / bet_implied)
}

impl ClosingLineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        bet_price: f64,
        closing_price: f64,
        stake: f64,
        profit_loss: f64,
        won: bool,
    ) -> EngineResult<f64> {
        let clv = closing_line_value(bet_price, closing_price)?;
        self.records.push(ClvRecord {
            timestamp: Utc::now(),
            bet_price,
            closing_price,
            clv,
            stake,
            profit_loss,
            won,
        });
        tracing::debug!(bet_price, closing_price, clv, "closing line recorded");
        Ok(clv)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Average CLV over the most recent `recent_n` bets; `None` with no
    /// history. `recent_n = None` averages everything.
    pub fn average_clv(&self, recent_n: Option<usize>) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let start = match recent_n {
            Some(n) => self.records.len().saturating_sub(n),
            None => 0,
        };
        let window = &self.records[start..];
        Some(window.iter().map(|r| r.clv).sum::<f64>() / window.len() as f64)
    }

    /// True only once enough history exists and the recent average clears
    /// the threshold.
    pub fn is_sharp(&self, cfg: &ClvConfig) -> bool {
        if self.records.len() < cfg.sharp_min_bets {
            return false;
        }
        self.average_clv(Some(cfg.sharp_min_bets))
            .is_some_and(|avg| avg > cfg.sharp_threshold)
    }

    /// Whether the orchestrator should shrink stakes: enough history and
    /// recent average CLV below the (negative) threshold.
    pub fn should_shrink(&self, cfg: &ClvConfig) -> bool {
        if self.records.len() < cfg.min_history {
            return false;
        }
        self.average_clv(Some(cfg.window))
            .is_some_and(|avg| avg < cfg.shrink_threshold)
    }

    /// Running cumulative CLV, one point per recorded bet.
    pub fn cumulative_clv(&self) -> Vec<f64> {
        let mut total = 0.0;
        self.records
            .iter()
            .map(|r| {
                total += r.clv;
                total
            })
            .collect()
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let wins = self.records.iter().filter(|r| r.won).count();
        Some(wins as f64 / self.records.len() as f64)
    }

    /// Profit per unit staked over tracked bets.
    pub fn roi(&self) -> Option<f64> {
        let staked: f64 = self.records.iter().map(|r| r.stake).sum();
        if staked <= 0.0 {
            return None;
        }
        Some(self.records.iter().map(|r| r.profit_loss).sum::<f64>() / staked)
    }

    pub fn records(&self) -> &[ClvRecord] {
        &self.records
    }
}
