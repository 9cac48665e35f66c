pub mod ledger;
pub mod stats;

pub use ledger::PaperLedger;
pub use stats::PerformanceStats;

use chrono::{DateTime, Utc};

/// Lifecycle of a paper bet. `Pending` is the only non-terminal state;
/// settlement moves to `Won`/`Lost`/`Pushed` exactly once, and
/// `Cancelled` is reachable only before settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Pushed,
    Cancelled,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Pushed => "pushed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            "pushed" => Some(Self::Pushed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Settled means it counts toward bankroll and performance stats.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Pushed)
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One paper bet. Created pending; mutated exactly once on settlement.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Bet {
    pub bet_id: String,
    pub timestamp: DateTime<Utc>,
    pub subject_id: String,
    pub side: String,
    pub amount: f64,
    /// Decimal odds obtained at placement.
    pub price: f64,
    pub forecast_prob: f64,
    pub edge: f64,
    pub status: BetStatus,
    pub outcome: Option<bool>,
    pub payout: Option<f64>,
    pub profit_loss: Option<f64>,
    pub closing_price: Option<f64>,
    pub clv: Option<f64>,
    pub kelly_fraction: Option<f64>,
    pub bankroll_at_bet: f64,
}

/// Append-only bankroll checkpoint, written after every settlement so the
/// equity curve can be reconstructed without replaying all bets.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BankrollSnapshot {
    pub timestamp: DateTime<Utc>,
    pub bankroll: f64,
    pub total_bets: i64,
    pub total_won: i64,
    pub total_lost: i64,
    pub total_profit_loss: f64,
}
