/// Paper-trading ledger: hypothetical bets settled against real outcomes,
/// backing the whole pipeline's backtest without risking capital.
use super::{BankrollSnapshot, Bet, BetStatus};
use crate::clv::closing_line_value;
use crate::config::LedgerConfig;
use crate::db::Database;
use crate::errors::{EngineError, EngineResult};
use crate::paper::stats::{self, PerformanceStats};
use chrono::Utc;

pub struct PaperLedger {
    db: Database,
    cfg: LedgerConfig,
    current_bankroll: f64,
    total_bets: i64,
    total_won: i64,
    total_lost: i64,
}

impl PaperLedger {
    /// Open over a store, reconstructing the bankroll from settled bets.
    ///
    /// The bankroll is always `starting + sum(settled profit_loss)`; a
    /// separately stored running total is never trusted across restarts.
    pub fn new(db: Database, cfg: LedgerConfig) -> EngineResult<Self> {
        let settled_pl = db.settled_profit_loss()?;
        let bets = db.get_bets()?;
        let total_bets = bets.len() as i64;
        let total_won = bets.iter().filter(|b| b.status == BetStatus::Won).count() as i64;
        let total_lost = bets.iter().filter(|b| b.status == BetStatus::Lost).count() as i64;

        let current_bankroll = cfg.starting_bankroll + settled_pl;
        tracing::info!(
            bankroll = current_bankroll,
            settled_pl,
            total_bets,
            "paper ledger opened"
        );
        Ok(Self {
            db,
            cfg,
            current_bankroll,
            total_bets,
            total_won,
            total_lost,
        })
    }

    pub fn bankroll(&self) -> f64 {
        self.current_bankroll
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.cfg
    }

    /// Place a pending bet. Violating any limit is an error and writes no
    /// record.
    #[allow(clippy::too_many_arguments)]
    pub fn place_bet(
        &mut self,
        subject_id: &str,
        side: &str,
        amount: f64,
        price: f64,
        forecast_prob: f64,
        edge: f64,
        kelly_fraction: Option<f64>,
    ) -> EngineResult<Bet> {
        if !price.is_finite() || price <= 1.0 {
            return Err(EngineError::Validation(format!(
                "decimal price must be > 1.0, got {price}"
            )));
        }
        if amount < self.cfg.min_bet {
            return Err(EngineError::Validation(format!(
                "bet amount {amount:.2} below minimum {:.2}",
                self.cfg.min_bet
            )));
        }
        let max_amount = self.cfg.max_bet_fraction * self.current_bankroll;
        if amount > max_amount {
            return Err(EngineError::Validation(format!(
                "bet amount {amount:.2} exceeds {:.0}% of bankroll ({max_amount:.2})",
                self.cfg.max_bet_fraction * 100.0
            )));
        }
        if amount > self.current_bankroll {
            return Err(EngineError::Validation(format!(
                "bet amount {amount:.2} exceeds bankroll {:.2}",
                self.current_bankroll
            )));
        }

        let bet = Bet {
            bet_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            subject_id: subject_id.to_string(),
            side: side.to_string(),
            amount,
            price,
            forecast_prob,
            edge,
            status: BetStatus::Pending,
            outcome: None,
            payout: None,
            profit_loss: None,
            closing_price: None,
            clv: None,
            kelly_fraction,
            bankroll_at_bet: self.current_bankroll,
        };
        self.db.insert_bet(&bet)?;
        self.total_bets += 1;

        tracing::info!(
            bet_id = %bet.bet_id,
            subject = subject_id,
            side,
            amount,
            price,
            "paper bet placed"
        );
        Ok(bet)
    }

    /// Settle a pending bet. Payout and profit are deterministic from
    /// status and price; the bankroll moves by exactly the profit/loss and
    /// one snapshot is appended.
    pub fn settle_bet(
        &mut self,
        bet_id: &str,
        status: BetStatus,
        closing_price: Option<f64>,
    ) -> EngineResult<Bet> {
        if !status.is_settled() {
            return Err(EngineError::Validation(format!(
                "settlement status must be won/lost/pushed, got {status}"
            )));
        }
        let mut bet = self
            .db
            .get_bet(bet_id)?
            .ok_or_else(|| EngineError::Validation(format!("no bet with id {bet_id}")))?;
        if bet.status != BetStatus::Pending {
            return Err(EngineError::Validation(format!(
                "bet {bet_id} already {}, cannot settle",
                bet.status
            )));
        }

        let (payout, profit_loss, outcome) = match status {
            BetStatus::Won => (bet.amount * bet.price, bet.amount * (bet.price - 1.0), Some(true)),
            BetStatus::Lost => (0.0, -bet.amount, Some(false)),
            BetStatus::Pushed => (bet.amount, 0.0, None),
            _ => unreachable!(),
        };

        bet.status = status;
        bet.outcome = outcome;
        bet.payout = Some(payout);
        bet.profit_loss = Some(profit_loss);
        if let Some(close) = closing_price {
            bet.closing_price = Some(close);
            bet.clv = Some(closing_line_value(bet.price, close)?);
        }

        self.db.update_bet_settlement(&bet)?;
        self.current_bankroll += profit_loss;
        match status {
            BetStatus::Won => self.total_won += 1,
            BetStatus::Lost => self.total_lost += 1,
            _ => {}
        }

        let total_profit_loss = self.current_bankroll - self.cfg.starting_bankroll;
        self.db.insert_snapshot(&BankrollSnapshot {
            timestamp: Utc::now(),
            bankroll: self.current_bankroll,
            total_bets: self.total_bets,
            total_won: self.total_won,
            total_lost: self.total_lost,
            total_profit_loss,
        })?;

        tracing::info!(
            bet_id,
            status = %status,
            profit_loss,
            bankroll = self.current_bankroll,
            "paper bet settled"
        );
        Ok(bet)
    }

    /// Cancel a pending bet. Terminal; no bankroll movement.
    pub fn cancel_bet(&mut self, bet_id: &str) -> EngineResult<Bet> {
        let mut bet = self
            .db
            .get_bet(bet_id)?
            .ok_or_else(|| EngineError::Validation(format!("no bet with id {bet_id}")))?;
        if bet.status != BetStatus::Pending {
            return Err(EngineError::Validation(format!(
                "bet {bet_id} already {}, cannot cancel",
                bet.status
            )));
        }
        bet.status = BetStatus::Cancelled;
        self.db.update_bet_settlement(&bet)?;
        tracing::info!(bet_id, "paper bet cancelled");
        Ok(bet)
    }

    pub fn pending_bets(&self) -> EngineResult<Vec<Bet>> {
        self.db.get_bets_by_status(BetStatus::Pending)
    }

    pub fn bets(&self) -> EngineResult<Vec<Bet>> {
        self.db.get_bets()
    }

    pub fn bankroll_history(&self) -> EngineResult<Vec<BankrollSnapshot>> {
        self.db.get_bankroll_history()
    }

    /// Performance stats computed on demand over settled bets. Read-only;
    /// calling twice without new settlements yields identical results.
    pub fn performance(&self) -> EngineResult<PerformanceStats> {
        let settled = self.db.get_settled_bets()?;
        Ok(stats::compute(&settled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> PaperLedger {
        PaperLedger::new(Database::open_in_memory().unwrap(), LedgerConfig::default()).unwrap()
    }

    fn place(l: &mut PaperLedger, amount: f64, price: f64) -> Bet {
        l.place_bet("game-1", "home", amount, price, 0.6, 0.08, Some(0.01))
            .unwrap()
    }

    #[test]
    fn test_win_round_trip() {
        let mut l = ledger();
        let start = l.bankroll();
        let bet = place(&mut l, 100.0, 2.00);
        let settled = l.settle_bet(&bet.bet_id, BetStatus::Won, None).unwrap();
        assert_eq!(settled.profit_loss, Some(100.0));
        assert_eq!(settled.payout, Some(200.0));
        assert!((l.bankroll() - (start + 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_loss_round_trip() {
        let mut l = ledger();
        let start = l.bankroll();
        let bet = place(&mut l, 100.0, 2.00);
        let settled = l.settle_bet(&bet.bet_id, BetStatus::Lost, None).unwrap();
        assert_eq!(settled.profit_loss, Some(-100.0));
        assert_eq!(settled.payout, Some(0.0));
        assert!((l.bankroll() - (start - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_push_returns_stake() {
        let mut l = ledger();
        let start = l.bankroll();
        let bet = place(&mut l, 100.0, 2.00);
        let settled = l.settle_bet(&bet.bet_id, BetStatus::Pushed, None).unwrap();
        assert_eq!(settled.profit_loss, Some(0.0));
        assert_eq!(settled.outcome, None);
        assert!((l.bankroll() - start).abs() < 1e-9);
    }

    #[test]
    fn test_placement_limits() {
        let mut l = ledger();
        // Below minimum
        assert!(l
            .place_bet("g", "home", 0.5, 2.0, 0.6, 0.05, None)
            .is_err());
        // Above max fraction (10% of 10k = 1000)
        assert!(l
            .place_bet("g", "home", 1_500.0, 2.0, 0.6, 0.05, None)
            .is_err());
        // Invalid price
        assert!(l.place_bet("g", "home", 100.0, 1.0, 0.6, 0.05, None).is_err());
        // No records were written
        assert_eq!(l.bets().unwrap().len(), 0);
    }

    #[test]
    fn test_double_settlement_rejected() {
        let mut l = ledger();
        let bet = place(&mut l, 100.0, 2.00);
        l.settle_bet(&bet.bet_id, BetStatus::Won, None).unwrap();
        assert!(l.settle_bet(&bet.bet_id, BetStatus::Lost, None).is_err());
        // Bankroll unchanged by the failed attempt
        assert!((l.bankroll() - (LedgerConfig::default().starting_bankroll + 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_settle_with_invalid_status_rejected() {
        let mut l = ledger();
        let bet = place(&mut l, 100.0, 2.00);
        assert!(l.settle_bet(&bet.bet_id, BetStatus::Pending, None).is_err());
        assert!(l.settle_bet(&bet.bet_id, BetStatus::Cancelled, None).is_err());
    }

    #[test]
    fn test_cancel_only_pending() {
        let mut l = ledger();
        let bet = place(&mut l, 100.0, 2.00);
        let cancelled = l.cancel_bet(&bet.bet_id).unwrap();
        assert_eq!(cancelled.status, BetStatus::Cancelled);
        // Cancelled is terminal
        assert!(l.settle_bet(&bet.bet_id, BetStatus::Won, None).is_err());
        assert!(l.cancel_bet(&bet.bet_id).is_err());
    }

    #[test]
    fn test_settlement_stores_clv() {
        let mut l = ledger();
        let bet = place(&mut l, 100.0, 2.00);
        let settled = l.settle_bet(&bet.bet_id, BetStatus::Won, Some(1.80)).unwrap();
        let clv = settled.clv.expect("clv stored");
        assert!((clv - 0.1111).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_appended_per_settlement() {
        let mut l = ledger();
        let a = place(&mut l, 100.0, 2.00);
        let b = place(&mut l, 100.0, 2.00);
        l.settle_bet(&a.bet_id, BetStatus::Won, None).unwrap();
        l.settle_bet(&b.bet_id, BetStatus::Lost, None).unwrap();
        let history = l.bankroll_history().unwrap();
        assert_eq!(history.len(), 2);
        let last = history.last().unwrap();
        assert_eq!(last.total_won, 1);
        assert_eq!(last.total_lost, 1);
        assert!((last.total_profit_loss).abs() < 1e-9);
    }

    #[test]
    fn test_bankroll_reconstructed_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LedgerConfig::default();
        let bet_id = {
            let db = Database::open(dir.path()).unwrap();
            let mut l = PaperLedger::new(db, cfg).unwrap();
            let bet = l
                .place_bet("game-1", "home", 100.0, 2.0, 0.6, 0.08, None)
                .unwrap();
            l.settle_bet(&bet.bet_id, BetStatus::Won, None).unwrap();
            bet.bet_id
        };
        // Reopen: bankroll must come from summing settled profit_loss
        let db = Database::open(dir.path()).unwrap();
        let l = PaperLedger::new(db, cfg).unwrap();
        assert!((l.bankroll() - (cfg.starting_bankroll + 100.0)).abs() < 1e-9);
        assert!(l.bets().unwrap().iter().any(|b| b.bet_id == bet_id));
    }

    #[test]
    fn test_stats_idempotent() {
        let mut l = ledger();
        let a = place(&mut l, 100.0, 2.10);
        l.settle_bet(&a.bet_id, BetStatus::Won, None).unwrap();
        let s1 = l.performance().unwrap();
        let s2 = l.performance().unwrap();
        assert_eq!(s1.total_bets, s2.total_bets);
        assert_eq!(s1.roi, s2.roi);
        assert_eq!(s1.max_drawdown, s2.max_drawdown);
    }
}
