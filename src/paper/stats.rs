/// Performance metrics over settled bets.
/// All functions are pure -- they take fetched rows and return computed
/// values, so repeated calls without new settlements are identical.
use super::{Bet, BetStatus};

/// Annualization constant for the Sharpe-like ratio, treating each settled
/// bet as one day's return.
const SHARPE_ANNUALIZATION: f64 = 15.874_507_866_387_544; // sqrt(252)

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PerformanceStats {
    pub total_bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    /// Wins over decided (non-push) bets.
    pub win_rate: f64,
    pub total_staked: f64,
    pub total_profit_loss: f64,
    /// total_profit_loss / total_staked.
    pub roi: f64,
    pub average_bet: f64,
    pub average_odds: f64,
    pub average_edge: f64,
    /// Mean CLV over bets with a recorded closing price.
    pub average_clv: Option<f64>,
    /// Mean per-bet return over its std deviation, annualized.
    pub sharpe: f64,
    /// Largest peak-to-trough decline of cumulative profit/loss.
    pub max_drawdown: f64,
    /// Positive = consecutive wins ending at the latest settled bet,
    /// negative = consecutive losses. Pushes are skipped.
    pub current_streak: i64,
}

impl PerformanceStats {
    fn empty() -> Self {
        Self {
            total_bets: 0,
            wins: 0,
            losses: 0,
            pushes: 0,
            win_rate: 0.0,
            total_staked: 0.0,
            total_profit_loss: 0.0,
            roi: 0.0,
            average_bet: 0.0,
            average_odds: 0.0,
            average_edge: 0.0,
            average_clv: None,
            sharpe: 0.0,
            max_drawdown: 0.0,
            current_streak: 0,
        }
    }
}

/// Compute stats over settled bets in placement order. Pure function.
pub fn compute(settled: &[Bet]) -> PerformanceStats {
    if settled.is_empty() {
        return PerformanceStats::empty();
    }

    let n = settled.len() as f64;
    let wins = settled.iter().filter(|b| b.status == BetStatus::Won).count();
    let losses = settled.iter().filter(|b| b.status == BetStatus::Lost).count();
    let pushes = settled.iter().filter(|b| b.status == BetStatus::Pushed).count();
    let decided = wins + losses;
    let win_rate = if decided == 0 {
        0.0
    } else {
        wins as f64 / decided as f64
    };

    let total_staked: f64 = settled.iter().map(|b| b.amount).sum();
    let total_profit_loss: f64 = settled.iter().filter_map(|b| b.profit_loss).sum();
    let roi = if total_staked > 0.0 {
        total_profit_loss / total_staked
    } else {
        0.0
    };

    let average_bet = total_staked / n;
    let average_odds = settled.iter().map(|b| b.price).sum::<f64>() / n;
    let average_edge = settled.iter().map(|b| b.edge).sum::<f64>() / n;

    let clvs: Vec<f64> = settled.iter().filter_map(|b| b.clv).collect();
    let average_clv = if clvs.is_empty() {
        None
    } else {
        Some(clvs.iter().sum::<f64>() / clvs.len() as f64)
    };

    PerformanceStats {
        total_bets: settled.len(),
        wins,
        losses,
        pushes,
        win_rate,
        total_staked,
        total_profit_loss,
        roi,
        average_bet,
        average_odds,
        average_edge,
        average_clv,
        sharpe: sharpe_ratio(settled),
        max_drawdown: max_drawdown(settled),
        current_streak: current_streak(settled),
    }
}

fn sharpe_ratio(settled: &[Bet]) -> f64 {
    let returns: Vec<f64> = settled
        .iter()
        .filter(|b| b.amount > 0.0)
        .filter_map(|b| b.profit_loss.map(|pl| pl / b.amount))
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let nf = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / nf;
    let var = returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (nf - 1.0);
    let std = var.sqrt();
    if std < 1e-12 {
        return 0.0;
    }
    (mean / std) * SHARPE_ANNUALIZATION
}

fn max_drawdown(settled: &[Bet]) -> f64 {
    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for bet in settled {
        cumulative += bet.profit_loss.unwrap_or(0.0);
        if cumulative > peak {
            peak = cumulative;
        }
        let dd = peak - cumulative;
        if dd > worst {
            worst = dd;
        }
    }
    worst
}

fn current_streak(settled: &[Bet]) -> i64 {
    let mut streak: i64 = 0;
    for bet in settled.iter().rev() {
        match bet.status {
            BetStatus::Pushed => continue,
            BetStatus::Won => {
                if streak < 0 {
                    break;
                }
                streak += 1;
            }
            BetStatus::Lost => {
                if streak > 0 {
                    break;
                }
                streak -= 1;
            }
            _ => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn settled_bet(amount: f64, price: f64, status: BetStatus) -> Bet {
        let profit_loss = match status {
            BetStatus::Won => amount * (price - 1.0),
            BetStatus::Lost => -amount,
            BetStatus::Pushed => 0.0,
            _ => panic!("settled bets only"),
        };
        Bet {
            bet_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            subject_id: "g".into(),
            side: "home".into(),
            amount,
            price,
            forecast_prob: 0.6,
            edge: 0.05,
            status,
            outcome: match status {
                BetStatus::Won => Some(true),
                BetStatus::Lost => Some(false),
                _ => None,
            },
            payout: None,
            profit_loss: Some(profit_loss),
            closing_price: None,
            clv: None,
            kelly_fraction: None,
            bankroll_at_bet: 10_000.0,
        }
    }

    #[test]
    fn test_empty_stats() {
        let s = compute(&[]);
        assert_eq!(s.total_bets, 0);
        assert_eq!(s.roi, 0.0);
        assert!(s.average_clv.is_none());
    }

    #[test]
    fn test_win_rate_excludes_pushes() {
        let bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Lost),
            settled_bet(100.0, 2.0, BetStatus::Pushed),
        ];
        let s = compute(&bets);
        assert!((s.win_rate - 0.5).abs() < 1e-12);
        assert_eq!(s.pushes, 1);
    }

    #[test]
    fn test_roi() {
        let bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Won),  // +100
            settled_bet(100.0, 2.0, BetStatus::Lost), // -100
            settled_bet(100.0, 1.5, BetStatus::Won),  // +50
        ];
        let s = compute(&bets);
        assert!((s.total_profit_loss - 50.0).abs() < 1e-9);
        assert!((s.roi - 50.0 / 300.0).abs() < 1e-9);
        assert!((s.average_bet - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_drawdown() {
        // +100, -100, -100, +50 -> cumulative 100, 0, -100, -50
        // peak 100, worst trough -100 -> drawdown 200
        let bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Lost),
            settled_bet(100.0, 2.0, BetStatus::Lost),
            settled_bet(50.0, 2.0, BetStatus::Won),
        ];
        let s = compute(&bets);
        assert!((s.max_drawdown - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_streak_wins() {
        let bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Lost),
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Pushed),
            settled_bet(100.0, 2.0, BetStatus::Won),
        ];
        assert_eq!(compute(&bets).current_streak, 2);
    }

    #[test]
    fn test_streak_losses_negative() {
        let bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Lost),
            settled_bet(100.0, 2.0, BetStatus::Lost),
        ];
        assert_eq!(compute(&bets).current_streak, -2);
    }

    #[test]
    fn test_sharpe_zero_for_constant_returns() {
        let bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Won),
        ];
        assert_eq!(compute(&bets).sharpe, 0.0);
    }

    #[test]
    fn test_sharpe_sign_follows_mean_return() {
        let mut bets = vec![
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Won),
            settled_bet(100.0, 2.0, BetStatus::Lost),
        ];
        assert!(compute(&bets).sharpe > 0.0);
        bets.push(settled_bet(100.0, 2.0, BetStatus::Lost));
        bets.push(settled_bet(100.0, 2.0, BetStatus::Lost));
        assert!(compute(&bets).sharpe < 0.0);
    }

    #[test]
    fn test_average_clv_only_over_recorded() {
        let mut with_clv = settled_bet(100.0, 2.0, BetStatus::Won);
        with_clv.clv = Some(0.10);
        let without = settled_bet(100.0, 2.0, BetStatus::Lost);
        let s = compute(&[with_clv, without]);
        assert!((s.average_clv.unwrap() - 0.10).abs() < 1e-12);
    }
}
