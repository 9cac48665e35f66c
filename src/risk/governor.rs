/// Drawdown-based stake throttling.
///
/// Tracks peak equity and current drawdown from it; a pure post-processing
/// pass over an already-computed Kelly decision. Deep drawdowns zero the
/// stake entirely, moderate ones halve it.
use crate::config::RiskConfig;
use crate::risk::kelly::KellyDecision;

#[derive(Debug, Clone)]
pub struct RiskGovernor {
    cfg: RiskConfig,
    /// Monotonically non-decreasing, ratcheted before every decision.
    peak_bankroll: f64,
}

impl RiskGovernor {
    pub fn new(cfg: RiskConfig) -> Self {
        Self {
            cfg,
            peak_bankroll: 0.0,
        }
    }

    /// Ratchet the peak to the current bankroll if it is a new high.
    pub fn observe(&mut self, bankroll: f64) {
        if bankroll > self.peak_bankroll {
            self.peak_bankroll = bankroll;
        }
    }

    pub fn peak_bankroll(&self) -> f64 {
        self.peak_bankroll
    }

    /// Proportional decline from peak. Zero before any peak is recorded.
    pub fn drawdown(&self, bankroll: f64) -> f64 {
        if self.peak_bankroll <= 0.0 {
            return 0.0;
        }
        ((self.peak_bankroll - bankroll) / self.peak_bankroll).max(0.0)
    }

    /// Apply the drawdown policy to a base decision.
    pub fn apply(&self, mut decision: KellyDecision, bankroll: f64) -> KellyDecision {
        let dd = self.drawdown(bankroll);

        if dd > self.cfg.halt_drawdown {
            tracing::warn!(
                drawdown = dd,
                limit = self.cfg.halt_drawdown,
                "drawdown halt: forcing stake to zero"
            );
            decision.kelly_fraction = 0.0;
            decision.bet_amount = 0.0;
            decision.should_bet = false;
            decision.reason = format!(
                "drawdown {:.1}% exceeds halt threshold {:.0}%",
                dd * 100.0,
                self.cfg.halt_drawdown * 100.0
            );
        } else if dd > self.cfg.halve_drawdown {
            decision.kelly_fraction /= 2.0;
            decision.bet_amount /= 2.0;
            decision.reason = format!(
                "{}; drawdown {:.1}% above {:.0}%, stake halved",
                decision.reason,
                dd * 100.0,
                self.cfg.halve_drawdown * 100.0
            );
        }

        decision
    }
}
