/// Decision orchestration: one call in, one auditable decision out.
///
/// Composes calibration, devigging, Kelly sizing, the drawdown governor,
/// the quality ceiling, and the closing-line gate. Settlement flows back
/// through `update_outcome`, which feeds the calibrator and the CLV
/// tracker.
use crate::clv::ClosingLineTracker;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::errors::{EngineError, EngineResult};
use crate::market::{devig, implied_probability};
use crate::models::{CalibrationObservation, Calibrator};
use crate::risk::kelly::{compute_kelly, KellyInputs};
use crate::risk::RiskGovernor;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A sizing decision stamped with its context, stored until its outcome is
/// known.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DecisionRecord {
    pub subject_id: String,
    pub date: DateTime<Utc>,
    pub bankroll: f64,
    pub price: f64,
    pub opposite_price: Option<f64>,
    pub drawdown: f64,
    pub decision: crate::risk::KellyDecision,
    pub outcome: Option<bool>,
    pub realized_profit_loss: Option<f64>,
}

pub struct DecisionEngine {
    config: EngineConfig,
    calibrator: Box<dyn Calibrator>,
    governor: RiskGovernor,
    clv: ClosingLineTracker,
    /// subject_id -> latest open decision. A keyed store, so reconciliation
    /// never scans history.
    open: HashMap<String, DecisionRecord>,
    settled: Vec<DecisionRecord>,
    /// Optional store for calibration observations.
    store: Option<Database>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig, calibrator: Box<dyn Calibrator>) -> Self {
        Self {
            config,
            calibrator,
            governor: RiskGovernor::new(config.risk),
            clv: ClosingLineTracker::new(),
            open: HashMap::new(),
            settled: Vec::new(),
            store: None,
        }
    }

    /// Attach a store; settled observations are persisted through it.
    pub fn with_store(mut self, store: Database) -> Self {
        self.store = Some(store);
        self
    }

    pub fn calibrator(&self) -> &dyn Calibrator {
        self.calibrator.as_ref()
    }

    pub fn calibrator_mut(&mut self) -> &mut dyn Calibrator {
        self.calibrator.as_mut()
    }

    pub fn clv_tracker(&self) -> &ClosingLineTracker {
        &self.clv
    }

    pub fn clv_tracker_mut(&mut self) -> &mut ClosingLineTracker {
        &mut self.clv
    }

    pub fn open_decisions(&self) -> &HashMap<String, DecisionRecord> {
        &self.open
    }

    pub fn settled_decisions(&self) -> &[DecisionRecord] {
        &self.settled
    }

    /// Refit the calibrator from its full history. Blocking; call off the
    /// decision hot path.
    pub fn refit(&mut self) -> EngineResult<()> {
        self.calibrator.fit()
    }

    /// Produce a complete decision for one forecast against one market.
    pub fn decide(
        &mut self,
        forecast_prob: f64,
        price: f64,
        bankroll: f64,
        subject_id: &str,
        opposite_price: Option<f64>,
    ) -> EngineResult<DecisionRecord> {
        if !(0.0..=1.0).contains(&forecast_prob) {
            return Err(EngineError::Validation(format!(
                "forecast probability out of [0, 1]: {forecast_prob}"
            )));
        }
        if !bankroll.is_finite() || bankroll <= 0.0 {
            return Err(EngineError::Validation(format!(
                "bankroll must be positive, got {bankroll}"
            )));
        }
        if !self.calibrator.is_fitted() {
            return Err(EngineError::NotFitted(
                "fit the calibrator before requesting decisions".into(),
            ));
        }

        self.governor.observe(bankroll);
        let drawdown = self.governor.drawdown(bankroll);

        let market_fair_prob = match opposite_price {
            Some(opp) => devig(price, opp, self.config.devig)?.fair_a,
            None => implied_probability(price)?,
        };

        let calibrated_prob = self.calibrator.calibrate(forecast_prob);
        let uncertainty = self.calibrator.uncertainty(forecast_prob);
        let quality = self.calibrator.quality(self.config.quality.window);

        let base = compute_kelly(
            &KellyInputs {
                forecast_prob,
                calibrated_prob,
                market_fair_prob,
                price,
                uncertainty,
                quality,
                bankroll,
            },
            &self.config.kelly,
        )?;

        let mut decision = self.governor.apply(base, bankroll);

        // Hard quality ceiling. Strict comparison: the unmeasured
        // cold-start default sits exactly at the ceiling and passes, so a
        // fresh system can bootstrap.
        if decision.should_bet && quality.brier > self.config.quality.max_brier {
            tracing::warn!(
                brier = quality.brier,
                ceiling = self.config.quality.max_brier,
                "calibration quality above ceiling, overriding to no-bet"
            );
            decision.should_bet = false;
            decision.bet_amount = 0.0;
            decision.reason = format!(
                "calibration brier {:.4} above ceiling {:.4}",
                quality.brier, self.config.quality.max_brier
            );
        }

        if decision.should_bet && self.clv.should_shrink(&self.config.clv) {
            decision.kelly_fraction /= 2.0;
            decision.bet_amount /= 2.0;
            decision.reason = format!(
                "{}; recent closing-line value below {:.1}%, stake halved",
                decision.reason,
                self.config.clv.shrink_threshold * 100.0
            );
        }

        let record = DecisionRecord {
            subject_id: subject_id.to_string(),
            date: Utc::now(),
            bankroll,
            price,
            opposite_price,
            drawdown,
            decision,
            outcome: None,
            realized_profit_loss: None,
        };

        if self.open.insert(subject_id.to_string(), record.clone()).is_some() {
            tracing::warn!(subject_id, "replaced an unreconciled open decision");
        }
        tracing::info!(
            subject_id,
            should_bet = record.decision.should_bet,
            fraction = record.decision.kelly_fraction,
            amount = record.decision.bet_amount,
            reason = %record.decision.reason,
            "decision made"
        );
        Ok(record)
    }

    /// Reconcile the open decision for a subject with its realized outcome.
    ///
    /// Feeds the calibrator a new observation, feeds the CLV tracker iff a
    /// bet was actually placed and a closing price is known, and annotates
    /// the record with realized profit/loss.
    pub fn update_outcome(
        &mut self,
        subject_id: &str,
        outcome: bool,
        closing_price: Option<f64>,
    ) -> EngineResult<DecisionRecord> {
        let mut record = self.open.remove(subject_id).ok_or_else(|| {
            EngineError::Validation(format!("no open decision for subject {subject_id}"))
        })?;

        let obs = CalibrationObservation {
            timestamp: Utc::now(),
            forecast_prob: record.decision.forecast_prob,
            outcome,
            market_fair_prob: Some(record.decision.market_fair_prob),
        };
        if let Some(store) = &self.store {
            store.insert_observation(subject_id, &obs)?;
        }
        self.calibrator.record(obs);

        let realized = if record.decision.should_bet {
            let amount = record.decision.bet_amount;
            if outcome {
                amount * (record.price - 1.0)
            } else {
                -amount
            }
        } else {
            0.0
        };

        if record.decision.should_bet {
            if let Some(close) = closing_price {
                self.clv.record(
                    record.price,
                    close,
                    record.decision.bet_amount,
                    realized,
                    outcome,
                )?;
            }
        }

        record.outcome = Some(outcome);
        record.realized_profit_loss = Some(realized);
        tracing::info!(
            subject_id,
            outcome,
            realized,
            "decision reconciled"
        );
        self.settled.push(record.clone());
        Ok(record)
    }
}
