/// Uncertainty-adjusted fractional Kelly sizing.
///
/// f = cap( gamma * penalty * (b * p - q) / b )
///
/// where:
///   p = calibrated win probability
///   q = 1 - p
///   b = price - 1 (net decimal odds)
///   penalty = max(floor, 1 - uncertainty / max_uncertainty)
///   gamma = fractional multiplier, fixed or keyed to calibration quality
///
/// Pure function over its inputs. Every gate that zeroes the stake writes
/// a machine-readable reason; insufficient edge and negative Kelly are
/// normal zero decisions, not errors. An invalid price is an error.
use crate::config::{FractionalMode, KellyConfig};
use crate::errors::{EngineError, EngineResult};
use crate::models::QualityReport;

/// Inputs to one sizing call.
#[derive(Debug, Clone, Copy)]
pub struct KellyInputs {
    pub forecast_prob: f64,
    pub calibrated_prob: f64,
    pub market_fair_prob: f64,
    /// Decimal price actually offered for the bet side.
    pub price: f64,
    pub uncertainty: f64,
    pub quality: QualityReport,
    pub bankroll: f64,
}

/// A complete, auditable sizing decision. Immutable once produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KellyDecision {
    pub forecast_prob: f64,
    pub calibrated_prob: f64,
    pub market_fair_prob: f64,
    pub edge: f64,
    pub uncertainty: f64,
    pub kelly_full: f64,
    pub uncertainty_penalty: f64,
    pub fractional_multiplier: f64,
    pub kelly_fraction: f64,
    pub bet_amount: f64,
    pub should_bet: bool,
    pub reason: String,
}

impl KellyDecision {
    fn zero(inputs: &KellyInputs, edge: f64, kelly_full: f64, reason: String) -> Self {
        Self {
            forecast_prob: inputs.forecast_prob,
            calibrated_prob: inputs.calibrated_prob,
            market_fair_prob: inputs.market_fair_prob,
            edge,
            uncertainty: inputs.uncertainty,
            kelly_full,
            uncertainty_penalty: 0.0,
            fractional_multiplier: 0.0,
            kelly_fraction: 0.0,
            bet_amount: 0.0,
            should_bet: false,
            reason,
        }
    }
}

/// Fractional multiplier tier keyed to measured Brier score: bet bigger
/// fractions of Kelly only once calibration is proven excellent.
fn adaptive_multiplier(brier: f64) -> f64 {
    if brier < 0.06 {
        1.0
    } else if brier < 0.08 {
        0.75
    } else if brier < 0.10 {
        0.50
    } else if brier < 0.15 {
        0.25
    } else {
        0.10
    }
}

/// Compute the base Kelly decision. Gates apply in a fixed order:
/// min-edge, non-positive full Kelly, uncertainty penalty, fractional
/// multiplier, hard cap.
pub fn compute_kelly(inputs: &KellyInputs, cfg: &KellyConfig) -> EngineResult<KellyDecision> {
    if !inputs.price.is_finite() || inputs.price <= 1.0 {
        return Err(EngineError::Validation(format!(
            "decimal price must be > 1.0, got {}",
            inputs.price
        )));
    }
    if !(0.0..=1.0).contains(&inputs.calibrated_prob) {
        return Err(EngineError::Validation(format!(
            "calibrated probability out of range: {}",
            inputs.calibrated_prob
        )));
    }

    let p = inputs.calibrated_prob;
    let edge = p - inputs.market_fair_prob;

    if edge < cfg.min_edge {
        return Ok(KellyDecision::zero(
            inputs,
            edge,
            0.0,
            format!(
                "insufficient edge: {:.4} below minimum {:.4}",
                edge, cfg.min_edge
            ),
        ));
    }

    let b = inputs.price - 1.0;
    let q = 1.0 - p;
    let kelly_full = (b * p - q) / b;

    if kelly_full <= 0.0 {
        return Ok(KellyDecision::zero(
            inputs,
            edge,
            kelly_full,
            format!("non-positive full kelly: {kelly_full:.4}"),
        ));
    }

    let penalty = (1.0 - inputs.uncertainty / cfg.max_uncertainty).max(cfg.penalty_floor);

    let multiplier = match cfg.fractional {
        FractionalMode::Fixed(f) => f,
        FractionalMode::Adaptive => adaptive_multiplier(inputs.quality.brier),
    };

    let kelly_fraction = (kelly_full * penalty * multiplier).min(cfg.max_kelly);

    let should_bet =
        edge >= cfg.min_edge && kelly_fraction > 0.01 && inputs.uncertainty < cfg.max_uncertainty;

    let reason = if !should_bet {
        if inputs.uncertainty >= cfg.max_uncertainty {
            format!(
                "calibration uncertainty {:.4} at or above maximum {:.4}",
                inputs.uncertainty, cfg.max_uncertainty
            )
        } else {
            format!("kelly fraction {kelly_fraction:.4} below actionable minimum 0.01")
        }
    } else {
        format!(
            "edge {:.4}, full kelly {:.4}, penalty {:.3}, multiplier {:.2}",
            edge, kelly_full, penalty, multiplier
        )
    };

    let bet_amount = if should_bet {
        kelly_fraction * inputs.bankroll
    } else {
        0.0
    };

    Ok(KellyDecision {
        forecast_prob: inputs.forecast_prob,
        calibrated_prob: p,
        market_fair_prob: inputs.market_fair_prob,
        edge,
        uncertainty: inputs.uncertainty,
        kelly_full,
        uncertainty_penalty: penalty,
        fractional_multiplier: multiplier,
        kelly_fraction,
        bet_amount,
        should_bet,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;

    fn measured_quality(brier: f64) -> QualityReport {
        QualityReport {
            brier,
            log_loss: 0.5,
            sample_count: 100,
            measured: true,
        }
    }

    fn inputs(calibrated: f64, fair: f64, price: f64) -> KellyInputs {
        KellyInputs {
            forecast_prob: calibrated,
            calibrated_prob: calibrated,
            market_fair_prob: fair,
            price,
            uncertainty: 0.05,
            quality: measured_quality(0.12),
            bankroll: 10_000.0,
        }
    }

    #[test]
    fn test_insufficient_edge_never_bets() {
        let cfg = KellyConfig::default();
        // 2% edge, below the 3% minimum, regardless of uncertainty/quality
        for u in [0.0, 0.05, 0.19] {
            let mut inp = inputs(0.52, 0.50, 2.00);
            inp.uncertainty = u;
            let d = compute_kelly(&inp, &cfg).unwrap();
            assert!(!d.should_bet);
            assert_eq!(d.bet_amount, 0.0);
            assert!(d.reason.contains("insufficient edge"));
        }
    }

    #[test]
    fn test_invalid_price_fails_fast() {
        let cfg = KellyConfig::default();
        assert!(compute_kelly(&inputs(0.6, 0.5, 1.0), &cfg).is_err());
        assert!(compute_kelly(&inputs(0.6, 0.5, 0.8), &cfg).is_err());
        assert!(compute_kelly(&inputs(0.6, 0.5, f64::NAN), &cfg).is_err());
    }

    #[test]
    fn test_negative_full_kelly_zero_decision() {
        let cfg = KellyConfig::default();
        // Edge over fair prob can clear min_edge while the offered price
        // still makes full Kelly non-positive.
        let mut inp = inputs(0.40, 0.30, 1.50);
        inp.uncertainty = 0.02;
        let d = compute_kelly(&inp, &cfg).unwrap();
        assert!(!d.should_bet);
        assert_eq!(d.bet_amount, 0.0);
        assert!(d.kelly_full <= 0.0);
        assert!(d.reason.contains("non-positive"));
    }

    #[test]
    fn test_cap_respected_pathological_edge() {
        let cfg = KellyConfig::default();
        let mut inp = inputs(0.99, 0.50, 1.01);
        inp.uncertainty = 0.0;
        inp.quality = measured_quality(0.01); // full-Kelly tier
        let d = compute_kelly(&inp, &cfg).unwrap();
        assert!(d.kelly_fraction <= cfg.max_kelly);
        assert!(d.kelly_fraction >= 0.0);

        // Large genuine edge at long odds: full kelly well above the cap
        let mut long = inputs(0.95, 0.20, 5.0);
        long.uncertainty = 0.0;
        long.quality = measured_quality(0.01);
        let d = compute_kelly(&long, &cfg).unwrap();
        assert!(d.kelly_full > cfg.max_kelly);
        assert!((d.kelly_fraction - cfg.max_kelly).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_penalty_applies() {
        let cfg = KellyConfig::default();
        let certain = compute_kelly(&inputs(0.60, 0.50, 2.10), &cfg).unwrap();
        let mut shaky = inputs(0.60, 0.50, 2.10);
        shaky.uncertainty = 0.15;
        let shaky = compute_kelly(&shaky, &cfg).unwrap();
        assert!(shaky.kelly_fraction < certain.kelly_fraction);
        assert!((shaky.uncertainty_penalty - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_penalty_floor() {
        let cfg = KellyConfig::default();
        let mut inp = inputs(0.60, 0.50, 2.10);
        inp.uncertainty = 0.199; // 1 - u/max_u < floor
        let d = compute_kelly(&inp, &cfg).unwrap();
        assert!((d.uncertainty_penalty - cfg.penalty_floor).abs() < 1e-9);
    }

    #[test]
    fn test_uncertainty_gate_blocks() {
        let cfg = KellyConfig::default();
        let mut inp = inputs(0.65, 0.50, 2.10);
        inp.uncertainty = 0.25;
        let d = compute_kelly(&inp, &cfg).unwrap();
        assert!(!d.should_bet);
        assert_eq!(d.bet_amount, 0.0);
        assert!(d.reason.contains("uncertainty"));
    }

    #[test]
    fn test_adaptive_tiers() {
        assert_eq!(adaptive_multiplier(0.05), 1.0);
        assert_eq!(adaptive_multiplier(0.07), 0.75);
        assert_eq!(adaptive_multiplier(0.09), 0.50);
        assert_eq!(adaptive_multiplier(0.12), 0.25);
        assert_eq!(adaptive_multiplier(0.15), 0.10);
        assert_eq!(adaptive_multiplier(0.30), 0.10);
    }

    #[test]
    fn test_better_quality_sizes_bigger() {
        let cfg = KellyConfig::default();
        let mut sharp = inputs(0.60, 0.50, 2.10);
        sharp.quality = measured_quality(0.05);
        let mut rough = inputs(0.60, 0.50, 2.10);
        rough.quality = measured_quality(0.14);
        let d_sharp = compute_kelly(&sharp, &cfg).unwrap();
        let d_rough = compute_kelly(&rough, &cfg).unwrap();
        assert!(d_sharp.kelly_fraction > d_rough.kelly_fraction);
    }

    #[test]
    fn test_fixed_fraction_mode() {
        let cfg = KellyConfig {
            fractional: FractionalMode::Fixed(0.25),
            ..KellyConfig::default()
        };
        let d = compute_kelly(&inputs(0.60, 0.50, 2.10), &cfg).unwrap();
        assert!((d.fractional_multiplier - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_bet_amount_proportional_to_bankroll() {
        let cfg = KellyConfig::default();
        let mut inp = inputs(0.60, 0.50, 2.10);
        inp.bankroll = 20_000.0;
        let big = compute_kelly(&inp, &cfg).unwrap();
        inp.bankroll = 10_000.0;
        let small = compute_kelly(&inp, &cfg).unwrap();
        assert!((big.bet_amount - 2.0 * small.bet_amount).abs() < 1e-9);
    }

    #[test]
    fn test_unmeasured_quality_uses_most_conservative_tier() {
        let cfg = KellyConfig::default();
        let mut inp = inputs(0.62, 0.50, 2.10);
        inp.quality = QualityReport::unmeasured(&QualityConfig::default());
        let d = compute_kelly(&inp, &cfg).unwrap();
        // cold-start brier 0.15 lands in the 0.10 tier
        assert!((d.fractional_multiplier - 0.10).abs() < 1e-12);
    }
}
