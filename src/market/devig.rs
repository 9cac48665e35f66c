/// Vig removal for two-outcome markets.
///
/// Bookmaker prices imply probabilities that sum to more than 1.0; the
/// excess is the margin. These helpers strip it out to recover a fair
/// probability per side. All functions are pure, no side effects.
use crate::errors::{EngineError, EngineResult};

/// Normalization policy for removing the bookmaker margin.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum DevigMethod {
    /// Divide each implied probability by their sum. Fair probs sum to 1.0
    /// exactly. The sensible default.
    Multiplicative,
    /// Subtract half the margin from each implied probability.
    Additive,
    /// Raise each implied probability to exponent `k` before normalizing.
    /// Degrades more gracefully on markets with very large margins.
    Power { k: f64 },
}

/// Fair probabilities for both sides plus the margin they were extracted from.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FairProbs {
    pub fair_a: f64,
    pub fair_b: f64,
    pub margin: f64,
}

/// Implied probability of a decimal price: `1 / price`.
/// Prices at or below 1.0 are invalid input, not a zero-probability market.
pub fn implied_probability(price: f64) -> EngineResult<f64> {
    if !price.is_finite() || price <= 1.0 {
        return Err(EngineError::Validation(format!(
            "decimal price must be > 1.0, got {price}"
        )));
    }
    Ok(1.0 / price)
}

/// Bookmaker margin (overround minus one) for a two-sided market.
pub fn margin(price_a: f64, price_b: f64) -> EngineResult<f64> {
    let ia = implied_probability(price_a)?;
    let ib = implied_probability(price_b)?;
    Ok(ia + ib - 1.0)
}

/// Remove the margin from a pair of decimal prices.
pub fn devig(price_a: f64, price_b: f64, method: DevigMethod) -> EngineResult<FairProbs> {
    let ia = implied_probability(price_a)?;
    let ib = implied_probability(price_b)?;
    let overround = ia + ib;
    let margin = overround - 1.0;

    let (fair_a, fair_b) = match method {
        DevigMethod::Multiplicative => (ia / overround, ib / overround),
        DevigMethod::Additive => {
            let half = margin / 2.0;
            ((ia - half).clamp(0.0, 1.0), (ib - half).clamp(0.0, 1.0))
        }
        DevigMethod::Power { k } => {
            if k <= 0.0 {
                return Err(EngineError::Validation(format!(
                    "power devig exponent must be > 0, got {k}"
                )));
            }
            let pa = ia.powf(k);
            let pb = ib.powf(k);
            (pa / (pa + pb), pb / (pa + pb))
        }
    };

    Ok(FairProbs {
        fair_a,
        fair_b,
        margin,
    })
}

/// Fair decimal odds for a probability: `1 / prob`.
pub fn fair_odds(prob: f64) -> EngineResult<f64> {
    if !prob.is_finite() || prob <= 0.0 || prob >= 1.0 {
        return Err(EngineError::Validation(format!(
            "probability must be in (0, 1), got {prob}"
        )));
    }
    Ok(1.0 / prob)
}

/// Expected value of a stake at a decimal price given a win probability.
pub fn expected_value(prob: f64, price: f64, stake: f64) -> EngineResult<f64> {
    let _ = implied_probability(price)?;
    if !(0.0..=1.0).contains(&prob) {
        return Err(EngineError::Validation(format!(
            "probability must be in [0, 1], got {prob}"
        )));
    }
    Ok(stake * (prob * (price - 1.0) - (1.0 - prob)))
}

/// Expected return per unit staked.
pub fn expected_roi(prob: f64, price: f64) -> EngineResult<f64> {
    expected_value(prob, price, 1.0)
}
