use crate::errors::{EngineError, EngineResult};
use crate::market::DevigMethod;

/// How the fractional-Kelly multiplier is chosen.
///
/// `Adaptive` keys the multiplier to measured calibration quality (Brier
/// score), so larger fractions of full Kelly are only used once
/// calibration is proven. `Fixed` is the classic quarter-Kelly style.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum FractionalMode {
    Fixed(f64),
    Adaptive,
}

/// Kelly sizing parameters. All thresholds documented here, not scattered.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct KellyConfig {
    /// Minimum edge (calibrated - fair) required before any stake.
    pub min_edge: f64,
    /// Hard cap on the final Kelly fraction.
    pub max_kelly: f64,
    /// Floor of the uncertainty penalty multiplier.
    pub penalty_floor: f64,
    /// Calibration uncertainty at or above which no bet is placed.
    pub max_uncertainty: f64,
    /// Fractional-Kelly policy.
    pub fractional: FractionalMode,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.03,
            max_kelly: 0.50,
            penalty_floor: 0.10,
            max_uncertainty: 0.20,
            fractional: FractionalMode::Adaptive,
        }
    }
}

/// Drawdown governor thresholds.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RiskConfig {
    /// Drawdown above which stakes are halved.
    pub halve_drawdown: f64,
    /// Drawdown above which stakes are zeroed.
    pub halt_drawdown: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            halve_drawdown: 0.20,
            halt_drawdown: 0.30,
        }
    }
}

/// Closing-line-value gating parameters.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ClvConfig {
    /// Minimum tracked bets before the CLV gate activates.
    pub min_history: usize,
    /// Window of most recent bets for the gate's average.
    pub window: usize,
    /// Recent average CLV below this shrinks stakes by half.
    pub shrink_threshold: f64,
    /// Average CLV above this (with enough history) counts as sharp.
    pub sharp_threshold: f64,
    /// History required before `is_sharp` can be true.
    pub sharp_min_bets: usize,
}

impl Default for ClvConfig {
    fn default() -> Self {
        Self {
            min_history: 20,
            window: 50,
            shrink_threshold: -0.02,
            sharp_threshold: 0.02,
            sharp_min_bets: 50,
        }
    }
}

/// Calibration-quality policy.
///
/// The cold-start defaults are a deliberate contract: with zero
/// observations, quality reads as "acceptable but unproven" (Brier 0.15,
/// log loss ln 2), flagged `measured = false`, never infinite and never
/// blocking. The hard ceiling uses a strict comparison so the unproven
/// default does not trip it and the system can bootstrap.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QualityConfig {
    /// Most-recent-N window for Brier / log loss.
    pub window: usize,
    /// Brier score reported with zero observations.
    pub default_brier: f64,
    /// Log loss reported with zero observations.
    pub default_log_loss: f64,
    /// Measured Brier strictly above this forces should_bet = false.
    pub max_brier: f64,
    /// Fixed uncertainty reported by the point-estimate calibrator.
    pub isotonic_uncertainty: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window: 100,
            default_brier: 0.15,
            default_log_loss: std::f64::consts::LN_2,
            max_brier: 0.15,
            isotonic_uncertainty: 0.05,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct EngineConfig {
    pub kelly: KellyConfig,
    pub risk: RiskConfig,
    pub clv: ClvConfig,
    pub quality: QualityConfig,
    /// Devig policy applied when both sides' prices are available.
    pub devig: DevigMethod,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kelly: KellyConfig::default(),
            risk: RiskConfig::default(),
            clv: ClvConfig::default(),
            quality: QualityConfig::default(),
            devig: DevigMethod::Multiplicative,
        }
    }
}

impl EngineConfig {
    /// Load overrides from the environment (and a `.env` file if present).
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();
        cfg.kelly.min_edge = env_f64("STAKELINE_MIN_EDGE", cfg.kelly.min_edge)?;
        cfg.kelly.max_kelly = env_f64("STAKELINE_MAX_KELLY", cfg.kelly.max_kelly)?;
        cfg.kelly.penalty_floor = env_f64("STAKELINE_PENALTY_FLOOR", cfg.kelly.penalty_floor)?;
        cfg.kelly.max_uncertainty =
            env_f64("STAKELINE_MAX_UNCERTAINTY", cfg.kelly.max_uncertainty)?;
        if let Ok(frac) = std::env::var("STAKELINE_FRACTIONAL_KELLY") {
            let f = frac
                .parse::<f64>()
                .map_err(|e| EngineError::Config(format!("STAKELINE_FRACTIONAL_KELLY: {e}")))?;
            cfg.kelly.fractional = FractionalMode::Fixed(f);
        }
        cfg.risk.halve_drawdown = env_f64("STAKELINE_HALVE_DRAWDOWN", cfg.risk.halve_drawdown)?;
        cfg.risk.halt_drawdown = env_f64("STAKELINE_HALT_DRAWDOWN", cfg.risk.halt_drawdown)?;
        cfg.quality.max_brier = env_f64("STAKELINE_MAX_BRIER", cfg.quality.max_brier)?;
        cfg.devig = match env_var_or("STAKELINE_DEVIG", "multiplicative").as_str() {
            "multiplicative" => DevigMethod::Multiplicative,
            "additive" => DevigMethod::Additive,
            "power" => DevigMethod::Power {
                k: env_f64("STAKELINE_DEVIG_POWER_K", 1.0)?,
            },
            other => {
                return Err(EngineError::Config(format!("STAKELINE_DEVIG: unknown method {other}")))
            }
        };
        Ok(cfg)
    }
}

/// Paper-trading ledger limits.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LedgerConfig {
    pub starting_bankroll: f64,
    /// No single bet may exceed this fraction of the current bankroll.
    /// Doubles as the aggregate-exposure heuristic for simultaneous bets.
    pub max_bet_fraction: f64,
    pub min_bet: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_bankroll: 10_000.0,
            max_bet_fraction: 0.10,
            min_bet: 1.0,
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str, default: f64) -> EngineResult<f64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}
