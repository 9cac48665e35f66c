//! Calibrated Kelly decision engine for binary betting markets.
//!
//! The pipeline: calibrate a raw forecast probability against realized
//! outcomes, strip bookmaker margin from the quoted prices, size the stake
//! with an uncertainty-penalized fractional Kelly, then gate the result
//! through a drawdown governor and a closing-line-value check. A paper
//! ledger tracks simulated bets in SQLite for validation before any real
//! capital moves.

pub mod clv;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod market;
pub mod models;
pub mod paper;
pub mod risk;

pub use clv::{closing_line_value, ClosingLineTracker};
pub use config::{EngineConfig, LedgerConfig};
pub use engine::{DecisionEngine, DecisionRecord};
pub use errors::{EngineError, EngineResult};
pub use market::{devig, DevigMethod, FairProbs};
pub use models::{BayesianCalibrator, CalibrationObservation, Calibrator, IsotonicCalibrator};
pub use paper::ledger::PaperLedger;
pub use risk::{compute_kelly, KellyDecision, KellyInputs, RiskGovernor};

/// Install the default tracing subscriber, honoring `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
