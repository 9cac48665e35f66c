pub mod bayesian;
pub mod isotonic;
pub mod quality;

pub use bayesian::BayesianCalibrator;
pub use isotonic::IsotonicCalibrator;
pub use quality::QualityReport;

use crate::errors::EngineResult;
use chrono::{DateTime, Utc};

/// One settled forecast. Append-only; never mutated or deleted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CalibrationObservation {
    pub timestamp: DateTime<Utc>,
    /// Raw model forecast in [0, 1].
    pub forecast_prob: f64,
    /// Realized binary outcome.
    pub outcome: bool,
    /// Vig-free market probability at bet time, when known.
    pub market_fair_prob: Option<f64>,
}

impl CalibrationObservation {
    pub fn new(forecast_prob: f64, outcome: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            forecast_prob,
            outcome,
            market_fair_prob: None,
        }
    }
}

/// Probability calibration capability.
///
/// Both variants expose the same surface so the orchestrator never probes
/// for which concrete model it holds. The point-estimate variant reports a
/// fixed conservative uncertainty; the Bayesian variant reports the
/// posterior predictive standard deviation.
pub trait Calibrator: Send {
    fn is_fitted(&self) -> bool;

    /// Map a raw forecast to a corrected probability. Output is always in
    /// [0, 1]. Before fitting this passes the input through unchanged.
    fn calibrate(&self, forecast: f64) -> f64;

    /// Standard deviation of the calibrated probability estimate.
    fn uncertainty(&self, forecast: f64) -> f64;

    /// Brier score / log loss over the most recent `recent_n` observations.
    /// With zero observations this returns the documented cold-start
    /// defaults flagged `measured = false`, never an unbounded value.
    fn quality(&self, recent_n: usize) -> QualityReport;

    /// Append a settled observation to the history.
    fn record(&mut self, obs: CalibrationObservation);

    /// Refit from the full history. Blocking and CPU-bound; invoked
    /// explicitly, never on the decision hot path.
    fn fit(&mut self) -> EngineResult<()>;

    fn observation_count(&self) -> usize;
}

/// Logit transform with clamping away from the boundaries.
pub(crate) fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
