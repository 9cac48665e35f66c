/// Point-estimate calibrator: isotonic regression via pool-adjacent-violators.
///
/// Fits a monotone non-decreasing map from forecast probability to
/// empirical outcome rate. Deterministic and fast; carries no posterior,
/// so `uncertainty()` reports a fixed conservative constant.
use super::quality::{compute_quality, QualityReport};
use super::{CalibrationObservation, Calibrator};
use crate::config::QualityConfig;
use crate::errors::{EngineError, EngineResult};

/// Recommended minimum training size; fitting below this only warns.
const MIN_OBSERVATIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct IsotonicCalibrator {
    observations: Vec<CalibrationObservation>,
    /// Fitted curve as (forecast, calibrated) knots, non-decreasing in
    /// both coordinates. None until `fit` succeeds.
    curve: Option<Vec<(f64, f64)>>,
    quality_cfg: QualityConfig,
}

impl IsotonicCalibrator {
    pub fn new(quality_cfg: QualityConfig) -> Self {
        Self {
            observations: Vec::new(),
            curve: None,
            quality_cfg,
        }
    }

    /// Piecewise-linear interpolation over the fitted knots, constant
    /// beyond the ends.
    fn interpolate(curve: &[(f64, f64)], x: f64) -> f64 {
        match curve {
            [] => x,
            [(_, y)] => *y,
            _ => {
                if x <= curve[0].0 {
                    return curve[0].1;
                }
                if x >= curve[curve.len() - 1].0 {
                    return curve[curve.len() - 1].1;
                }
                for pair in curve.windows(2) {
                    let (x0, y0) = pair[0];
                    let (x1, y1) = pair[1];
                    if x <= x1 {
                        if (x1 - x0).abs() < 1e-12 {
                            return y1;
                        }
                        let t = (x - x0) / (x1 - x0);
                        return y0 + t * (y1 - y0);
                    }
                }
                curve[curve.len() - 1].1
            }
        }
    }
}

impl Calibrator for IsotonicCalibrator {
    fn is_fitted(&self) -> bool {
        self.curve.is_some()
    }

    fn calibrate(&self, forecast: f64) -> f64 {
        let p = forecast.clamp(0.0, 1.0);
        match &self.curve {
            Some(curve) => Self::interpolate(curve, p).clamp(0.0, 1.0),
            None => p,
        }
    }

    fn uncertainty(&self, _forecast: f64) -> f64 {
        self.quality_cfg.isotonic_uncertainty
    }

    fn quality(&self, recent_n: usize) -> QualityReport {
        compute_quality(&self.observations, recent_n, &self.quality_cfg)
    }

    fn record(&mut self, obs: CalibrationObservation) {
        self.observations.push(obs);
    }

    /// Pool-adjacent-violators over the sorted training set.
    ///
    /// Adjacent blocks whose weighted means violate monotonicity are merged
    /// until the block means are non-decreasing; the merged means become
    /// the calibration knots.
    fn fit(&mut self) -> EngineResult<()> {
        if self.observations.is_empty() {
            return Err(EngineError::Fit(
                "cannot fit isotonic calibrator with zero observations".into(),
            ));
        }
        if self.observations.len() < MIN_OBSERVATIONS {
            tracing::warn!(
                n = self.observations.len(),
                min = MIN_OBSERVATIONS,
                "fitting isotonic calibrator below recommended sample size"
            );
        }

        let mut data: Vec<(f64, f64)> = self
            .observations
            .iter()
            .map(|o| (o.forecast_prob, if o.outcome { 1.0 } else { 0.0 }))
            .collect();
        data.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Each block: (sum_x, sum_y, weight)
        let mut blocks: Vec<(f64, f64, f64)> = Vec::with_capacity(data.len());
        for (x, y) in data {
            blocks.push((x, y, 1.0));
            // Merge backwards while the monotonicity constraint is violated
            while blocks.len() >= 2 {
                let n = blocks.len();
                let (bx, by, bw) = blocks[n - 1];
                let (ax, ay, aw) = blocks[n - 2];
                if ay / aw > by / bw {
                    blocks.truncate(n - 2);
                    blocks.push((ax + bx, ay + by, aw + bw));
                } else {
                    break;
                }
            }
        }

        let curve: Vec<(f64, f64)> = blocks
            .iter()
            .map(|(sx, sy, w)| (sx / w, (sy / w).clamp(0.0, 1.0)))
            .collect();

        tracing::debug!(
            knots = curve.len(),
            n = self.observations.len(),
            "isotonic calibrator fitted"
        );
        self.curve = Some(curve);
        Ok(())
    }

    fn observation_count(&self) -> usize {
        self.observations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn fitted_from(pairs: &[(f64, bool)]) -> IsotonicCalibrator {
        let mut cal = IsotonicCalibrator::new(QualityConfig::default());
        for &(p, y) in pairs {
            cal.record(CalibrationObservation::new(p, y));
        }
        cal.fit().unwrap();
        cal
    }

    #[test]
    fn test_unfitted_passthrough() {
        let cal = IsotonicCalibrator::new(QualityConfig::default());
        assert!(!cal.is_fitted());
        assert!((cal.calibrate(0.7) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_fit_zero_observations_errors() {
        let mut cal = IsotonicCalibrator::new(QualityConfig::default());
        assert!(cal.fit().is_err());
    }

    #[test]
    fn test_output_in_unit_interval() {
        let pairs: Vec<(f64, bool)> = (0..50)
            .map(|i| (i as f64 / 50.0, i % 3 != 0))
            .collect();
        let cal = fitted_from(&pairs);
        for i in 0..=100 {
            let p = i as f64 / 100.0;
            let c = cal.calibrate(p);
            assert!((0.0..=1.0).contains(&c), "calibrate({p}) = {c}");
        }
    }

    #[test]
    fn test_mapping_non_decreasing() {
        let mut rng = StdRng::seed_from_u64(7);
        let pairs: Vec<(f64, bool)> = (0..200)
            .map(|_| {
                let p: f64 = rng.gen();
                (p, rng.gen::<f64>() < p)
            })
            .collect();
        let cal = fitted_from(&pairs);
        let mut prev = cal.calibrate(0.0);
        for i in 1..=200 {
            let c = cal.calibrate(i as f64 / 200.0);
            assert!(c >= prev - 1e-12, "mapping decreased at {i}: {c} < {prev}");
            prev = c;
        }
    }

    #[test]
    fn test_corrects_overconfident_forecasts() {
        // Forecasts say 0.9 but outcomes hit only ~60%
        let pairs: Vec<(f64, bool)> = (0..100).map(|i| (0.9, i % 5 < 3)).collect();
        let cal = fitted_from(&pairs);
        let c = cal.calibrate(0.9);
        assert!(c < 0.7, "overconfidence should be corrected: {c}");
    }

    #[test]
    fn test_fixed_uncertainty() {
        let cal = IsotonicCalibrator::new(QualityConfig::default());
        assert!((cal.uncertainty(0.3) - 0.05).abs() < 1e-12);
        assert!((cal.uncertainty(0.9) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_quality_flows_from_history() {
        let pairs: Vec<(f64, bool)> = (0..40).map(|i| (0.5, i % 2 == 0)).collect();
        let cal = fitted_from(&pairs);
        let q = cal.quality(100);
        assert!(q.measured);
        assert!((q.brier - 0.25).abs() < 1e-9);
    }
}
