/// Posterior-sampling calibrator.
///
/// Models `logit(p_true) = alpha + beta * logit(p_forecast)` with priors
/// `alpha ~ Normal(0, 1)` and `beta ~ Normal(1, 0.5)`, fit by random-walk
/// Metropolis over multiple chains with a warm-up/tuning phase. The
/// posterior predictive spread drives the Kelly uncertainty penalty.
use super::quality::{compute_quality, QualityReport};
use super::{logit, sigmoid, CalibrationObservation, Calibrator};
use crate::config::QualityConfig;
use crate::errors::{EngineError, EngineResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Continuous, Normal};

/// Recommended minimum training size; fitting below this only warns.
const MIN_OBSERVATIONS: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub chains: usize,
    pub warmup: usize,
    /// Post-warmup draws per chain.
    pub samples: usize,
    pub initial_step: f64,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            warmup: 400,
            samples: 600,
            initial_step: 0.10,
            seed: 0x5eed,
        }
    }
}

/// Convergence summary for operational health checks.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FitDiagnostics {
    /// Split-chain potential scale reduction for the intercept.
    pub r_hat_alpha: f64,
    /// Split-chain potential scale reduction for the slope.
    pub r_hat_beta: f64,
    pub acceptance_rate: f64,
    pub total_samples: usize,
}

impl FitDiagnostics {
    /// Loose convergence check; R-hat near 1 on both parameters.
    pub fn converged(&self) -> bool {
        self.r_hat_alpha < 1.1 && self.r_hat_beta < 1.1
    }
}

pub struct BayesianCalibrator {
    observations: Vec<CalibrationObservation>,
    /// Pooled posterior draws of (alpha, beta). Empty until fitted.
    samples: Vec<(f64, f64)>,
    /// Per-chain draws retained for the split-R-hat diagnostic.
    chains: Vec<Vec<(f64, f64)>>,
    acceptance_rate: f64,
    sampler: SamplerConfig,
    quality_cfg: QualityConfig,
}

impl BayesianCalibrator {
    pub fn new(quality_cfg: QualityConfig) -> Self {
        Self::with_sampler(quality_cfg, SamplerConfig::default())
    }

    pub fn with_sampler(quality_cfg: QualityConfig, sampler: SamplerConfig) -> Self {
        Self {
            observations: Vec::new(),
            samples: Vec::new(),
            chains: Vec::new(),
            acceptance_rate: 0.0,
            sampler,
            quality_cfg,
        }
    }

    /// Posterior predictive draws of the calibrated probability.
    pub fn predict_distribution(&self, forecast: f64) -> Vec<f64> {
        let x = logit(forecast);
        self.samples
            .iter()
            .map(|&(a, b)| sigmoid(a + b * x))
            .collect()
    }

    /// A chosen quantile of the posterior predictive distribution.
    /// Median by default at the trait level; lower quantiles are more
    /// conservative.
    pub fn calibrated_probability(&self, forecast: f64, quantile: f64) -> f64 {
        if self.samples.is_empty() {
            return forecast.clamp(0.0, 1.0);
        }
        let mut draws = self.predict_distribution(forecast);
        draws.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        empirical_quantile(&draws, quantile.clamp(0.0, 1.0))
    }

    /// Standard deviation of the posterior predictive distribution.
    pub fn calibration_uncertainty(&self, forecast: f64) -> f64 {
        if self.samples.is_empty() {
            return self.quality_cfg.isotonic_uncertainty;
        }
        let draws = self.predict_distribution(forecast);
        let n = draws.len() as f64;
        let mean = draws.iter().sum::<f64>() / n;
        let var = draws.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    }

    /// Central credible interval at level `1 - alpha`.
    pub fn calibration_interval(&self, forecast: f64, alpha: f64) -> (f64, f64) {
        if self.samples.is_empty() {
            let p = forecast.clamp(0.0, 1.0);
            return (p, p);
        }
        let mut draws = self.predict_distribution(forecast);
        draws.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let a = alpha.clamp(0.0, 1.0);
        (
            empirical_quantile(&draws, a / 2.0),
            empirical_quantile(&draws, 1.0 - a / 2.0),
        )
    }

    pub fn diagnostics(&self) -> Option<FitDiagnostics> {
        if self.chains.is_empty() {
            return None;
        }
        Some(FitDiagnostics {
            r_hat_alpha: split_r_hat(&self.chains, |s| s.0),
            r_hat_beta: split_r_hat(&self.chains, |s| s.1),
            acceptance_rate: self.acceptance_rate,
            total_samples: self.samples.len(),
        })
    }

    fn log_posterior(alpha: f64, beta: f64, data: &[(f64, f64)], priors: &Priors) -> f64 {
        let mut lp = priors.alpha.ln_pdf(alpha) + priors.beta.ln_pdf(beta);
        for &(x, y) in data {
            let p = sigmoid(alpha + beta * x).clamp(1e-12, 1.0 - 1e-12);
            lp += y * p.ln() + (1.0 - y) * (1.0 - p).ln();
        }
        lp
    }
}

struct Priors {
    alpha: Normal,
    beta: Normal,
}

impl Calibrator for BayesianCalibrator {
    fn is_fitted(&self) -> bool {
        !self.samples.is_empty()
    }

    fn calibrate(&self, forecast: f64) -> f64 {
        self.calibrated_probability(forecast, 0.5)
    }

    fn uncertainty(&self, forecast: f64) -> f64 {
        self.calibration_uncertainty(forecast)
    }

    fn quality(&self, recent_n: usize) -> QualityReport {
        compute_quality(&self.observations, recent_n, &self.quality_cfg)
    }

    fn record(&mut self, obs: CalibrationObservation) {
        self.observations.push(obs);
    }

    fn fit(&mut self) -> EngineResult<()> {
        if self.observations.is_empty() {
            return Err(EngineError::Fit(
                "cannot fit bayesian calibrator with zero observations".into(),
            ));
        }
        if self.observations.len() < MIN_OBSERVATIONS {
            tracing::warn!(
                n = self.observations.len(),
                min = MIN_OBSERVATIONS,
                "fitting bayesian calibrator below recommended sample size"
            );
        }

        let data: Vec<(f64, f64)> = self
            .observations
            .iter()
            .map(|o| (logit(o.forecast_prob), if o.outcome { 1.0 } else { 0.0 }))
            .collect();

        let priors = Priors {
            alpha: Normal::new(0.0, 1.0).map_err(|e| EngineError::Fit(e.to_string()))?,
            beta: Normal::new(1.0, 0.5).map_err(|e| EngineError::Fit(e.to_string()))?,
        };

        let mut chains: Vec<Vec<(f64, f64)>> = Vec::with_capacity(self.sampler.chains);
        let mut accepted: u64 = 0;
        let mut proposed: u64 = 0;

        for chain_idx in 0..self.sampler.chains {
            let mut rng = StdRng::seed_from_u64(self.sampler.seed.wrapping_add(chain_idx as u64));
            // Overdispersed starts around the prior means
            let mut alpha = 0.0 + 0.5 * (chain_idx as f64 - 1.5);
            let mut beta = 1.0 + 0.25 * (chain_idx as f64 - 1.5);
            let mut lp = Self::log_posterior(alpha, beta, &data, &priors);
            let mut step = self.sampler.initial_step;
            let mut window_accepted = 0u32;

            let mut draws = Vec::with_capacity(self.sampler.samples);
            let total = self.sampler.warmup + self.sampler.samples;
            for iter in 0..total {
                let prop_alpha = alpha + step * (rng.gen::<f64>() * 2.0 - 1.0);
                let prop_beta = beta + step * (rng.gen::<f64>() * 2.0 - 1.0);
                let prop_lp = Self::log_posterior(prop_alpha, prop_beta, &data, &priors);

                let accept = prop_lp >= lp || rng.gen::<f64>() < (prop_lp - lp).exp();
                if accept {
                    alpha = prop_alpha;
                    beta = prop_beta;
                    lp = prop_lp;
                    window_accepted += 1;
                }

                if iter < self.sampler.warmup {
                    // Tune the proposal scale toward ~30% acceptance
                    if (iter + 1) % 50 == 0 {
                        let rate = window_accepted as f64 / 50.0;
                        if rate > 0.35 {
                            step *= 1.2;
                        } else if rate < 0.20 {
                            step *= 0.8;
                        }
                        window_accepted = 0;
                    }
                } else {
                    draws.push((alpha, beta));
                    proposed += 1;
                    if accept {
                        accepted += 1;
                    }
                }
            }
            chains.push(draws);
        }

        self.samples = chains.iter().flatten().copied().collect();
        self.chains = chains;
        self.acceptance_rate = if proposed == 0 {
            0.0
        } else {
            accepted as f64 / proposed as f64
        };

        if let Some(diag) = self.diagnostics() {
            if !diag.converged() {
                tracing::warn!(
                    r_hat_alpha = diag.r_hat_alpha,
                    r_hat_beta = diag.r_hat_beta,
                    "bayesian calibrator chains may not have converged"
                );
            }
            tracing::debug!(
                samples = diag.total_samples,
                acceptance = diag.acceptance_rate,
                "bayesian calibrator fitted"
            );
        }
        Ok(())
    }

    fn observation_count(&self) -> usize {
        self.observations.len()
    }
}

/// Quantile of a sorted sample with linear interpolation.
fn empirical_quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let t = pos - lo as f64;
        sorted[lo] * (1.0 - t) + sorted[hi] * t
    }
}

/// Split-chain potential scale reduction factor (Gelman-Rubin).
fn split_r_hat(chains: &[Vec<(f64, f64)>], extract: fn(&(f64, f64)) -> f64) -> f64 {
    let mut sequences: Vec<Vec<f64>> = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        let vals: Vec<f64> = chain.iter().map(extract).collect();
        let half = vals.len() / 2;
        if half < 2 {
            continue;
        }
        sequences.push(vals[..half].to_vec());
        sequences.push(vals[half..2 * half].to_vec());
    }
    if sequences.len() < 2 {
        return f64::NAN;
    }

    let m = sequences.len() as f64;
    let n = sequences[0].len() as f64;
    let means: Vec<f64> = sequences
        .iter()
        .map(|s| s.iter().sum::<f64>() / n)
        .collect();
    let grand = means.iter().sum::<f64>() / m;
    let b = n / (m - 1.0) * means.iter().map(|mu| (mu - grand) * (mu - grand)).sum::<f64>();
    let w = sequences
        .iter()
        .zip(&means)
        .map(|(s, mu)| s.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / (n - 1.0))
        .sum::<f64>()
        / m;
    if w < 1e-12 {
        return 1.0;
    }
    let var_plus = (n - 1.0) / n * w + b / n;
    (var_plus / w).sqrt()
}
