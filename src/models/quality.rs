/// Calibration quality metrics over recent history.
use super::CalibrationObservation;
use crate::config::QualityConfig;

/// Brier score and log loss over a recent window.
///
/// `measured = false` means the figures are the documented cold-start
/// defaults, not observed quality. Callers branch on this flag instead of
/// sniffing for sentinel values; the defaults are finite by contract.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QualityReport {
    pub brier: f64,
    pub log_loss: f64,
    pub sample_count: usize,
    pub measured: bool,
}

impl QualityReport {
    pub fn unmeasured(cfg: &QualityConfig) -> Self {
        Self {
            brier: cfg.default_brier,
            log_loss: cfg.default_log_loss,
            sample_count: 0,
            measured: false,
        }
    }
}

/// Compute quality over the most recent `recent_n` observations.
pub fn compute_quality(
    observations: &[CalibrationObservation],
    recent_n: usize,
    cfg: &QualityConfig,
) -> QualityReport {
    if observations.is_empty() {
        tracing::warn!(
            default_brier = cfg.default_brier,
            "no calibration history; reporting cold-start quality defaults"
        );
        return QualityReport::unmeasured(cfg);
    }

    let start = observations.len().saturating_sub(recent_n);
    let window = &observations[start..];

    let mut brier_sum = 0.0;
    let mut log_loss_sum = 0.0;
    for obs in window {
        let y = if obs.outcome { 1.0 } else { 0.0 };
        let p = obs.forecast_prob.clamp(1e-12, 1.0 - 1e-12);
        let d = p - y;
        brier_sum += d * d;
        log_loss_sum += -(y * p.ln() + (1.0 - y) * (1.0 - p).ln());
    }

    let n = window.len() as f64;
    QualityReport {
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        sample_count: window.len(),
        measured: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(p: f64, outcome: bool) -> CalibrationObservation {
        CalibrationObservation::new(p, outcome)
    }

    #[test]
    fn test_empty_history_defaults() {
        let cfg = QualityConfig::default();
        let q = compute_quality(&[], 100, &cfg);
        assert!((q.brier - 0.15).abs() < 1e-12);
        assert!((q.log_loss - std::f64::consts::LN_2).abs() < 1e-12);
        assert!(!q.measured);
        assert!(q.brier.is_finite() && q.log_loss.is_finite());
        assert_eq!(q.sample_count, 0);
    }

    #[test]
    fn test_perfect_forecasts() {
        let cfg = QualityConfig::default();
        let history: Vec<_> = (0..20)
            .map(|i| obs(if i % 2 == 0 { 0.999 } else { 0.001 }, i % 2 == 0))
            .collect();
        let q = compute_quality(&history, 100, &cfg);
        assert!(q.measured);
        assert!(q.brier < 0.001, "brier was {}", q.brier);
        assert!(q.log_loss < 0.01);
    }

    #[test]
    fn test_coin_flip_quality() {
        let cfg = QualityConfig::default();
        let history: Vec<_> = (0..100).map(|i| obs(0.5, i % 2 == 0)).collect();
        let q = compute_quality(&history, 100, &cfg);
        assert!((q.brier - 0.25).abs() < 1e-9);
        assert!((q.log_loss - std::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn test_window_limits_scope() {
        let cfg = QualityConfig::default();
        // 50 terrible old forecasts, 50 perfect recent ones
        let mut history: Vec<_> = (0..50).map(|_| obs(0.99, false)).collect();
        history.extend((0..50).map(|_| obs(0.999, true)));
        let q = compute_quality(&history, 50, &cfg);
        assert_eq!(q.sample_count, 50);
        assert!(q.brier < 0.001, "only recent window should count: {}", q.brier);
    }

    #[test]
    fn test_extreme_forecast_finite_log_loss() {
        let cfg = QualityConfig::default();
        // confident and wrong; clamping must keep log loss finite
        let history = vec![obs(1.0, false), obs(0.0, true)];
        let q = compute_quality(&history, 100, &cfg);
        assert!(q.log_loss.is_finite());
        assert!(q.brier <= 1.0);
    }
}
