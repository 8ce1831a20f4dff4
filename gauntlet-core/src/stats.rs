//! Statistical aggregation over trial results.

use serde::{Deserialize, Serialize};

use crate::types::TrialResult;

/// Sample mean; zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); zero below two samples.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Half-width of the 95% confidence interval around the mean.
pub fn confidence_interval_95(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    1.96 * std_dev(values) / (values.len() as f64).sqrt()
}

/// Consistency of a sample: 1 minus the coefficient of variation, clamped
/// to [0, 1]. A zero mean yields zero consistency.
pub fn consistency(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    (1.0 - std_dev(values) / m).clamp(0.0, 1.0)
}

/// Aggregate statistics over a set of trials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialStatistics {
    pub samples: usize,
    pub mean_accuracy: f64,
    pub std_accuracy: f64,
    /// 95% CI half-width around the mean accuracy.
    pub accuracy_ci: f64,
    pub mean_latency_ms: f64,
    pub std_latency_ms: f64,
    pub success_rate: f64,
}

/// Aggregate trial results. Failed trials contribute their zero scores.
pub fn aggregate(trials: &[TrialResult]) -> TrialStatistics {
    let accuracies: Vec<f64> = trials.iter().map(|t| t.accuracy).collect();
    let latencies: Vec<f64> = trials.iter().map(|t| t.latency_ms as f64).collect();
    let successes = trials.iter().filter(|t| t.success).count();
    TrialStatistics {
        samples: trials.len(),
        mean_accuracy: mean(&accuracies),
        std_accuracy: std_dev(&accuracies),
        accuracy_ci: confidence_interval_95(&accuracies),
        mean_latency_ms: mean(&latencies),
        std_latency_ms: std_dev(&latencies),
        success_rate: if trials.is_empty() {
            0.0
        } else {
            successes as f64 / trials.len() as f64
        },
    }
}

/// Aggregate per-fold statistics by pooling the underlying trials. Folds
/// are repeat batches of the same trial set.
pub fn aggregate_folds(folds: &[Vec<TrialResult>]) -> TrialStatistics {
    let pooled: Vec<TrialResult> = folds.iter().flatten().cloned().collect();
    aggregate(&pooled)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrialResult;

    fn trial(accuracy: f64, latency_ms: u64, success: bool) -> TrialResult {
        let mut t = TrialResult::failed("t", "seed", latency_ms);
        t.accuracy = accuracy;
        t.success = success;
        t.failures.clear();
        t
    }

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-9);
        // Sample std dev of this classic set is ~2.138.
        assert!((std_dev(&values) - 2.138).abs() < 1e-3);
    }

    #[test]
    fn test_empty_and_singleton_are_safe() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert_eq!(confidence_interval_95(&[3.0]), 0.0);
        assert_eq!(consistency(&[]), 0.0);
    }

    #[test]
    fn test_consistency_bounds() {
        assert_eq!(consistency(&[5.0, 5.0, 5.0]), 1.0);
        // Wildly dispersed samples floor at zero.
        assert_eq!(consistency(&[0.001, 100.0, 0.001, 100.0]), 0.0);
    }

    #[test]
    fn test_aggregate_includes_failures_in_denominator() {
        let trials = vec![
            trial(0.9, 400, true),
            trial(0.8, 600, true),
            trial(0.0, 8000, false),
        ];
        let stats = aggregate(&trials);
        assert_eq!(stats.samples, 3);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.mean_accuracy - 0.5666).abs() < 1e-3);
        assert!(stats.accuracy_ci > 0.0);
    }

    #[test]
    fn test_aggregate_folds_pools_trials() {
        let folds = vec![
            vec![trial(1.0, 100, true)],
            vec![trial(0.0, 100, false)],
        ];
        let stats = aggregate_folds(&folds);
        assert_eq!(stats.samples, 2);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
    }
}
