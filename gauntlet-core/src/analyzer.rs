//! Comparative analysis across prompting approaches.
//!
//! Ranks approaches on a weighted blend of success, token efficiency,
//! latency, and consistency, then validates whether the compact (MCD)
//! approach holds a material advantage over the rest of the field.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::AnalyzerConfig;
use crate::stats;
use crate::types::{Approach, VariantResult};

/// Aggregate performance of one approach across its variant results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachSummary {
    pub approach: Approach,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_tokens: f64,
    pub consistency: f64,
    pub samples: usize,
}

impl ApproachSummary {
    /// Pool variant results into one summary. Empty input yields a
    /// zero-sample summary with zeroed metrics.
    pub fn from_results(approach: Approach, results: &[VariantResult]) -> Self {
        let success_rates: Vec<f64> = results.iter().map(|r| r.success_ratio).collect();
        let latencies: Vec<f64> = results.iter().map(|r| r.avg_latency_ms).collect();
        let tokens: Vec<f64> = results.iter().map(|r| r.avg_tokens).collect();
        Self {
            approach,
            success_rate: stats::mean(&success_rates),
            avg_latency_ms: stats::mean(&latencies),
            avg_tokens: stats::mean(&tokens),
            // Consistency is latency stability: 1 minus the latency
            // coefficient of variation.
            consistency: stats::consistency(&latencies),
            samples: results.iter().map(|r| r.trials.len()).sum(),
        }
    }
}

/// One ranked approach with its composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedApproach {
    pub approach: Approach,
    pub score: f64,
    pub summary: ApproachSummary,
}

/// Verdict on the compact approach's claimed advantage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvantageValidation {
    pub validated: bool,
    pub success_advantage: f64,
    pub token_advantage: f64,
    pub latency_advantage: f64,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence_level: f64,
    pub statistically_significant: bool,
}

/// Full comparative analysis output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeAnalysis {
    pub rankings: Vec<RankedApproach>,
    pub baseline: ApproachSummary,
    pub advantage: Option<AdvantageValidation>,
}

/// Ranks approaches and validates the compact-approach advantage.
#[derive(Debug, Clone, Default)]
pub struct ComparativeAnalyzer {
    config: AnalyzerConfig,
}

impl ComparativeAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Rank all approaches by the weighted composite score. Latency is
    /// normalized inversely against the fastest approach so lower is
    /// better. Ties break deterministically by approach label.
    pub fn rank(&self, results: &HashMap<Approach, Vec<VariantResult>>) -> Vec<RankedApproach> {
        let summaries: Vec<ApproachSummary> = results
            .iter()
            .map(|(approach, rs)| ApproachSummary::from_results(*approach, rs))
            .collect();

        let min_latency = summaries
            .iter()
            .map(|s| s.avg_latency_ms)
            .filter(|l| *l > 0.0)
            .fold(f64::INFINITY, f64::min);

        let mut ranked: Vec<RankedApproach> = summaries
            .into_iter()
            .map(|summary| {
                let latency_norm = if summary.avg_latency_ms > 0.0 && min_latency.is_finite() {
                    min_latency / summary.avg_latency_ms
                } else {
                    0.0
                };
                let efficiency = if summary.avg_tokens > 0.0 {
                    (self.config.efficiency_token_baseline / summary.avg_tokens).min(1.0)
                } else {
                    0.0
                };
                let score = self.config.success_weight * summary.success_rate
                    + self.config.efficiency_weight * efficiency
                    + self.config.latency_weight * latency_norm
                    + self.config.consistency_weight * summary.consistency;
                RankedApproach {
                    approach: summary.approach,
                    score,
                    summary,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.approach.label().cmp(b.approach.label()))
        });
        ranked
    }

    /// Full analysis: rankings, baseline resolution, and advantage
    /// validation of the compact approach when present.
    pub fn analyze(
        &self,
        results: &HashMap<Approach, Vec<VariantResult>>,
    ) -> ComparativeAnalysis {
        let rankings = self.rank(results);
        let baseline = self.resolve_baseline(results);

        let advantage = results.get(&Approach::Compact).map(|compact_results| {
            let mcd = ApproachSummary::from_results(Approach::Compact, compact_results);
            let others: Vec<ApproachSummary> = results
                .iter()
                .filter(|(a, _)| !a.is_compact())
                .map(|(a, rs)| ApproachSummary::from_results(*a, rs))
                .collect();
            let field = if others.is_empty() {
                vec![baseline.clone()]
            } else {
                others
            };
            self.validate_advantage(&mcd, &field)
        });

        ComparativeAnalysis {
            rankings,
            baseline,
            advantage,
        }
    }

    /// The comparison baseline is the conversational approach when its
    /// results exist, otherwise the configured fixed baseline.
    fn resolve_baseline(
        &self,
        results: &HashMap<Approach, Vec<VariantResult>>,
    ) -> ApproachSummary {
        match results.get(&Approach::Conversational) {
            Some(rs) if !rs.is_empty() => {
                ApproachSummary::from_results(Approach::Conversational, rs)
            }
            _ => {
                debug!("No conversational results; using fixed fallback baseline");
                ApproachSummary {
                    approach: Approach::Conversational,
                    success_rate: self.config.fallback_baseline_success_rate,
                    avg_latency_ms: self.config.fallback_baseline_avg_latency_ms,
                    avg_tokens: self.config.fallback_baseline_avg_tokens,
                    consistency: 0.5,
                    samples: 0,
                }
            }
        }
    }

    /// Validate the compact approach's advantage over the field. Each
    /// advantage ratio must clear its configured minimum or a concern is
    /// recorded with a matching recommendation.
    pub fn validate_advantage(
        &self,
        mcd: &ApproachSummary,
        others: &[ApproachSummary],
    ) -> AdvantageValidation {
        let field_success = stats::mean(
            &others.iter().map(|s| s.success_rate).collect::<Vec<_>>(),
        );
        let field_latency = stats::mean(
            &others.iter().map(|s| s.avg_latency_ms).collect::<Vec<_>>(),
        );
        let field_tokens =
            stats::mean(&others.iter().map(|s| s.avg_tokens).collect::<Vec<_>>());

        let success_advantage = ratio(mcd.success_rate, field_success);
        // Fewer tokens and lower latency are advantages, so the field sits
        // in the numerator for these two.
        let token_advantage = ratio(field_tokens, mcd.avg_tokens);
        let latency_advantage = ratio(field_latency, mcd.avg_latency_ms);

        let mut concerns = Vec::new();
        let mut recommendations = Vec::new();
        if success_advantage < self.config.success_advantage_min {
            concerns.push(format!(
                "Success advantage {success_advantage:.2}x below required {:.2}x",
                self.config.success_advantage_min
            ));
            recommendations
                .push("Tighten required elements or re-examine prompt compactness".to_string());
        }
        if token_advantage < self.config.token_advantage_min {
            concerns.push(format!(
                "Token advantage {token_advantage:.2}x below required {:.2}x",
                self.config.token_advantage_min
            ));
            recommendations.push("Reduce prompt overhead in the compact template".to_string());
        }
        if latency_advantage < self.config.latency_advantage_min {
            concerns.push(format!(
                "Latency advantage {latency_advantage:.2}x below required {:.2}x",
                self.config.latency_advantage_min
            ));
            recommendations
                .push("Profile engine round-trips; latency gains may need smaller outputs".to_string());
        }

        let min_samples = others
            .iter()
            .map(|s| s.samples)
            .chain(std::iter::once(mcd.samples))
            .min()
            .unwrap_or(0);
        let mean_effect = (success_advantage / self.config.success_advantage_min
            + token_advantage / self.config.token_advantage_min
            + latency_advantage / self.config.latency_advantage_min)
            / 3.0;
        let confidence_level =
            (mean_effect * (min_samples as f64).sqrt() / 2.0).clamp(0.0, 1.0);
        let statistically_significant = confidence_level >= self.config.significance_cutoff;

        AdvantageValidation {
            validated: concerns.is_empty(),
            success_advantage,
            token_advantage,
            latency_advantage,
            concerns,
            recommendations,
            confidence_level,
            statistically_significant,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        if numerator > 0.0 {
            f64::INFINITY
        } else {
            1.0
        }
    } else {
        numerator / denominator
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Tier, TrialResult};

    fn variant_result(
        approach: Approach,
        success_ratio: f64,
        avg_latency_ms: f64,
        avg_tokens: f64,
        trial_count: usize,
    ) -> VariantResult {
        let trials: Vec<TrialResult> = (0..trial_count)
            .map(|i| {
                let mut t = TrialResult::failed(format!("t{i}"), "seed", avg_latency_ms as u64);
                t.accuracy = success_ratio;
                t.success = success_ratio > 0.5;
                t.failures.clear();
                t
            })
            .collect();
        VariantResult {
            variant_id: format!("v-{}", approach.label()),
            approach,
            tier: Tier::Q4,
            avg_latency_ms,
            avg_tokens,
            success_rate: format!("{}/{}", trial_count, trial_count),
            success_ratio,
            mcd_alignment_rate: 0.0,
            efficiency_score: 0.5,
            statistics: stats::aggregate(&trials),
            profile_diff: None,
            trials,
        }
    }

    #[test]
    fn test_summary_consistency_tracks_latency_stability() {
        let steady = ApproachSummary::from_results(
            Approach::Compact,
            &[
                variant_result(Approach::Compact, 0.8, 500.0, 60.0, 2),
                variant_result(Approach::Compact, 0.8, 500.0, 60.0, 2),
            ],
        );
        let jittery = ApproachSummary::from_results(
            Approach::Compact,
            &[
                variant_result(Approach::Compact, 0.8, 100.0, 60.0, 2),
                variant_result(Approach::Compact, 0.8, 900.0, 60.0, 2),
            ],
        );
        // Identical per-trial scores: only the latency spread separates
        // the two summaries.
        assert!((steady.consistency - 1.0).abs() < 1e-9);
        assert!(jittery.consistency < steady.consistency);
    }

    #[test]
    fn test_rank_prefers_higher_success() {
        let analyzer = ComparativeAnalyzer::default();
        let mut results = HashMap::new();
        results.insert(
            Approach::Compact,
            vec![variant_result(Approach::Compact, 0.9, 400.0, 60.0, 5)],
        );
        results.insert(
            Approach::Conversational,
            vec![variant_result(Approach::Conversational, 0.4, 2000.0, 250.0, 5)],
        );
        let ranked = analyzer.rank(&results);
        assert_eq!(ranked[0].approach, Approach::Compact);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_efficiency_baseline_comes_from_config() {
        let mut results = HashMap::new();
        results.insert(
            Approach::Compact,
            vec![variant_result(Approach::Compact, 0.9, 400.0, 60.0, 5)],
        );
        let default_score = ComparativeAnalyzer::default().rank(&results)[0].score;

        let tight = AnalyzerConfig {
            efficiency_token_baseline: 50.0,
            ..AnalyzerConfig::default()
        };
        let tight_score = ComparativeAnalyzer::new(tight).rank(&results)[0].score;
        // A smaller yardstick makes 60 average tokens less efficient.
        assert!(tight_score < default_score);
    }

    #[test]
    fn test_rank_tie_breaks_by_label() {
        let analyzer = ComparativeAnalyzer::default();
        let mut results = HashMap::new();
        results.insert(
            Approach::Hybrid,
            vec![variant_result(Approach::Hybrid, 0.5, 1000.0, 100.0, 2)],
        );
        results.insert(
            Approach::FewShot,
            vec![variant_result(Approach::FewShot, 0.5, 1000.0, 100.0, 2)],
        );
        let ranked = analyzer.rank(&results);
        // Identical metrics: "few_shot" sorts before "hybrid".
        assert_eq!(ranked[0].approach, Approach::FewShot);
    }

    #[test]
    fn test_double_success_rate_clears_advantage_threshold() {
        let analyzer = ComparativeAnalyzer::default();
        let mcd = ApproachSummary {
            approach: Approach::Compact,
            success_rate: 0.8,
            avg_latency_ms: 500.0,
            avg_tokens: 60.0,
            consistency: 0.9,
            samples: 10,
        };
        let others = vec![ApproachSummary {
            approach: Approach::Conversational,
            success_rate: 0.4,
            avg_latency_ms: 2000.0,
            avg_tokens: 250.0,
            consistency: 0.5,
            samples: 10,
        }];
        let verdict = analyzer.validate_advantage(&mcd, &others);
        assert!((verdict.success_advantage - 2.0).abs() < 1e-9);
        assert!(verdict.validated, "concerns: {:?}", verdict.concerns);
        assert!(verdict.statistically_significant);
    }

    #[test]
    fn test_thin_advantage_raises_concerns() {
        let analyzer = ComparativeAnalyzer::default();
        let mcd = ApproachSummary {
            approach: Approach::Compact,
            success_rate: 0.5,
            avg_latency_ms: 1900.0,
            avg_tokens: 240.0,
            consistency: 0.5,
            samples: 4,
        };
        let others = vec![ApproachSummary {
            approach: Approach::Conversational,
            success_rate: 0.45,
            avg_latency_ms: 2000.0,
            avg_tokens: 250.0,
            consistency: 0.5,
            samples: 4,
        }];
        let verdict = analyzer.validate_advantage(&mcd, &others);
        assert!(!verdict.validated);
        assert_eq!(verdict.concerns.len(), 3);
        assert_eq!(verdict.recommendations.len(), 3);
    }

    #[test]
    fn test_analyze_falls_back_to_fixed_baseline() {
        let analyzer = ComparativeAnalyzer::default();
        let mut results = HashMap::new();
        results.insert(
            Approach::Compact,
            vec![variant_result(Approach::Compact, 0.9, 400.0, 60.0, 5)],
        );
        let analysis = analyzer.analyze(&results);
        assert_eq!(analysis.baseline.samples, 0);
        assert!((analysis.baseline.success_rate - 0.5).abs() < 1e-9);
        let advantage = analysis.advantage.expect("compact advantage computed");
        // 0.9 / 0.5 = 1.8x clears the 1.5x bar against the fallback.
        assert!(advantage.success_advantage >= 1.5);
    }
}
