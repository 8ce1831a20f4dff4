//! Result assembly: trials into variant results, variants into scenario
//! and walkthrough results with domain metrics.

use chrono::Utc;
use tracing::debug;

use crate::stats;
use crate::types::{
    DomainMetrics, ProfileDiff, ScenarioResult, Tier, TrialResult, Variant, VariantResult,
    Walkthrough, WalkthroughResult,
};

/// Clamp a percentage-like value into [0, 100].
pub fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Fold a variant's trial results into a [`VariantResult`].
/// `token_baseline` is the completion-size yardstick for the efficiency
/// term, normally `AnalyzerConfig::efficiency_token_baseline`.
pub fn variant_result_from_trials(
    variant: &Variant,
    tier: Tier,
    trials: Vec<TrialResult>,
    token_baseline: f64,
) -> VariantResult {
    let total = trials.len();
    let successes = trials.iter().filter(|t| t.success).count();
    let compliant = trials.iter().filter(|t| t.mcd_compliant).count();

    let latencies: Vec<f64> = trials.iter().map(|t| t.latency_ms as f64).collect();
    let tokens: Vec<f64> = trials.iter().map(|t| t.tokens.total() as f64).collect();
    let avg_latency_ms = stats::mean(&latencies);
    let avg_tokens = stats::mean(&tokens);
    let success_ratio = if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    };
    let mcd_alignment_rate = if total == 0 {
        0.0
    } else {
        compliant as f64 / total as f64
    };

    // Efficiency blends latency against the tier's expectation with a
    // completion-size economy term.
    let expected_latency = tier.expectations().expected_latency_ms as f64;
    let latency_term = if avg_latency_ms > 0.0 {
        (expected_latency / avg_latency_ms).min(1.0)
    } else {
        1.0
    };
    let token_term = if avg_tokens > 0.0 {
        (token_baseline / avg_tokens).min(1.0)
    } else {
        1.0
    };
    let efficiency_score = (0.5 * latency_term + 0.5 * token_term).clamp(0.0, 1.0);

    let profile_diff = variant.expected_profile.as_ref().map(|profile| ProfileDiff {
        latency_delta_ms: avg_latency_ms - profile.avg_latency_ms,
        token_delta: avg_tokens - profile.avg_tokens,
        success_delta: success_ratio - profile.success_rate,
    });

    let statistics = stats::aggregate(&trials);

    VariantResult {
        variant_id: variant.id.clone(),
        approach: variant.approach,
        tier,
        avg_latency_ms,
        avg_tokens,
        success_rate: format!("{successes}/{total}"),
        success_ratio,
        mcd_alignment_rate,
        efficiency_score,
        statistics,
        profile_diff,
        trials,
    }
}

/// Build a scenario result from its variant results.
pub fn scenario_result(step: usize, context: &str, variant_results: Vec<VariantResult>) -> ScenarioResult {
    ScenarioResult {
        step,
        context: context.to_string(),
        variant_results,
    }
}

/// Assemble the full walkthrough result at one tier, deriving the domain
/// metrics and human-readable recommendations from its scenarios.
pub fn assemble_walkthrough_result(
    walkthrough: &Walkthrough,
    tier: Tier,
    scenario_results: Vec<ScenarioResult>,
    execution_time_ms: u64,
) -> WalkthroughResult {
    let all_trials: Vec<&TrialResult> = scenario_results
        .iter()
        .flat_map(|s| s.variant_results.iter())
        .flat_map(|v| v.trials.iter())
        .collect();
    let total_trials = all_trials.len();
    let successful_trials = all_trials.iter().filter(|t| t.success).count();
    let success_ratio = if total_trials == 0 {
        0.0
    } else {
        successful_trials as f64 / total_trials as f64
    };

    let variant_results: Vec<&VariantResult> = scenario_results
        .iter()
        .flat_map(|s| s.variant_results.iter())
        .collect();
    let mcd_rates: Vec<f64> = variant_results.iter().map(|v| v.mcd_alignment_rate).collect();
    let efficiencies: Vec<f64> = variant_results.iter().map(|v| v.efficiency_score).collect();
    let mcd_alignment = stats::mean(&mcd_rates);
    let efficiency = stats::mean(&efficiencies);

    let fallback_triggered = all_trials.iter().any(|t| {
        t.failures
            .iter()
            .any(|f| f.contains("timed out") || f.contains("completion request failed"))
    });

    let user_experience =
        0.5 * success_ratio + 0.3 * mcd_alignment + 0.2 * efficiency;

    let metrics = DomainMetrics {
        overall_success: success_ratio >= tier.expectations().expected_success_rate,
        mcd_alignment_score: clamp_percent(mcd_alignment * 100.0),
        resource_efficiency: clamp_percent(efficiency * 100.0),
        fallback_triggered,
        user_experience_score: clamp_percent(user_experience * 100.0),
        total_trials,
        successful_trials,
    };

    let recommendations = build_recommendations(&metrics, success_ratio, tier);
    debug!(
        walkthrough = %walkthrough.id,
        tier = %tier,
        total_trials,
        successful_trials,
        "Walkthrough result assembled"
    );

    WalkthroughResult {
        id: walkthrough.id.clone(),
        domain: walkthrough.domain.clone(),
        tier,
        scenario_results,
        metrics,
        recommendations,
        execution_time_ms,
        timestamp: Utc::now(),
    }
}

fn build_recommendations(metrics: &DomainMetrics, success_ratio: f64, tier: Tier) -> Vec<String> {
    let mut recs = Vec::new();
    let expected = tier.expectations().expected_success_rate;
    if success_ratio < expected {
        recs.push(format!(
            "Success rate {:.0}% is below the {:.0}% expected at {tier}; consider a higher tier",
            success_ratio * 100.0,
            expected * 100.0
        ));
    }
    if metrics.fallback_triggered {
        recs.push("Some trials failed outright; inspect engine availability and timeouts".to_string());
    }
    if metrics.mcd_alignment_score < 50.0 && tier != Tier::Q8 {
        recs.push("Low MCD alignment; tighten prompts toward directive phrasing".to_string());
    }
    recs
}

// ============================================================================
// Tests
// ============================================================================
