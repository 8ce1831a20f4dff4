//! Trial execution against a completion engine.
//!
//! Builds the prompt for a variant's approach, races the completion call
//! against the tier's timeout, and folds evaluation plus drift analysis
//! into a [`TrialResult`]. Failures never abort a batch: timeouts and
//! engine errors become zero-score results that stay in the denominators.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::ExecutionOptions;
use crate::config::RuntimeConfig;
use crate::coordinator::ExecutionContext;
use crate::domain::Domain;
use crate::drift::DriftDetector;
use crate::engine::CompletionCapability;
use crate::evaluator::TieredEvaluator;
use crate::tokens::TokenEstimator;
use crate::types::{
    CompletionRequest, Message, Tier, TrialResult, TrialSpecification, Variant,
};

const INPUT_PLACEHOLDER: &str = "{input}";

/// Executes trials and variants against a bound completion engine.
pub struct TrialExecutor {
    evaluator: TieredEvaluator,
    drift: DriftDetector,
    estimator: TokenEstimator,
    runtime: RuntimeConfig,
}

impl Default for TrialExecutor {
    fn default() -> Self {
        Self::new(
            TieredEvaluator::default(),
            DriftDetector::default(),
            TokenEstimator::default(),
            RuntimeConfig::default(),
        )
    }
}

impl TrialExecutor {
    pub fn new(
        evaluator: TieredEvaluator,
        drift: DriftDetector,
        estimator: TokenEstimator,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            evaluator,
            drift,
            estimator,
            runtime,
        }
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Build the message list for a variant's approach. System-role
    /// prompting splits the template into a system message and keeps the
    /// user input separate; every other approach renders a single user
    /// message with the input substituted in.
    fn build_messages(variant: &Variant, spec: &TrialSpecification) -> Vec<Message> {
        use crate::types::Approach;
        if variant.approach == Approach::SystemRole {
            let system = variant
                .prompt_template
                .replace(INPUT_PLACEHOLDER, "")
                .trim()
                .to_string();
            return vec![Message::system(system), Message::user(&spec.user_input)];
        }
        let rendered = if variant.prompt_template.contains(INPUT_PLACEHOLDER) {
            variant
                .prompt_template
                .replace(INPUT_PLACEHOLDER, &spec.user_input)
        } else {
            format!("{}\n\n{}", variant.prompt_template, spec.user_input)
        };
        vec![Message::user(rendered)]
    }

    /// Run a single trial. Never returns an error: failed completions
    /// degrade to zero-score results carrying the failure reason.
    pub async fn run_trial(
        &self,
        spec: &TrialSpecification,
        variant: &Variant,
        tier: Tier,
        options: &ExecutionOptions,
        engine: &Arc<dyn CompletionCapability>,
    ) -> TrialResult {
        let messages = Self::build_messages(variant, spec);
        let budget = self.evaluator.token_budget(spec);
        let request = CompletionRequest {
            messages: messages.clone(),
            max_tokens: (budget as f64 * 1.5) as usize,
            temperature: options
                .temperature_override
                .unwrap_or_else(|| variant.approach.temperature()),
        };

        let timeout_ms = self.runtime.timeout_ms_for(tier);
        let started = Instant::now();
        let raced = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            engine.complete(request),
        )
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let response = match raced {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(trial = %spec.id, error = %e, "Completion request failed");
                return TrialResult::failed(
                    &spec.id,
                    format!("completion request failed: {e}"),
                    latency_ms,
                );
            }
            Err(_) => {
                warn!(trial = %spec.id, timeout_ms, "Trial timed out");
                return TrialResult::failed(
                    &spec.id,
                    format!("trial timed out after {timeout_ms}ms"),
                    latency_ms,
                );
            }
        };

        let tokens = self
            .estimator
            .breakdown(response.usage, &messages, &response.content);
        let evaluation =
            self.evaluator
                .evaluate(&response.content, spec, tier, tokens.completion_tokens);
        let mut failures = evaluation.failures;

        if let Some(max_latency) = spec.criteria.max_latency_ms {
            if latency_ms > max_latency {
                failures.push(format!(
                    "Latency {latency_ms}ms exceeded limit {max_latency}ms"
                ));
            }
        }

        let wants_drift = !spec.criteria.required_elements.is_empty()
            || !spec.criteria.semantic_anchors.is_empty();
        let drift = wants_drift.then(|| {
            let anchors = (!spec.criteria.semantic_anchors.is_empty())
                .then_some(spec.criteria.semantic_anchors.as_slice());
            self.drift.analyze(
                &response.content,
                &spec.criteria.required_elements,
                anchors,
                Domain::resolve(&spec.id, &spec.user_input),
            )
        });

        debug!(
            trial = %spec.id,
            latency_ms,
            quality = evaluation.quality.label(),
            "Trial complete"
        );

        TrialResult {
            trial_id: spec.id.clone(),
            output: response.content,
            success: evaluation.success,
            quality: evaluation.quality,
            accuracy: evaluation.accuracy,
            failures,
            mcd_compliant: evaluation.mcd_compliant,
            latency_ms,
            tokens,
            drift,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Run every trial of a variant sequentially, honoring stop requests
    /// between trials. Trials already finished are kept.
    pub async fn run_variant(
        &self,
        variant: &Variant,
        tier: Tier,
        options: &ExecutionOptions,
        ctx: &ExecutionContext,
        engine: &Arc<dyn CompletionCapability>,
    ) -> Vec<TrialResult> {
        let mut results = Vec::new();
        for spec in &variant.trials {
            for _ in 0..options.trial_repeats.max(1) {
                if ctx.is_stop_requested() {
                    debug!(variant = %variant.id, "Stop requested; truncating variant run");
                    return results;
                }
                results.push(self.run_trial(spec, variant, tier, options, engine).await);
            }
        }
        results
    }
}

// ============================================================================
// Tests
// ============================================================================
