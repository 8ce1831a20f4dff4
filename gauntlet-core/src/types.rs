//! Fundamental types for the Gauntlet evaluation engine.
//!
//! Covers the externally-authored test configuration (walkthroughs,
//! scenarios, variants, trial specifications), the capability tier and
//! prompting approach enumerations, the completion wire types, and the
//! immutable result records produced by the trial executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::drift::DriftAnalysis;
use crate::stats::TrialStatistics;

/// Model capability tier. Each tier carries its own latency and
/// success-rate expectations and a per-trial timeout budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Low-capability tier (heavily quantized / smallest models).
    Q1,
    /// Mid-capability tier.
    Q4,
    /// High-capability tier.
    Q8,
}

impl Tier {
    /// All tiers in ascending capability order.
    pub fn all() -> [Tier; 3] {
        [Tier::Q1, Tier::Q4, Tier::Q8]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Q1 => "Q1",
            Tier::Q4 => "Q4",
            Tier::Q8 => "Q8",
        }
    }

    /// Parse a tier label ("Q1"/"Q4"/"Q8", case-insensitive).
    pub fn parse(label: &str) -> Option<Tier> {
        match label.to_ascii_uppercase().as_str() {
            "Q1" => Some(Tier::Q1),
            "Q4" => Some(Tier::Q4),
            "Q8" => Some(Tier::Q8),
            _ => None,
        }
    }

    /// Expected performance envelope for this tier.
    pub fn expectations(&self) -> TierExpectations {
        match self {
            Tier::Q1 => TierExpectations {
                expected_latency_ms: 600,
                expected_success_rate: 0.35,
            },
            Tier::Q4 => TierExpectations {
                expected_latency_ms: 1_500,
                expected_success_rate: 0.65,
            },
            Tier::Q8 => TierExpectations {
                expected_latency_ms: 3_000,
                expected_success_rate: 0.85,
            },
        }
    }

    /// Default per-trial timeout budget. Low-capability tiers get shorter
    /// budgets: a degenerate small model that hasn't answered quickly will
    /// not answer at all.
    pub fn default_trial_timeout(&self) -> Duration {
        match self {
            Tier::Q1 => Duration::from_millis(8_000),
            Tier::Q4 => Duration::from_millis(15_000),
            Tier::Q8 => Duration::from_millis(30_000),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Latency/success expectations attached to a capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierExpectations {
    pub expected_latency_ms: u64,
    pub expected_success_rate: f64,
}

/// Prompting approach applied to the same underlying task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    /// Minimal Capable Description: compact, directive prompting.
    Compact,
    FewShot,
    SystemRole,
    Hybrid,
    Conversational,
}

impl Approach {
    pub fn label(&self) -> &'static str {
        match self {
            Approach::Compact => "compact",
            Approach::FewShot => "few_shot",
            Approach::SystemRole => "system_role",
            Approach::Hybrid => "hybrid",
            Approach::Conversational => "conversational",
        }
    }

    /// Sampling temperature for this approach. Compact/deterministic
    /// approaches pin temperature to zero; conversational prompting runs hot.
    pub fn temperature(&self) -> f32 {
        match self {
            Approach::Compact => 0.0,
            Approach::FewShot => 0.1,
            Approach::SystemRole => 0.2,
            Approach::Hybrid => 0.4,
            Approach::Conversational => 0.7,
        }
    }

    /// Whether this approach is the MCD (compact) approach under study.
    pub fn is_compact(&self) -> bool {
        matches!(self, Approach::Compact)
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Quality tier assigned to a single response. Ordered: `Poor` is the
/// floor and the only tier counted as a failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityTier {
    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Poor => "poor",
            QualityTier::Acceptable => "acceptable",
            QualityTier::Good => "good",
            QualityTier::Excellent => "excellent",
        }
    }

    /// A trial succeeds at any quality above `Poor`.
    pub fn is_success(&self) -> bool {
        *self != QualityTier::Poor
    }
}

/// Trial difficulty tag, supplied by the test author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Declarative success criteria for one trial. Unset fields fall back to
/// domain-aware defaults at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub required_elements: Vec<String>,
    #[serde(default)]
    pub prohibited_elements: Vec<String>,
    /// Semantic anchors the response must preserve; consumed by the drift
    /// detector. Empty means anchor preservation is not checked.
    #[serde(default)]
    pub semantic_anchors: Vec<String>,
    #[serde(default)]
    pub task_completion_expected: bool,
    #[serde(default)]
    pub max_token_budget: Option<usize>,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub min_accuracy: Option<f64>,
}

/// Expected latency/token benchmark for a trial, used for drift-from-profile
/// reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialBenchmark {
    pub expected_latency_ms: u64,
    pub expected_tokens: usize,
}

/// A single trial: one user input evaluated against declarative criteria.
/// Immutable input, supplied externally; the engine never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpecification {
    pub id: String,
    pub user_input: String,
    #[serde(default)]
    pub criteria: SuccessCriteria,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub benchmark: Option<TrialBenchmark>,
}

/// Benchmark profile a variant is expected to hit, for comparison against
/// measured aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedProfile {
    pub avg_latency_ms: f64,
    pub avg_tokens: f64,
    pub success_rate: f64,
}

/// A prompting variant: one approach applied to an ordered list of trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub approach: Approach,
    pub prompt_template: String,
    pub trials: Vec<TrialSpecification>,
    #[serde(default)]
    pub expected_profile: Option<ExpectedProfile>,
}

/// An ordered walkthrough step with its competing variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub step: usize,
    pub context: String,
    pub variants: Vec<Variant>,
}

/// A full domain walkthrough: ordered scenarios within one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Walkthrough {
    pub id: String,
    pub domain: String,
    pub scenarios: Vec<Scenario>,
}

/// Message role on the completion wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to the completion capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A request to the completion capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Token usage as reported by the engine. `prompt_tokens` and
/// `completion_tokens` are optional on the wire; the token estimator fills
/// the gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: usize,
    #[serde(default)]
    pub prompt_tokens: Option<usize>,
    #[serde(default)]
    pub completion_tokens: Option<usize>,
}

/// The result of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    pub model: String,
}

/// Prompt/completion token split recorded on every trial result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl TokenBreakdown {
    pub fn total(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The outcome of one executed trial. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: String,
    pub output: String,
    pub success: bool,
    pub quality: QualityTier,
    pub accuracy: f64,
    pub failures: Vec<String>,
    pub mcd_compliant: bool,
    pub latency_ms: u64,
    pub tokens: TokenBreakdown,
    #[serde(default)]
    pub drift: Option<DriftAnalysis>,
    pub timestamp: DateTime<Utc>,
}

impl TrialResult {
    /// A zero-score failed result carrying a human-readable reason. Used
    /// for timeouts, engine errors, and configuration errors so the trial
    /// still appears in aggregate denominators.
    pub fn failed(trial_id: impl Into<String>, reason: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            trial_id: trial_id.into(),
            output: String::new(),
            success: false,
            quality: QualityTier::Poor,
            accuracy: 0.0,
            failures: vec![reason.into()],
            mcd_compliant: false,
            latency_ms,
            tokens: TokenBreakdown::default(),
            drift: None,
            timestamp: Utc::now(),
        }
    }
}

/// Measured-versus-expected deltas for a variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDiff {
    pub latency_delta_ms: f64,
    pub token_delta: f64,
    pub success_delta: f64,
}

/// Aggregated trial results for one variant at one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub approach: Approach,
    pub tier: Tier,
    pub avg_latency_ms: f64,
    pub avg_tokens: f64,
    /// Human-readable "n/total" success count.
    pub success_rate: String,
    pub success_ratio: f64,
    pub mcd_alignment_rate: f64,
    pub efficiency_score: f64,
    /// Cross-trial mean/deviation/CI statistics, meaningful once the
    /// variant carries repeated trials.
    #[serde(default)]
    pub statistics: TrialStatistics,
    #[serde(default)]
    pub profile_diff: Option<ProfileDiff>,
    pub trials: Vec<TrialResult>,
}

/// Aggregated results for one scenario step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub step: usize,
    pub context: String,
    pub variant_results: Vec<VariantResult>,
}

/// Domain-level metrics surfaced to the presentation layer. All
/// percentage-like fields are clamped to [0, 100] at assembly time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainMetrics {
    pub overall_success: bool,
    pub mcd_alignment_score: f64,
    pub resource_efficiency: f64,
    pub fallback_triggered: bool,
    pub user_experience_score: f64,
    pub total_trials: usize,
    pub successful_trials: usize,
}

/// Complete evaluated walkthrough at one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkthroughResult {
    pub id: String,
    pub domain: String,
    pub tier: Tier,
    pub scenario_results: Vec<ScenarioResult>,
    pub metrics: DomainMetrics,
    pub recommendations: Vec<String>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}
