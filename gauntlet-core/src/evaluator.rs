//! Tiered functional evaluation.
//!
//! Scores a model output against a trial's success criteria, assigns a
//! quality tier, and judges MCD compliance. The functional score blends
//! required-element coverage, token efficiency, content quality, and a
//! cleanliness bonus, minus a penalty per prohibited element found.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EvaluatorConfig, McdConfig, TierThreshold};
use crate::domain::{Domain, DomainTable};
use crate::matching::{coverage, SynonymTable};
use crate::types::{QualityTier, Tier, TrialSpecification};

/// Outcome of evaluating one output against one trial specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub success: bool,
    pub quality: QualityTier,
    /// Functional score clamped to [0, 1].
    pub accuracy: f64,
    pub mcd_compliant: bool,
    pub failures: Vec<String>,
    pub domain: Domain,
    /// Fraction of required elements covered.
    pub required_ratio: f64,
    pub prohibited_count: usize,
}

/// Evaluates outputs into quality tiers using domain-adjusted criteria.
pub struct TieredEvaluator {
    config: EvaluatorConfig,
    mcd: McdConfig,
    domains: DomainTable,
    synonyms: SynonymTable,
}

impl Default for TieredEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default(), McdConfig::default())
    }
}

impl TieredEvaluator {
    pub fn new(config: EvaluatorConfig, mcd: McdConfig) -> Self {
        Self {
            config,
            mcd,
            domains: DomainTable::default(),
            synonyms: SynonymTable::default(),
        }
    }

    pub fn with_tables(
        config: EvaluatorConfig,
        mcd: McdConfig,
        domains: DomainTable,
        synonyms: SynonymTable,
    ) -> Self {
        Self {
            config,
            mcd,
            domains,
            synonyms,
        }
    }

    /// Token budget for a trial: the explicit criteria budget when set,
    /// otherwise the resolved domain profile's default. Request sizing and
    /// scoring both go through this so the two budgets agree.
    pub fn token_budget(&self, spec: &TrialSpecification) -> usize {
        let domain = Domain::resolve(&spec.id, &spec.user_input);
        spec.criteria
            .max_token_budget
            .unwrap_or(self.domains.profile(domain).default_token_budget)
    }

    /// Evaluate an output against a trial at a capability tier.
    /// `token_count` is the completion token count actually spent.
    pub fn evaluate(
        &self,
        output: &str,
        spec: &TrialSpecification,
        tier: Tier,
        token_count: usize,
    ) -> Evaluation {
        let domain = Domain::resolve(&spec.id, &spec.user_input);
        let profile = self.domains.profile(domain);
        let trimmed = output.trim();
        let mut failures = Vec::new();

        let cov = coverage(&spec.criteria.required_elements, output, &self.synonyms);
        for missing in &cov.missing {
            failures.push(format!("Missing required element: {missing}"));
        }

        let output_lower = output.to_lowercase();
        let mut prohibited_count = 0;
        for prohibited in &spec.criteria.prohibited_elements {
            if output_lower.contains(&prohibited.to_lowercase()) {
                prohibited_count += 1;
                failures.push(format!("Contains prohibited element: {prohibited}"));
            }
        }
        let clean = prohibited_count == 0;

        let budget = self.token_budget(spec);
        let adjusted_budget = (budget as f64 * profile.complexity_multiplier).max(1.0);
        let token_efficiency = if token_count == 0 {
            1.0
        } else {
            (adjusted_budget / token_count as f64).min(1.0)
        };

        let content_quality =
            self.content_quality(trimmed, token_count, adjusted_budget);

        let functional = self.config.required_weight * cov.ratio
            + self.config.token_efficiency_weight * token_efficiency
            + self.config.content_quality_weight * content_quality
            + self.config.clean_bonus_weight * if clean { 1.0 } else { 0.0 }
            - self.config.prohibited_penalty * prohibited_count as f64;
        let accuracy = functional.clamp(0.0, 1.0);

        let min_accuracy = spec
            .criteria
            .min_accuracy
            .unwrap_or(profile.default_min_accuracy);
        if accuracy < min_accuracy {
            failures.push(format!(
                "Accuracy {accuracy:.2} below required minimum {min_accuracy:.2}"
            ));
        }

        let quality = if trimmed.chars().count() < self.config.min_output_chars {
            failures.push("Output too brief for meaningful evaluation".to_string());
            QualityTier::Poor
        } else {
            self.assign_quality(
                accuracy,
                cov.ratio,
                trimmed.chars().count(),
                clean,
                profile.required_ratio_forgiveness,
            )
        };

        let mcd_compliant = self.mcd_compliance(trimmed, tier, token_count, adjusted_budget);

        debug!(
            trial = %spec.id,
            domain = domain.label(),
            accuracy,
            quality = quality.label(),
            mcd_compliant,
            "Trial evaluated"
        );

        Evaluation {
            success: quality.is_success(),
            quality,
            accuracy,
            mcd_compliant,
            failures,
            domain,
            required_ratio: cov.ratio,
            prohibited_count,
        }
    }

    fn assign_quality(
        &self,
        accuracy: f64,
        required_ratio: f64,
        output_chars: usize,
        clean: bool,
        forgiveness: f64,
    ) -> QualityTier {
        let tiers = [
            (QualityTier::Excellent, &self.config.excellent),
            (QualityTier::Good, &self.config.good),
            (QualityTier::Acceptable, &self.config.acceptable),
        ];
        for (quality, threshold) in tiers {
            if Self::meets(threshold, accuracy, required_ratio, output_chars, clean, forgiveness) {
                return quality;
            }
        }
        QualityTier::Poor
    }

    fn meets(
        threshold: &TierThreshold,
        accuracy: f64,
        required_ratio: f64,
        output_chars: usize,
        clean: bool,
        forgiveness: f64,
    ) -> bool {
        accuracy >= threshold.min_functional_score
            && required_ratio >= (threshold.min_required_ratio - forgiveness).max(0.0)
            && output_chars >= threshold.min_output_chars
            && (clean || !threshold.requires_clean)
    }

    fn content_quality(&self, trimmed: &str, token_count: usize, adjusted_budget: f64) -> f64 {
        let mut score: f64 = 0.5;
        let lower = trimmed.to_lowercase();

        // Label-colon structure, e.g. "Missing: time, location".
        let has_label_line = trimmed.lines().any(|line| {
            line.char_indices()
                .take(40)
                .any(|(_, c)| c == ':')
        });
        if has_label_line {
            score += 0.2;
        }

        let has_bullets = trimmed
            .lines()
            .any(|line| {
                let l = line.trim_start();
                l.starts_with("- ") || l.starts_with("* ") || l.starts_with("\u{2022} ")
            });
        if has_bullets {
            score += 0.15;
        }

        if let Some(first_word) = lower.split_whitespace().next() {
            let first_word = first_word.trim_matches(|c: char| !c.is_alphanumeric());
            if self
                .mcd
                .directive_keywords
                .iter()
                .any(|k| k == first_word)
            {
                score += 0.15;
            }
        }

        if token_count as f64 > self.config.verbosity_multiplier * adjusted_budget {
            score -= 0.3;
        }

        score.clamp(0.0, 1.0)
    }

    /// Compliance requires a net score above the cutoff: directive language
    /// and structure add, hedging subtracts. The Q8 tier is never compliant
    /// under default policy since it is expected to elaborate.
    pub fn mcd_compliance(
        &self,
        trimmed: &str,
        tier: Tier,
        token_count: usize,
        adjusted_budget: f64,
    ) -> bool {
        if tier == Tier::Q8 && self.mcd.q8_never_compliant {
            return false;
        }
        let lower = trimmed.to_lowercase();

        let directive_hits = self
            .mcd
            .directive_keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count() as f64;
        let hedging_hits = self
            .mcd
            .hedging_keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count() as f64;

        let structured = trimmed.lines().any(|line| {
            let l = line.trim_start();
            line.char_indices().take(40).any(|(_, c)| c == ':')
                || l.starts_with("- ")
                || l.starts_with("* ")
        });

        let brevity = token_count == 0 || token_count as f64 <= adjusted_budget;

        let mut net = directive_hits * self.mcd.directive_weight
            - hedging_hits * self.mcd.hedging_penalty;
        if structured {
            net += self.mcd.structure_bonus;
        }
        if brevity {
            net += self.mcd.brevity_bonus;
        }

        net > self.mcd.compliance_cutoff
    }
}

// ============================================================================
// Tests
// ============================================================================
