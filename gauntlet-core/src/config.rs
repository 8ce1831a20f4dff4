//! Configuration for the Gauntlet engine.
//!
//! Every empirically-tuned scoring constant (confidence cutoffs, tier
//! thresholds, weight coefficients, cache sizing, pacing) lives here rather
//! than inline in the scoring code, so the heuristics can be recalibrated
//! without touching the evaluators. Loading is layered with `figment`:
//! defaults -> optional TOML file -> `GAUNTLET_` environment variables.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::types::Tier;

/// Drift detector weights and verdict cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Weight of the fuzzy term-match ratio in the confidence score.
    pub term_weight: f64,
    /// Weight of the anchor preservation rate in the confidence score.
    pub anchor_weight: f64,
    /// Flat penalty applied when any hallucination marker matches.
    pub hallucination_penalty: f64,
    /// Multiplier applied to the fragmentation score.
    pub fragmentation_weight: f64,
    /// Confidence at or above this is aligned with no drift.
    pub aligned_cutoff: f64,
    /// Confidence at or above this (but below `aligned_cutoff`) is
    /// aligned-but-partial.
    pub partial_cutoff: f64,
    /// Outputs shorter than this are treated as fragmented.
    pub short_output_chars: usize,
    /// Fragmentation score at or above this selects the fragmentation
    /// drift type.
    pub fragmentation_drift_cutoff: f64,
    /// Word-repetition ratio above this counts toward fragmentation.
    pub repetition_cutoff: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            term_weight: 0.6,
            anchor_weight: 0.4,
            hallucination_penalty: 0.2,
            fragmentation_weight: 0.1,
            aligned_cutoff: 0.4,
            partial_cutoff: 0.2,
            short_output_chars: 25,
            fragmentation_drift_cutoff: 0.5,
            repetition_cutoff: 0.5,
        }
    }
}

/// A single quality-tier admission threshold. Thresholds are checked in
/// order from `excellent` downward; the first one satisfied wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub min_functional_score: f64,
    pub min_required_ratio: f64,
    pub min_output_chars: usize,
    pub requires_clean: bool,
}

/// Tiered evaluator weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub required_weight: f64,
    pub token_efficiency_weight: f64,
    pub content_quality_weight: f64,
    /// Bonus weight granted when no prohibited element matched.
    pub clean_bonus_weight: f64,
    /// Penalty per prohibited-element violation.
    pub prohibited_penalty: f64,
    /// Verbosity penalty kicks in beyond this multiple of the adjusted
    /// token budget.
    pub verbosity_multiplier: f64,
    /// Outputs shorter than this are always `poor`.
    pub min_output_chars: usize,
    pub excellent: TierThreshold,
    pub good: TierThreshold,
    pub acceptable: TierThreshold,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            required_weight: 0.5,
            token_efficiency_weight: 0.2,
            content_quality_weight: 0.2,
            clean_bonus_weight: 0.1,
            prohibited_penalty: 0.15,
            verbosity_multiplier: 1.5,
            min_output_chars: 10,
            excellent: TierThreshold {
                min_functional_score: 0.85,
                min_required_ratio: 0.9,
                min_output_chars: 30,
                requires_clean: true,
            },
            good: TierThreshold {
                min_functional_score: 0.70,
                min_required_ratio: 0.7,
                min_output_chars: 20,
                requires_clean: true,
            },
            acceptable: TierThreshold {
                min_functional_score: 0.55,
                min_required_ratio: 0.5,
                min_output_chars: 10,
                requires_clean: false,
            },
        }
    }
}

/// MCD-compliance scoring: keyword tables and weights for judging whether a
/// response is structured, directive, and token-economical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McdConfig {
    pub directive_weight: f64,
    pub hedging_penalty: f64,
    pub structure_bonus: f64,
    pub brevity_bonus: f64,
    /// Net score must exceed this for compliance.
    pub compliance_cutoff: f64,
    /// Domain policy: responses at the Q8 tier are never counted as
    /// MCD-compliant (the high tier is expected to elaborate).
    pub q8_never_compliant: bool,
    pub directive_keywords: Vec<String>,
    pub hedging_keywords: Vec<String>,
}

impl Default for McdConfig {
    fn default() -> Self {
        Self {
            directive_weight: 0.5,
            hedging_penalty: 0.5,
            structure_bonus: 0.75,
            brevity_bonus: 0.75,
            compliance_cutoff: 1.0,
            q8_never_compliant: true,
            directive_keywords: [
                "check", "verify", "confirm", "ensure", "provide", "select", "enter", "review",
                "update", "cancel", "restart", "submit",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            hedging_keywords: [
                "maybe",
                "perhaps",
                "i think",
                "possibly",
                "might",
                "could be",
                "i'm not sure",
                "sorry",
                "i guess",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Comparative analyzer weights, advantage thresholds, and the fixed
/// fallback baseline used when no conversational results exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub success_weight: f64,
    pub efficiency_weight: f64,
    pub latency_weight: f64,
    pub consistency_weight: f64,
    /// MCD success-rate must beat the field by this ratio.
    pub success_advantage_min: f64,
    /// MCD token efficiency must beat the field by this ratio.
    pub token_advantage_min: f64,
    /// MCD latency must beat the field by this ratio.
    pub latency_advantage_min: f64,
    /// Confidence level at or above which the advantage is declared
    /// statistically significant.
    pub significance_cutoff: f64,
    /// Completion-token yardstick for the efficiency term: outputs at or
    /// under this size score full efficiency.
    pub efficiency_token_baseline: f64,
    pub fallback_baseline_success_rate: f64,
    pub fallback_baseline_avg_latency_ms: f64,
    pub fallback_baseline_avg_tokens: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            success_weight: 0.4,
            efficiency_weight: 0.3,
            latency_weight: 0.2,
            consistency_weight: 0.1,
            success_advantage_min: 1.5,
            token_advantage_min: 1.3,
            latency_advantage_min: 1.2,
            significance_cutoff: 0.8,
            efficiency_token_baseline: 100.0,
            fallback_baseline_success_rate: 0.5,
            fallback_baseline_avg_latency_ms: 2_000.0,
            fallback_baseline_avg_tokens: 150.0,
        }
    }
}

/// Result cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entry time-to-live in seconds (default 30 minutes).
    pub ttl_secs: u64,
    /// Maximum number of entries before pressure eviction.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 1_800,
            capacity: 50,
        }
    }
}

/// Batched-execution pacing and per-tier timeout overrides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many scenario work items run concurrently per window.
    pub concurrency_window: usize,
    /// Pause between windows, for pacing/backpressure.
    pub inter_window_pause_ms: u64,
    pub q1_timeout_ms: u64,
    pub q4_timeout_ms: u64,
    pub q8_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrency_window: 2,
            inter_window_pause_ms: 250,
            q1_timeout_ms: 8_000,
            q4_timeout_ms: 15_000,
            q8_timeout_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    /// Per-trial timeout budget for the given tier.
    pub fn timeout_ms_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Q1 => self.q1_timeout_ms,
            Tier::Q4 => self.q4_timeout_ms,
            Tier::Q8 => self.q8_timeout_ms,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GauntletConfig {
    pub drift: DriftConfig,
    pub evaluator: EvaluatorConfig,
    pub mcd: McdConfig,
    pub analyzer: AnalyzerConfig,
    pub cache: CacheSettings,
    pub runtime: RuntimeConfig,
}

impl GauntletConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `GAUNTLET_` environment variables (double underscore splits nesting,
    /// e.g. `GAUNTLET_DRIFT__ALIGNED_CUTOFF=0.5`).
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(GauntletConfig::default()));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("GAUNTLET_").split("__"));

        let config: GauntletConfig = figment.extract().map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check loaded values before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drift.aligned_cutoff < self.drift.partial_cutoff {
            return Err(ConfigError::Invalid {
                message: "drift.aligned_cutoff must be >= drift.partial_cutoff".into(),
            });
        }
        for (name, value) in [
            ("drift.term_weight", self.drift.term_weight),
            ("drift.anchor_weight", self.drift.anchor_weight),
            ("evaluator.required_weight", self.evaluator.required_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must be within [0, 1], got {value}"),
                });
            }
        }
        if self.runtime.concurrency_window == 0 {
            return Err(ConfigError::Invalid {
                message: "runtime.concurrency_window must be at least 1".into(),
            });
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "cache.capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = GauntletConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_secs, 1_800);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.runtime.concurrency_window, 2);
        assert!((config.drift.aligned_cutoff - 0.4).abs() < f64::EPSILON);
        assert!((config.evaluator.excellent.min_functional_score - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_empty_json() {
        let config: GauntletConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GauntletConfig::default());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = GauntletConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: GauntletConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_validate_rejects_inverted_cutoffs() {
        let mut config = GauntletConfig::default();
        config.drift.aligned_cutoff = 0.1;
        config.drift.partial_cutoff = 0.3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = GauntletConfig::default();
        config.runtime.concurrency_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = GauntletConfig::load(Some(Path::new("/nonexistent/gauntlet.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[cache]\nttl_secs = 60\ncapacity = 5").unwrap();
        writeln!(file, "[runtime]\nconcurrency_window = 4").unwrap();
        let config = GauntletConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 5);
        assert_eq!(config.runtime.concurrency_window, 4);
        // Untouched sections keep defaults.
        assert_eq!(config.drift, DriftConfig::default());
    }

    #[test]
    fn test_runtime_timeout_per_tier() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.timeout_ms_for(Tier::Q1), 8_000);
        assert_eq!(runtime.timeout_ms_for(Tier::Q8), 30_000);
    }

    #[test]
    fn test_mcd_defaults_contain_check() {
        let mcd = McdConfig::default();
        assert!(mcd.directive_keywords.iter().any(|k| k == "check"));
        assert!(mcd.hedging_keywords.iter().any(|k| k == "perhaps"));
        assert!(mcd.q8_never_compliant);
    }
}
