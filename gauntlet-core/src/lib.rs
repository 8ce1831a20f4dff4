//! # Gauntlet Core
//!
//! Core library for the Gauntlet evaluation harness. Provides trial
//! execution against completion engines, drift detection, tiered
//! functional evaluation, comparative analysis across prompting
//! approaches, result caching, and the progressive tier coordinator.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod drift;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod matching;
pub mod report;
pub mod stats;
pub mod tokens;
pub mod types;

// Re-export commonly used types at the crate root.
pub use analyzer::{AdvantageValidation, ApproachSummary, ComparativeAnalysis, ComparativeAnalyzer};
pub use cache::{CachedResult, ExecutionOptions, ResultCache};
pub use config::GauntletConfig;
pub use coordinator::{
    ExecutionContext, Phase, ProgressEvent, ProgressiveTierCoordinator, RunOutcome, RunStatus,
};
pub use drift::{DriftAnalysis, DriftDetector, DriftSeverity, DriftType};
pub use engine::{CompletionCapability, MockCompletionEngine, OpenAiCompatEngine};
pub use error::{GauntletError, Result};
pub use evaluator::{Evaluation, TieredEvaluator};
pub use executor::TrialExecutor;
pub use stats::TrialStatistics;
pub use types::{
    Approach, CompletionRequest, CompletionResponse, Message, QualityTier, Role, Scenario,
    SuccessCriteria, Tier, TokenUsage, TrialResult, TrialSpecification, Variant, VariantResult,
    Walkthrough, WalkthroughResult,
};
