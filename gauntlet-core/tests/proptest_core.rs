//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use gauntlet_core::config::{DriftConfig, EvaluatorConfig, McdConfig};
use gauntlet_core::domain::Domain;
use gauntlet_core::drift::DriftDetector;
use gauntlet_core::evaluator::TieredEvaluator;
use gauntlet_core::matching::{coverage, SynonymTable};
use gauntlet_core::stats;
use gauntlet_core::types::{Difficulty, SuccessCriteria, Tier, TrialSpecification};

fn arbitrary_spec(required: Vec<String>) -> TrialSpecification {
    TrialSpecification {
        id: "gen-1".to_string(),
        user_input: "generated input".to_string(),
        criteria: SuccessCriteria {
            required_elements: required,
            prohibited_elements: vec![],
            semantic_anchors: vec![],
            task_completion_expected: true,
            max_token_budget: Some(60),
            max_latency_ms: None,
            min_accuracy: None,
        },
        difficulty: Difficulty::Medium,
        benchmark: None,
    }
}

// --- Drift detector properties ---

proptest! {
    #[test]
    fn drift_confidence_stays_in_unit_interval(
        output in ".{0,200}",
        terms in proptest::collection::vec("[a-z]{3,10}", 0..6),
    ) {
        let detector = DriftDetector::new(DriftConfig::default());
        let analysis = detector.analyze(&output, &terms, None, Domain::General);
        prop_assert!(analysis.confidence >= 0.0);
        prop_assert!(analysis.confidence <= 1.0);
        prop_assert!(analysis.fragmentation >= 0.0);
        prop_assert!(analysis.fragmentation <= 1.0);
    }

    #[test]
    fn drift_analysis_is_idempotent(
        output in ".{0,200}",
        terms in proptest::collection::vec("[a-z]{3,10}", 0..4),
    ) {
        let detector = DriftDetector::new(DriftConfig::default());
        let first = detector.analyze(&output, &terms, None, Domain::General);
        let second = detector.analyze(&output, &terms, None, Domain::General);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn empty_output_always_drifts_severely(terms in proptest::collection::vec("[a-z]{3,10}", 0..4)) {
        let detector = DriftDetector::new(DriftConfig::default());
        let analysis = detector.analyze("   ", &terms, None, Domain::General);
        prop_assert!(!analysis.aligned);
        prop_assert_eq!(analysis.confidence, 0.0);
    }
}

// --- Matching properties ---

proptest! {
    #[test]
    fn empty_required_terms_give_full_coverage(text in ".{0,200}") {
        let cov = coverage(&[], &text, &SynonymTable::default());
        prop_assert_eq!(cov.ratio, 1.0);
        prop_assert!(cov.missing.is_empty());
    }

    #[test]
    fn coverage_partitions_terms(
        text in "[a-z ]{0,100}",
        terms in proptest::collection::vec("[a-z]{3,8}", 1..6),
    ) {
        let cov = coverage(&terms, &text, &SynonymTable::default());
        prop_assert_eq!(cov.matched.len() + cov.missing.len(), terms.len());
        prop_assert!(cov.ratio >= 0.0);
        prop_assert!(cov.ratio <= 1.0);
    }
}

// --- Evaluator properties ---

proptest! {
    #[test]
    fn accuracy_is_always_clamped(
        output in ".{0,300}",
        tokens in 0usize..1000,
        required in proptest::collection::vec("[a-z]{3,10}", 0..5),
    ) {
        let evaluator = TieredEvaluator::new(EvaluatorConfig::default(), McdConfig::default());
        let spec = arbitrary_spec(required);
        let eval = evaluator.evaluate(&output, &spec, Tier::Q4, tokens);
        prop_assert!(eval.accuracy >= 0.0);
        prop_assert!(eval.accuracy <= 1.0);
        prop_assert!(eval.required_ratio >= 0.0);
        prop_assert!(eval.required_ratio <= 1.0);
    }

    #[test]
    fn q8_outputs_are_never_compliant(output in ".{0,300}", tokens in 0usize..500) {
        let evaluator = TieredEvaluator::new(EvaluatorConfig::default(), McdConfig::default());
        let spec = arbitrary_spec(vec![]);
        let eval = evaluator.evaluate(&output, &spec, Tier::Q8, tokens);
        prop_assert!(!eval.mcd_compliant);
    }
}

// --- Statistics properties ---

proptest! {
    #[test]
    fn consistency_is_bounded(values in proptest::collection::vec(0.0f64..1000.0, 0..20)) {
        let c = stats::consistency(&values);
        prop_assert!(c >= 0.0);
        prop_assert!(c <= 1.0);
    }

    #[test]
    fn ci_shrinks_with_identical_samples(value in 0.1f64..100.0, n in 2usize..20) {
        let values = vec![value; n];
        prop_assert_eq!(stats::std_dev(&values), 0.0);
        prop_assert_eq!(stats::confidence_interval_95(&values), 0.0);
        prop_assert_eq!(stats::consistency(&values), 1.0);
    }
}
