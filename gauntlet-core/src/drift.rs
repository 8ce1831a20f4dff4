//! Semantic drift and hallucination detection.
//!
//! `DriftDetector::analyze` is a pure function over the supplied text and
//! the detector's lookup tables: fuzzy term matching, anchor preservation,
//! curated hallucination markers, a fragmentation score, and
//! speculative/context-loss phrasing checks combine into a clamped
//! confidence score and an alignment verdict. Detection failure must never
//! crash the caller: degenerate input produces a severe, confidence-zero
//! analysis with a diagnostic note.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;

use crate::config::DriftConfig;
use crate::domain::{Domain, DomainTable};
use crate::matching::{self, SynonymTable};

/// Severity of detected drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    None,
    Mild,
    Moderate,
    Severe,
}

/// Drift category, assigned by priority when drift is present:
/// hallucination > fragmentation > speculative > missing-term > generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    Hallucination,
    Fragmentation,
    Speculative,
    MissingTerm,
    Generic,
}

/// The verdict produced by one drift analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAnalysis {
    pub aligned: bool,
    pub severity: DriftSeverity,
    #[serde(default)]
    pub drift_type: Option<DriftType>,
    pub missing_anchors: Vec<String>,
    pub preserved_anchors: Vec<String>,
    pub hallucinations: Vec<String>,
    /// Fragmentation-adjusted confidence in [0, 1].
    pub confidence: f64,
    pub fragmentation: f64,
    pub notes: Vec<String>,
}

/// Detects semantic drift of a response from its expected content.
///
/// Stateless after construction; `analyze` has no side effects and is
/// idempotent for identical inputs.
pub struct DriftDetector {
    config: DriftConfig,
    synonyms: SynonymTable,
    /// Concept-to-phrasings map used for anchor preservation.
    concepts: HashMap<String, Vec<String>>,
    domains: DomainTable,
    speculative: Regex,
    context_loss: Regex,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DriftConfig::default())
    }
}

impl DriftDetector {
    pub fn new(config: DriftConfig) -> Self {
        Self::with_tables(config, SynonymTable::default(), DomainTable::default())
    }

    pub fn with_tables(config: DriftConfig, synonyms: SynonymTable, domains: DomainTable) -> Self {
        let concepts = default_concepts();
        // Both patterns are static; construction cannot fail at runtime.
        let speculative = Regex::new(
            r"(?i)\b(might be|may be|perhaps|possibly|i think|i believe|not sure|it seems|probably|unclear)\b",
        )
        .expect("speculative pattern is valid");
        let context_loss = Regex::new(
            r"(?i)\b(as mentioned earlier|as i mentioned|the previous (step|message)|earlier you said|as discussed|referring back)\b",
        )
        .expect("context-loss pattern is valid");
        Self {
            config,
            synonyms,
            concepts,
            domains,
            speculative,
            context_loss,
        }
    }

    /// Analyze a response against expected terms and optional semantic
    /// anchors, using the hallucination markers of the given domain.
    pub fn analyze(
        &self,
        output: &str,
        expected_terms: &[String],
        anchors: Option<&[String]>,
        domain: Domain,
    ) -> DriftAnalysis {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return DriftAnalysis {
                aligned: false,
                severity: DriftSeverity::Severe,
                drift_type: Some(DriftType::Generic),
                missing_anchors: anchors.map(<[String]>::to_vec).unwrap_or_default(),
                preserved_anchors: Vec::new(),
                hallucinations: Vec::new(),
                confidence: 0.0,
                fragmentation: 1.0,
                notes: vec!["empty output supplied; treating as severe drift".into()],
            };
        }

        let lower = trimmed.to_lowercase();
        let mut notes = Vec::new();

        // 1. Fuzzy term matching.
        let term_cov = matching::coverage(expected_terms, trimmed, &self.synonyms);
        if !term_cov.missing.is_empty() {
            notes.push(format!(
                "missing expected terms: {}",
                term_cov.missing.join(", ")
            ));
        }

        // 2. Semantic-anchor preservation.
        let (preserved_anchors, missing_anchors, preservation_rate) =
            self.anchor_preservation(&lower, anchors);
        if !missing_anchors.is_empty() {
            notes.push(format!(
                "semantic anchors lost: {}",
                missing_anchors.join(", ")
            ));
        }

        // 3. Hallucination scan.
        let hallucinations: Vec<String> = self
            .domains
            .hallucination_markers(domain)
            .into_iter()
            .filter(|marker| lower.contains(&marker.to_lowercase()))
            .map(|marker| marker.to_string())
            .collect();
        if !hallucinations.is_empty() {
            notes.push(format!(
                "invented facts detected: {}",
                hallucinations.join("; ")
            ));
        }

        // 4. Fragmentation score.
        let fragmentation = self.fragmentation_score(trimmed);
        if fragmentation >= self.config.fragmentation_drift_cutoff {
            notes.push(format!("output appears fragmented ({fragmentation:.2})"));
        }

        // 5. Speculative-language and context-loss checks.
        let speculative = self.speculative.is_match(trimmed);
        if speculative {
            notes.push("speculative/hedging language present".into());
        }
        if self.context_loss.is_match(trimmed) {
            notes.push("unresolved reference to prior context".into());
        }

        // 6. Confidence.
        let hallucination_penalty = if hallucinations.is_empty() {
            0.0
        } else {
            self.config.hallucination_penalty
        };
        let confidence = (self.config.term_weight * term_cov.ratio
            + self.config.anchor_weight * preservation_rate
            - hallucination_penalty
            - self.config.fragmentation_weight * fragmentation)
            .clamp(0.0, 1.0);

        // 7. Verdict.
        let (aligned, severity) = if confidence >= self.config.aligned_cutoff {
            (true, DriftSeverity::None)
        } else if confidence >= self.config.partial_cutoff {
            let severity = if hallucinations.is_empty() {
                DriftSeverity::Mild
            } else {
                DriftSeverity::Moderate
            };
            (true, severity)
        } else {
            (false, DriftSeverity::Severe)
        };

        let drift_type = if severity == DriftSeverity::None {
            None
        } else {
            Some(self.classify_drift(
                &hallucinations,
                fragmentation,
                speculative,
                &term_cov.missing,
            ))
        };

        DriftAnalysis {
            aligned,
            severity,
            drift_type,
            missing_anchors,
            preserved_anchors,
            hallucinations,
            confidence,
            fragmentation,
            notes,
        }
    }

    /// Anchor preservation rate: anchors matched directly or through the
    /// concept map. 1.0 when no anchors are supplied.
    fn anchor_preservation(
        &self,
        lower: &str,
        anchors: Option<&[String]>,
    ) -> (Vec<String>, Vec<String>, f64) {
        let anchors = match anchors {
            Some(a) if !a.is_empty() => a,
            _ => return (Vec::new(), Vec::new(), 1.0),
        };
        let mut preserved = Vec::new();
        let mut missing = Vec::new();
        for anchor in anchors {
            let anchor_lower = anchor.to_lowercase();
            let direct = lower.contains(&anchor_lower);
            let via_concept = self
                .concepts
                .get(&anchor_lower)
                .map(|syns| syns.iter().any(|s| lower.contains(s.as_str())))
                .unwrap_or(false);
            if direct || via_concept {
                preserved.push(anchor.clone());
            } else {
                missing.push(anchor.clone());
            }
        }
        let rate = preserved.len() as f64 / anchors.len() as f64;
        (preserved, missing, rate)
    }

    /// Fragmentation score in [0, 1]: truncation markers, an incomplete
    /// final sentence, very short output, and heavy word repetition each
    /// add a penalty.
    fn fragmentation_score(&self, text: &str) -> f64 {
        let mut score: f64 = 0.0;

        if text.len() < self.config.short_output_chars {
            score += 0.4;
        }

        if text.ends_with("...") || text.ends_with('\u{2026}') {
            score += 0.3;
        } else if !text.ends_with(['.', '!', '?', ':', ')']) && text.len() >= self.config.short_output_chars
        {
            // Long output that stops mid-sentence.
            score += 0.3;
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() >= 8 {
            let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
            let repetition = 1.0 - unique.len() as f64 / words.len() as f64;
            if repetition > self.config.repetition_cutoff {
                score += 0.3;
            }
        }

        score.clamp(0.0, 1.0)
    }

    fn classify_drift(
        &self,
        hallucinations: &[String],
        fragmentation: f64,
        speculative: bool,
        missing_terms: &[String],
    ) -> DriftType {
        if !hallucinations.is_empty() {
            DriftType::Hallucination
        } else if fragmentation >= self.config.fragmentation_drift_cutoff {
            DriftType::Fragmentation
        } else if speculative {
            DriftType::Speculative
        } else if !missing_terms.is_empty() {
            DriftType::MissingTerm
        } else {
            DriftType::Generic
        }
    }
}

fn default_concepts() -> HashMap<String, Vec<String>> {
    let seed: &[(&str, &[&str])] = &[
        ("appointment", &["booking", "reservation", "slot"]),
        ("payment", &["charge", "billing", "invoice"]),
        ("identity", &["account", "verification", "credentials"]),
        ("escalation", &["supervisor", "manager", "specialist"]),
        ("resolution", &["fix", "solution", "resolved"]),
        ("availability", &["open slots", "free times", "schedule"]),
    ];
    seed.iter()
        .map(|(concept, syns)| {
            (
                concept.to_string(),
                syns.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriftConfig;

    fn detector() -> DriftDetector {
        DriftDetector::new(DriftConfig::default())
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aligned_output() {
        let d = detector();
        let analysis = d.analyze(
            "Check: Missing appointment time and location details.",
            &terms(&["check", "missing"]),
            None,
            Domain::AppointmentBooking,
        );
        assert!(analysis.aligned);
        assert_eq!(analysis.severity, DriftSeverity::None);
        assert_eq!(analysis.drift_type, None);
        assert!(analysis.confidence >= 0.4);
    }

    #[test]
    fn test_empty_output_is_severe() {
        let d = detector();
        let analysis = d.analyze("", &terms(&["check"]), None, Domain::General);
        assert!(!analysis.aligned);
        assert_eq!(analysis.severity, DriftSeverity::Severe);
        assert_eq!(analysis.confidence, 0.0);
        assert!(analysis.notes[0].contains("empty output"));
    }

    #[test]
    fn test_whitespace_output_coerced_to_empty() {
        let d = detector();
        let analysis = d.analyze("   \n\t  ", &terms(&["check"]), None, Domain::General);
        assert!(!analysis.aligned);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn test_hallucination_detected_and_prioritized() {
        let d = detector();
        // All terms missing, plus a domain hallucination marker: type must
        // still be hallucination (highest priority).
        let analysis = d.analyze(
            "We are open 24/7, no appointment needed for anything ever discussed",
            &terms(&["refund", "escalate"]),
            None,
            Domain::AppointmentBooking,
        );
        assert!(!analysis.hallucinations.is_empty());
        assert_eq!(analysis.drift_type, Some(DriftType::Hallucination));
    }

    #[test]
    fn test_missing_term_drift() {
        let d = detector();
        let analysis = d.analyze(
            "This response talks about something entirely unrelated to the request.",
            &terms(&["refund", "invoice", "billing"]),
            Some(&terms(&["payment"])),
            Domain::General,
        );
        assert!(!analysis.aligned);
        assert_eq!(analysis.drift_type, Some(DriftType::MissingTerm));
    }

    #[test]
    fn test_fragmentation_short_output() {
        let d = detector();
        let analysis = d.analyze("ok then...", &terms(&[]), None, Domain::General);
        assert!(analysis.fragmentation > 0.5);
    }

    #[test]
    fn test_fragmentation_repetition() {
        let d = detector();
        let text = "yes yes yes yes yes yes yes yes yes yes";
        let analysis = d.analyze(text, &terms(&[]), None, Domain::General);
        assert!(analysis.fragmentation >= 0.3);
    }

    #[test]
    fn test_anchor_preservation_via_concept_map() {
        let d = detector();
        // "booking" preserves the "appointment" anchor through the concept map.
        let analysis = d.analyze(
            "Your booking is confirmed for Tuesday at 3pm.",
            &terms(&[]),
            Some(&terms(&["appointment"])),
            Domain::AppointmentBooking,
        );
        assert_eq!(analysis.preserved_anchors, terms(&["appointment"]));
        assert!(analysis.missing_anchors.is_empty());
    }

    #[test]
    fn test_no_anchors_full_preservation() {
        let d = detector();
        let analysis = d.analyze(
            "Check the missing details and respond.",
            &terms(&["check", "missing"]),
            None,
            Domain::General,
        );
        // No anchors supplied: preservation contributes its full weight.
        assert!(analysis.confidence >= 0.9);
    }

    #[test]
    fn test_speculative_language_noted() {
        let d = detector();
        let analysis = d.analyze(
            "It might be a network problem, perhaps try again later, not sure though",
            &terms(&["restart", "router", "firmware"]),
            None,
            Domain::Troubleshooting,
        );
        assert!(analysis
            .notes
            .iter()
            .any(|n| n.contains("speculative")));
    }

    #[test]
    fn test_idempotence() {
        let d = detector();
        let output = "Check: Missing appointment time, perhaps reschedule...";
        let expected = terms(&["check", "missing", "reschedule"]);
        let anchors = terms(&["appointment"]);
        let first = d.analyze(output, &expected, Some(&anchors), Domain::AppointmentBooking);
        let second = d.analyze(output, &expected, Some(&anchors), Domain::AppointmentBooking);
        assert_eq!(first, second);
    }

    #[test]
    fn test_confidence_clamped() {
        let d = detector();
        let analysis = d.analyze(
            "open 24/7...",
            &terms(&["a", "b", "c", "d"]),
            None,
            Domain::AppointmentBooking,
        );
        assert!((0.0..=1.0).contains(&analysis.confidence));
    }
}
