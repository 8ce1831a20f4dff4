//! Fuzzy term matching shared by the drift detector and the tiered
//! evaluator. A term counts as matched if it appears verbatim, via the
//! synonym table, or (for multi-word terms) when at least half of its
//! words are present.

use std::collections::HashMap;

/// Term-to-synonyms lookup table. Data, not code: callers can extend or
/// replace entries to recalibrate matching.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    entries: HashMap<String, Vec<String>>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        let seed: &[(&str, &[&str])] = &[
            ("check", &["verify", "confirm", "inspect", "review"]),
            ("missing", &["absent", "lacking", "omitted", "not provided"]),
            ("schedule", &["book", "arrange", "set up", "reserve"]),
            ("cancel", &["call off", "terminate", "abort"]),
            ("update", &["modify", "change", "edit", "revise"]),
            ("error", &["issue", "problem", "fault", "failure"]),
            ("restart", &["reboot", "power cycle"]),
            ("location", &["place", "address", "venue", "site"]),
            ("time", &["hour", "slot", "when"]),
            ("appointment", &["booking", "reservation", "meeting"]),
            ("provide", &["supply", "give", "share", "include"]),
            ("contact", &["reach", "call", "email"]),
        ];
        let entries = seed
            .iter()
            .map(|(term, syns)| {
                (
                    term.to_string(),
                    syns.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }
}

impl SynonymTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, term: impl Into<String>, synonyms: Vec<String>) {
        self.entries.insert(term.into().to_lowercase(), synonyms);
    }

    pub fn synonyms(&self, term: &str) -> &[String] {
        self.entries
            .get(&term.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Whether a single term matches the (already lowercased) text.
pub fn term_matches(term: &str, text_lower: &str, table: &SynonymTable) -> bool {
    let term_lower = term.to_lowercase();
    if term_lower.is_empty() {
        return false;
    }
    if text_lower.contains(&term_lower) {
        return true;
    }
    if table
        .synonyms(&term_lower)
        .iter()
        .any(|syn| text_lower.contains(&syn.to_lowercase()))
    {
        return true;
    }
    // Partial match for multi-word terms: at least half the words present.
    let words: Vec<&str> = term_lower.split_whitespace().collect();
    if words.len() > 1 {
        let matched = words.iter().filter(|w| text_lower.contains(**w)).count();
        return matched * 2 >= words.len();
    }
    false
}

/// Result of matching a term list against a text.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    /// matched / total; 1.0 when no terms were supplied.
    pub ratio: f64,
}

/// Fuzzy-match every term against the text. An empty term list yields full
/// coverage.
pub fn coverage(terms: &[String], text: &str, table: &SynonymTable) -> Coverage {
    if terms.is_empty() {
        return Coverage {
            matched: Vec::new(),
            missing: Vec::new(),
            ratio: 1.0,
        };
    }
    let text_lower = text.to_lowercase();
    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for term in terms {
        if term_matches(term, &text_lower, table) {
            matched.push(term.clone());
        } else {
            missing.push(term.clone());
        }
    }
    let ratio = matched.len() as f64 / terms.len() as f64;
    Coverage {
        matched,
        missing,
        ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_terms(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verbatim_match() {
        let table = SynonymTable::default();
        assert!(term_matches("check", "please check the details", &table));
        assert!(!term_matches("refund", "please check the details", &table));
    }

    #[test]
    fn test_synonym_match() {
        let table = SynonymTable::default();
        // "verify" is a synonym of "check".
        assert!(term_matches("check", "verify the details first", &table));
        // "reboot" is a synonym of "restart".
        assert!(term_matches("restart", "try a reboot of the device", &table));
    }

    #[test]
    fn test_multiword_partial_match() {
        let table = SynonymTable::empty();
        // One of two words present: 1 * 2 >= 2 counts as matched.
        assert!(term_matches(
            "appointment time",
            "what time works for you",
            &table
        ));
        // Zero of two words present.
        assert!(!term_matches("appointment time", "hello there", &table));
    }

    #[test]
    fn test_coverage_empty_terms_full_ratio() {
        let table = SynonymTable::default();
        let cov = coverage(&[], "anything at all", &table);
        assert_eq!(cov.ratio, 1.0);
        assert!(cov.matched.is_empty());
        assert!(cov.missing.is_empty());
    }

    #[test]
    fn test_coverage_mixed() {
        let table = SynonymTable::default();
        let cov = coverage(
            &to_terms(&["check", "missing", "refund"]),
            "Check: Missing appointment time and location details",
            &table,
        );
        assert_eq!(cov.matched.len(), 2);
        assert_eq!(cov.missing, vec!["refund".to_string()]);
        assert!((cov.ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_coverage_case_insensitive() {
        let table = SynonymTable::default();
        let cov = coverage(&to_terms(&["CHECK"]), "please check twice", &table);
        assert_eq!(cov.ratio, 1.0);
    }

    #[test]
    fn test_empty_term_never_matches() {
        let table = SynonymTable::default();
        assert!(!term_matches("", "anything", &table));
    }
}
