//! Domain inference and per-domain scoring policy.
//!
//! A trial's domain is resolved from its identity-prefix convention first
//! (authoritative), falling back to keyword sniffing over the user input.
//! When both signals are present and disagree, the mismatch is flagged via
//! `tracing::warn!` and the prefix wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Task domain for a trial. Drives default criteria, budget multipliers,
/// tier forgiveness, and the hallucination marker list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    AppointmentBooking,
    Troubleshooting,
    ProductInfo,
    General,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Domain::AppointmentBooking => "appointment_booking",
            Domain::Troubleshooting => "troubleshooting",
            Domain::ProductInfo => "product_info",
            Domain::General => "general",
        }
    }

    /// Resolve a domain from the trial identity prefix (text before the
    /// first `-` or `_`).
    pub fn from_prefix(trial_id: &str) -> Option<Domain> {
        let prefix = trial_id
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match prefix.as_str() {
            "apt" | "appt" | "booking" => Some(Domain::AppointmentBooking),
            "ts" | "fix" | "diag" => Some(Domain::Troubleshooting),
            "prod" | "faq" | "info" => Some(Domain::ProductInfo),
            "gen" => Some(Domain::General),
            _ => None,
        }
    }

    /// Keyword-sniffing fallback over the user input. Documented fallback
    /// only; the identity prefix is authoritative when present.
    pub fn from_keywords(user_input: &str) -> Option<Domain> {
        let lower = user_input.to_lowercase();
        if lower.contains("appointment")
            || lower.contains("booking")
            || lower.contains("reschedule")
            || lower.contains("schedule")
            || lower.contains("time slot")
        {
            return Some(Domain::AppointmentBooking);
        }
        if lower.contains("troubleshoot")
            || lower.contains("not working")
            || lower.contains("error")
            || lower.contains("broken")
            || lower.contains("restart")
            || (lower.contains("fix") && lower.contains("issue"))
        {
            return Some(Domain::Troubleshooting);
        }
        if lower.contains("price")
            || lower.contains("warranty")
            || lower.contains("product")
            || lower.contains("feature")
            || lower.contains("plan")
            || lower.contains("subscription")
        {
            return Some(Domain::ProductInfo);
        }
        None
    }

    /// Full resolution: prefix first, keyword fallback, `General` default.
    /// Disagreements between the two signals are flagged, not silently
    /// resolved.
    pub fn resolve(trial_id: &str, user_input: &str) -> Domain {
        let by_prefix = Self::from_prefix(trial_id);
        let by_keywords = Self::from_keywords(user_input);
        match (by_prefix, by_keywords) {
            (Some(p), Some(k)) if p != k => {
                tracing::warn!(
                    trial = %trial_id,
                    prefix_domain = p.label(),
                    keyword_domain = k.label(),
                    "Domain signals disagree; identity prefix wins"
                );
                p
            }
            (Some(p), _) => p,
            (None, Some(k)) => k,
            (None, None) => Domain::General,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-domain scoring policy: defaults for unset success criteria, the
/// token-budget complexity multiplier, the required-ratio forgiveness for
/// noisy domains, and curated hallucination markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub complexity_multiplier: f64,
    /// Subtracted from each tier threshold's required-ratio bar. Domains
    /// with inherently noisier phrasing get a lower bar.
    pub required_ratio_forgiveness: f64,
    pub default_min_accuracy: f64,
    pub default_token_budget: usize,
    pub default_max_latency_ms: u64,
    /// Domain-specific invented-fact substrings that count as
    /// hallucinations if they appear in a response.
    pub hallucination_markers: Vec<String>,
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self {
            complexity_multiplier: 1.1,
            required_ratio_forgiveness: 0.0,
            default_min_accuracy: 0.6,
            default_token_budget: 80,
            default_max_latency_ms: 5_000,
            hallucination_markers: vec!["as an ai language model".into()],
        }
    }
}

/// Pluggable table of per-domain profiles. Lookups for unregistered
/// domains fall back to the general profile.
#[derive(Debug, Clone)]
pub struct DomainTable {
    profiles: HashMap<Domain, DomainProfile>,
    general: DomainProfile,
}

impl Default for DomainTable {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            Domain::AppointmentBooking,
            DomainProfile {
                complexity_multiplier: 1.0,
                required_ratio_forgiveness: 0.0,
                default_min_accuracy: 0.65,
                default_token_budget: 60,
                default_max_latency_ms: 4_000,
                hallucination_markers: vec![
                    "no appointment needed".into(),
                    "walk-ins only".into(),
                    "open 24/7".into(),
                    "booking fee applies".into(),
                ],
            },
        );
        profiles.insert(
            Domain::Troubleshooting,
            DomainProfile {
                complexity_multiplier: 1.2,
                required_ratio_forgiveness: 0.1,
                default_min_accuracy: 0.55,
                default_token_budget: 90,
                default_max_latency_ms: 6_000,
                hallucination_markers: vec![
                    "guaranteed fix".into(),
                    "cannot be repaired".into(),
                    "replace the unit immediately".into(),
                    "void your warranty by restarting".into(),
                ],
            },
        );
        profiles.insert(
            Domain::ProductInfo,
            DomainProfile {
                complexity_multiplier: 1.1,
                required_ratio_forgiveness: 0.05,
                default_min_accuracy: 0.6,
                default_token_budget: 80,
                default_max_latency_ms: 5_000,
                hallucination_markers: vec![
                    "lifetime warranty".into(),
                    "free forever".into(),
                    "unlimited usage".into(),
                    "money-back guarantee on all plans".into(),
                ],
            },
        );
        Self {
            profiles,
            general: DomainProfile::default(),
        }
    }
}

impl DomainTable {
    /// Profile for a domain, falling back to the general profile.
    pub fn profile(&self, domain: Domain) -> &DomainProfile {
        self.profiles.get(&domain).unwrap_or(&self.general)
    }

    /// Replace the profile of one domain (for recalibration or tests).
    pub fn set_profile(&mut self, domain: Domain, profile: DomainProfile) {
        self.profiles.insert(domain, profile);
    }

    /// All hallucination markers for a domain, including the general ones.
    pub fn hallucination_markers(&self, domain: Domain) -> Vec<&str> {
        let mut markers: Vec<&str> = self
            .profile(domain)
            .hallucination_markers
            .iter()
            .map(String::as_str)
            .collect();
        if domain != Domain::General {
            markers.extend(self.general.hallucination_markers.iter().map(String::as_str));
        }
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_resolution() {
        assert_eq!(
            Domain::from_prefix("apt-001"),
            Some(Domain::AppointmentBooking)
        );
        assert_eq!(Domain::from_prefix("ts_retry_17"), Some(Domain::Troubleshooting));
        assert_eq!(Domain::from_prefix("faq-pricing"), Some(Domain::ProductInfo));
        assert_eq!(Domain::from_prefix("misc-42"), None);
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(
            Domain::from_keywords("I need to reschedule my appointment"),
            Some(Domain::AppointmentBooking)
        );
        assert_eq!(
            Domain::from_keywords("the router is not working after the update"),
            Some(Domain::Troubleshooting)
        );
        assert_eq!(
            Domain::from_keywords("what does the premium plan cost"),
            Some(Domain::ProductInfo)
        );
        assert_eq!(Domain::from_keywords("hello there"), None);
    }

    #[test]
    fn test_resolve_prefix_is_authoritative() {
        // Prefix says troubleshooting, keywords say appointments; prefix wins.
        let domain = Domain::resolve("ts-009", "please book an appointment");
        assert_eq!(domain, Domain::Troubleshooting);
    }

    #[test]
    fn test_resolve_defaults_to_general() {
        assert_eq!(Domain::resolve("misc-1", "hello"), Domain::General);
    }

    #[test]
    fn test_domain_table_fallback_profile() {
        let table = DomainTable::default();
        let p = table.profile(Domain::General);
        assert!((p.complexity_multiplier - 1.1).abs() < f64::EPSILON);
        let apt = table.profile(Domain::AppointmentBooking);
        assert_eq!(apt.default_token_budget, 60);
    }

    #[test]
    fn test_hallucination_markers_include_general() {
        let table = DomainTable::default();
        let markers = table.hallucination_markers(Domain::AppointmentBooking);
        assert!(markers.contains(&"open 24/7"));
        assert!(markers.contains(&"as an ai language model"));
    }

    #[test]
    fn test_set_profile_overrides() {
        let mut table = DomainTable::default();
        table.set_profile(
            Domain::General,
            DomainProfile {
                complexity_multiplier: 2.0,
                ..DomainProfile::default()
            },
        );
        assert!((table.profile(Domain::General).complexity_multiplier - 2.0).abs() < f64::EPSILON);
    }
}
