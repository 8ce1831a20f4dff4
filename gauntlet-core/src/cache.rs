//! Result caching for trial evaluations.
//!
//! Identical runs (same identity, approach, tier, and execution options)
//! are served from cache within a TTL window. Values are deep copies both
//! ways so callers can never mutate cached state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CacheSettings;
use crate::types::{Tier, VariantResult, WalkthroughResult};

/// Execution knobs that affect results and therefore participate in the
/// cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// How many times each trial specification is run.
    pub trial_repeats: usize,
    /// Variants executed concurrently per window.
    pub concurrency_window: usize,
    /// Overrides the per-approach temperature when set.
    pub temperature_override: Option<f32>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            trial_repeats: 1,
            concurrency_window: 2,
            temperature_override: None,
        }
    }
}

/// A cached evaluation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedResult {
    Variant(VariantResult),
    Walkthrough(WalkthroughResult),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedResult,
    created_at: Instant,
}

/// TTL-and-capacity bounded cache of evaluation results.
///
/// Expired entries are dropped lazily on read. When the cache exceeds
/// capacity, expired entries are purged first; if that is not enough, the
/// oldest half is evicted.
pub struct ResultCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}

impl ResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_secs(settings.ttl_secs),
            capacity: settings.capacity.max(1),
        }
    }

    /// Deterministic cache key over everything that shapes a result.
    pub fn cache_key(
        identity: &str,
        approach: crate::types::Approach,
        tier: Tier,
        options: &ExecutionOptions,
    ) -> String {
        let opts = serde_json::to_string(options).unwrap_or_default();
        format!("{identity}|{}|{}|{opts}", approach.label(), tier.label())
    }

    /// Fetch a deep copy of a cached value, expiring it if stale.
    pub fn get(&mut self, key: &str) -> Option<CachedResult> {
        match self.entries.get(key) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => {
                debug!(key, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!(key, "Cache entry expired");
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a deep copy of a value, evicting as needed.
    pub fn set(&mut self, key: impl Into<String>, value: CachedResult) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
        self.enforce_capacity();
    }

    /// Remove entries whose key contains `pattern`, or everything when no
    /// pattern is given. Returns the number of entries removed.
    pub fn invalidate(&mut self, pattern: Option<&str>) -> usize {
        let before = self.entries.len();
        match pattern {
            Some(p) => self.entries.retain(|k, _| !k.contains(p)),
            None => self.entries.clear(),
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_capacity(&mut self) {
        if self.entries.len() <= self.capacity {
            return;
        }
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.created_at.elapsed() < ttl);
        if self.entries.len() <= self.capacity {
            return;
        }
        // Still over: evict the oldest half.
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.created_at))
            .collect();
        by_age.sort_by_key(|(_, created)| *created);
        let evict = by_age.len() / 2;
        for (key, _) in by_age.into_iter().take(evict) {
            self.entries.remove(&key);
        }
        debug!(evicted = evict, "Cache capacity eviction");
    }
}

// ============================================================================
// Tests
// ============================================================================
