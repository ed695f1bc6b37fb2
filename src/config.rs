//! Pipeline configuration with sensible defaults.
//!
//! [`SearchMuxConfig`] is a plain typed struct: per-provider quotas and
//! weights plus router, merger, and cache tuning. Loading it from a file
//! or the environment is the embedding application's concern; the
//! pipeline only validates and reads it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::{ContentType, Cost, ProviderId};

/// Rate-limit thresholds for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per sliding minute.
    pub per_minute: u32,
    /// Maximum requests per sliding hour.
    pub per_hour: u32,
    /// Maximum requests per sliding day.
    pub per_day: u32,
    /// Maximum concurrent in-flight requests.
    pub max_concurrent: u32,
    /// Cooldown after a denial, during which requests are rejected
    /// pre-emptively without consuming window slots.
    pub cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 30,
            per_hour: 500,
            per_day: 5_000,
            max_concurrent: 8,
            cooldown_secs: 30,
        }
    }
}

/// Budget limits for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum estimated cost for a single dispatch.
    pub per_query: Cost,
    /// Daily spend ceiling.
    pub daily: Cost,
    /// Monthly spend ceiling.
    pub monthly: Cost,
    /// When false, over-budget dispatches are allowed and logged at warn
    /// instead of denied.
    pub enforce: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_query: Cost::from_cents(10),
            daily: Cost::from_dollars(5),
            monthly: Cost::from_dollars(100),
            enforce: true,
        }
    }
}

/// Circuit-breaker thresholds for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before tripping the circuit to open.
    pub failure_threshold: u32,
    /// Seconds to wait in open state before allowing a half-open probe.
    pub recovery_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_secs: 60,
        }
    }
}

/// Per-provider configuration: enablement, ranking weights, and quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether the provider may be dispatched at all.
    pub enabled: bool,
    /// Static quality weight applied in scoring and final ranking.
    /// 1.0 is neutral; higher means results from this provider rank up.
    pub quality_weight: f64,
    /// Content-type specialisation in [0,1]. Types absent from the map
    /// fall back to [`ProviderConfig::default_affinity`].
    #[serde(default)]
    pub affinity: HashMap<ContentType, f64>,
    /// Affinity for content types not listed in `affinity`.
    pub default_affinity: f64,
    /// Rough expected latency, used as the scorer's estimate.
    pub typical_latency_ms: u64,
    pub rate: RateLimitConfig,
    pub budget: BudgetConfig,
    pub circuit: CircuitBreakerConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality_weight: 1.0,
            affinity: HashMap::new(),
            default_affinity: 0.5,
            typical_latency_ms: 800,
            rate: RateLimitConfig::default(),
            budget: BudgetConfig::default(),
            circuit: CircuitBreakerConfig::default(),
        }
    }
}

/// Router tuning: candidate selection, strategy choice, timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Maximum candidates selected by score (K).
    pub max_candidates: usize,
    /// Minimum score for a provider to remain a candidate.
    pub min_score: f64,
    /// Base per-provider timeout before complexity scaling.
    pub base_timeout_ms: u64,
    /// Lower clamp on the computed per-provider timeout.
    pub min_timeout_ms: u64,
    /// Upper clamp on the computed per-provider timeout.
    pub max_timeout_ms: u64,
    /// How strongly query complexity stretches the timeout:
    /// `timeout = base * (1 + complexity_factor * complexity)`.
    pub complexity_factor: f64,
    /// Complexity at or above which the cascade strategy is preferred.
    pub cascade_complexity_floor: f64,
    /// Cascade stops once this many results have accumulated.
    pub cascade_adequacy: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            min_score: 0.25,
            base_timeout_ms: 3_000,
            min_timeout_ms: 1_000,
            max_timeout_ms: 10_000,
            complexity_factor: 1.0,
            cascade_complexity_floor: 0.6,
            cascade_adequacy: 5,
        }
    }
}

/// Merger tuning: deduplication thresholds and ranking weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergerConfig {
    /// Fuzzy similarity on normalised URL/title above which two results
    /// are considered near-duplicates.
    pub fuzzy_threshold: f64,
    /// N-gram cosine similarity on snippet/content above which two
    /// results are considered near-duplicates.
    pub content_threshold: f64,
    /// Score bonus per additional provider that returned an equivalent
    /// result.
    pub consensus_boost: f64,
    /// Penalty subtracted per day of age for time-sensitive content
    /// (news), capped at [`MergerConfig::max_recency_penalty`].
    pub recency_penalty_per_day: f64,
    /// Ceiling on the total recency penalty.
    pub max_recency_penalty: f64,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.88,
            content_threshold: 0.80,
            consensus_boost: 0.2,
            recency_penalty_per_day: 0.02,
            max_recency_penalty: 0.3,
        }
    }
}

/// Tiered cache TTLs and memory-tier bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the cache wraps the pipeline at all.
    pub enabled: bool,
    /// Maximum entries in the memory tier.
    pub memory_capacity: u64,
    /// Memory-tier TTL.
    pub memory_ttl_secs: u64,
    /// Distributed-tier TTL.
    pub distributed_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_capacity: 256,
            memory_ttl_secs: 120,
            distributed_ttl_secs: 3_600,
        }
    }
}

/// Top-level configuration for the search pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMuxConfig {
    /// Result count when the query does not specify one.
    pub default_max_results: usize,
    /// Per-provider configuration, keyed by registry id. Providers
    /// registered without an entry here get [`ProviderConfig::default`].
    #[serde(default)]
    pub providers: HashMap<ProviderId, ProviderConfig>,
    pub router: RouterConfig,
    pub merger: MergerConfig,
    pub cache: CacheConfig,
}

impl Default for SearchMuxConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            providers: HashMap::new(),
            router: RouterConfig::default(),
            merger: MergerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SearchMuxConfig {
    /// Look up a provider's config, falling back to defaults.
    pub fn provider(&self, id: &ProviderId) -> ProviderConfig {
        self.providers.get(id).cloned().unwrap_or_default()
    }

    /// Validates this configuration, returning an error on the first
    /// invalid field.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.default_max_results == 0 {
            return Err(SearchError::Config(
                "default_max_results must be greater than 0".into(),
            ));
        }
        let r = &self.router;
        if r.max_candidates == 0 {
            return Err(SearchError::Config(
                "router.max_candidates must be greater than 0".into(),
            ));
        }
        if r.min_timeout_ms == 0 || r.min_timeout_ms > r.max_timeout_ms {
            return Err(SearchError::Config(
                "router timeout clamp requires 0 < min_timeout_ms <= max_timeout_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&r.min_score) {
            return Err(SearchError::Config(
                "router.min_score must be within [0,1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&r.cascade_complexity_floor) {
            return Err(SearchError::Config(
                "router.cascade_complexity_floor must be within [0,1]".into(),
            ));
        }
        let m = &self.merger;
        if !(0.0..=1.0).contains(&m.fuzzy_threshold) || !(0.0..=1.0).contains(&m.content_threshold)
        {
            return Err(SearchError::Config(
                "merger similarity thresholds must be within [0,1]".into(),
            ));
        }
        for (id, provider) in &self.providers {
            if provider.quality_weight <= 0.0 {
                return Err(SearchError::Config(format!(
                    "provider {id}: quality_weight must be positive"
                )));
            }
            if provider.rate.max_concurrent == 0 {
                return Err(SearchError::Config(format!(
                    "provider {id}: rate.max_concurrent must be greater than 0"
                )));
            }
            if provider.circuit.failure_threshold == 0 {
                return Err(SearchError::Config(format!(
                    "provider {id}: circuit.failure_threshold must be greater than 0"
                )));
            }
            for (content_type, weight) in &provider.affinity {
                if !(0.0..=1.0).contains(weight) {
                    return Err(SearchError::Config(format!(
                        "provider {id}: affinity for {content_type} must be within [0,1]"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Per-provider timeout for a query of the given complexity:
    /// `clamp(base * (1 + complexity_factor * complexity), min, max)`.
    pub fn provider_timeout(&self, complexity: f64) -> Duration {
        let r = &self.router;
        let scaled = r.base_timeout_ms as f64 * (1.0 + r.complexity_factor * complexity);
        let clamped = scaled.clamp(r.min_timeout_ms as f64, r.max_timeout_ms as f64);
        Duration::from_millis(clamped as u64)
    }
}
