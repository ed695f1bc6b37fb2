//! # searchmux
//!
//! Meta-search aggregation engine: one query in, one ranked result list
//! out.
//!
//! searchmux decides which backend search providers should handle a
//! query, dispatches to them under timeout and cost constraints, then
//! merges, deduplicates, and ranks their heterogeneous results. Provider
//! adapters (the wire-level integrations) live with the embedding
//! application; this crate is the decision-and-aggregation core.
//!
//! ## Pipeline
//!
//! - Fingerprint the query and consult the tiered cache
//! - Analyse the text into features (content type, complexity, keywords)
//! - Score providers and filter through admission control (rate limits,
//!   budgets, circuit breakers)
//! - Execute a parallel fan-out or sequential cascade under a
//!   complexity-scaled timeout budget
//! - Merge: canonicalise URLs, deduplicate (exact then fuzzy), rank by
//!   weighted score with consensus boost
//! - Cache the merged response in both tiers
//!
//! ## Degradation
//!
//! Individual provider failures are absorbed: they update that
//! provider's circuit breaker and the query continues with the rest.
//! Only when every candidate is excluded or fails does the caller see a
//! typed error. Distributed-cache outages degrade to memory-only
//! caching, never to query failures.

pub mod admission;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod error;
pub mod merger;
pub mod provider;
pub mod router;
pub mod scoring;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use admission::{AdmissionControl, ProviderStatus};
use analyzer::analyze;
use cache::{fingerprint, DistributedCache, TieredCache};
use router::UnifiedRouter;
use scoring::{DefaultScorer, ProviderScorer};

pub use admission::CircuitState;
pub use analyzer::QueryFeatures;
pub use cache::Fingerprint;
pub use config::SearchMuxConfig;
pub use error::{ExclusionReason, Result, SearchError};
pub use provider::{ProviderAdapter, ProviderCapabilities, ProviderRegistry};
pub use types::{
    ContentType, Cost, MergedResult, ProviderId, SearchQuery, SearchResponse, SearchResult,
    StrategyKind,
};

/// The assembled search pipeline.
///
/// Construct once with a validated configuration and a populated
/// [`ProviderRegistry`], then call [`SearchMux::search`] concurrently
/// from as many tasks as needed — all shared state is internally
/// synchronised per provider.
pub struct SearchMux {
    config: Arc<SearchMuxConfig>,
    registry: Arc<ProviderRegistry>,
    admission: Arc<AdmissionControl>,
    router: UnifiedRouter,
    cache: TieredCache,
}

impl SearchMux {
    /// Build a pipeline with the default scorer and a memory-only cache.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid.
    pub fn new(config: SearchMuxConfig, registry: ProviderRegistry) -> Result<Self> {
        Self::with_options(config, registry, Vec::new(), None)
    }

    /// Build a pipeline with extra scorers and/or a distributed cache
    /// tier.
    ///
    /// The default scorer is always registered last as the fallback;
    /// `scorers` listed here take precedence when their confidence is
    /// higher.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid.
    pub fn with_options(
        config: SearchMuxConfig,
        registry: ProviderRegistry,
        mut scorers: Vec<Box<dyn ProviderScorer>>,
        distributed: Option<Arc<dyn DistributedCache>>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = match &distributed {
            Some(store) => TieredCache::with_distributed(&config.cache, Arc::clone(store)),
            None => TieredCache::new(&config.cache),
        };

        scorers.push(Box::new(DefaultScorer));

        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let admission = Arc::new(AdmissionControl::from_config(&config));
        let router = UnifiedRouter::new(
            Arc::clone(&registry),
            Arc::clone(&admission),
            scorers,
            Arc::clone(&config),
        );

        Ok(Self {
            config,
            registry,
            admission,
            router,
            cache,
        })
    }

    /// Run one query through the full pipeline.
    ///
    /// # Errors
    ///
    /// - [`SearchError::InvalidQuery`] before any dispatch
    /// - [`SearchError::NoProvidersAvailable`],
    ///   [`SearchError::BudgetExhausted`], [`SearchError::AllRateLimited`]
    ///   when admission or scoring excludes every candidate
    /// - [`SearchError::AllProvidersFailed`] when every dispatched
    ///   provider errors or times out
    ///
    /// Partial success is not an error: `providers_used` reflects the
    /// providers that contributed, and failed providers are visible
    /// through [`SearchMux::provider_status`] instead.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let started = Instant::now();
        query.validate()?;

        let key = fingerprint(query, self.config.default_max_results);
        if self.config.cache.enabled {
            if let Some((mut response, _tier)) = self.cache.get(&key).await {
                response.cache_hit = true;
                tracing::debug!(query = %query.text, "served from cache");
                return Ok(response);
            }
        }

        let mut features = analyze(&query.text);
        if let Some(hint) = query.content_type {
            features.content_type = hint;
        }
        tracing::trace!(
            query = %query.text,
            content_type = %features.content_type,
            complexity = features.complexity,
            "query analysed"
        );

        let outcome = self.router.route(query, &features).await?;

        let max_results = query.max_results.unwrap_or(self.config.default_max_results);
        let quality_weights: HashMap<ProviderId, f64> = outcome
            .results_by_provider
            .iter()
            .map(|(id, _)| (id.clone(), self.config.provider(id).quality_weight))
            .collect();

        let merged = merger::merge(
            outcome.results_by_provider,
            max_results,
            features.content_type,
            &quality_weights,
            &self.config.merger,
        );

        let response = SearchResponse {
            results: merged,
            query: query.text.clone(),
            providers_used: outcome.providers_used,
            elapsed: started.elapsed(),
            total_cost: outcome.total_cost,
            cache_hit: false,
        };

        if self.config.cache.enabled {
            self.cache.set(&key, &response).await;
        }
        Ok(response)
    }

    /// Search with defaults for everything but the text.
    ///
    /// # Errors
    ///
    /// Same as [`SearchMux::search`].
    pub async fn search_text(&self, text: &str) -> Result<SearchResponse> {
        self.search(&SearchQuery::new(text)).await
    }

    /// Read-only admission status for every registered provider —
    /// circuit state, rate-window occupancy, and spend. For external
    /// health and metrics reporting.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.admission.status_all(&self.registry_ids())
    }

    /// Admission status for one provider.
    pub fn status(&self, provider: &ProviderId) -> ProviderStatus {
        self.admission.status(provider)
    }

    /// Drop one cached response from both tiers.
    pub async fn invalidate(&self, query: &SearchQuery) {
        let key = fingerprint(query, self.config.default_max_results);
        self.cache.invalidate(&key).await;
    }

    /// Drop every cached response from both tiers.
    pub async fn invalidate_all(&self) {
        self.cache.clear().await;
    }

    fn registry_ids(&self) -> Vec<ProviderId> {
        self.registry.ids()
    }
}

impl std::fmt::Debug for SearchMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchMux")
            .field("providers", &self.registry_ids())
            .field("cache", &self.cache)
            .finish()
    }
}
