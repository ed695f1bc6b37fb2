//! Provider adapter trait and registry.
//!
//! Every backend search service is reached through [`ProviderAdapter`],
//! regardless of its own transport (HTTP API, subprocess, scraper). The
//! router treats adapters uniformly: it asks for a cost estimate, checks
//! admission, dispatches with a timeout, and records the outcome. Adapter
//! implementations live outside this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ContentType, Cost, ProviderId, QueryParams, SearchQuery, SearchResult};

/// What a provider can do, as reported by its adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Content types this provider specialises in.
    pub content_types: Vec<ContentType>,
    /// Hard ceiling on results per query.
    pub max_results_per_query: usize,
    /// Whether results may carry full page content.
    pub supports_full_content: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            content_types: vec![ContentType::Mixed],
            max_results_per_query: 20,
            supports_full_content: false,
        }
    }
}

/// A pluggable backend search service.
///
/// Implementations handle their own wire protocol and return results in
/// the provider's native ranking order. All implementations must be
/// `Send + Sync`; the router dispatches them concurrently.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The registry id this adapter answers to.
    fn id(&self) -> ProviderId;

    /// Static capability report.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Estimated cost of dispatching this query, used for budget
    /// admission before any network call.
    fn estimate_cost(&self, query: &SearchQuery) -> Cost;

    /// Perform the search. The router enforces `timeout` around this
    /// call; implementations should also pass it to their transport so
    /// sockets are not left dangling past the deadline.
    ///
    /// # Errors
    ///
    /// Any error counts as a provider failure against the circuit
    /// breaker. Returning an empty `Vec` is a success with no hits.
    async fn search(&self, params: &QueryParams, timeout: Duration) -> Result<Vec<SearchResult>>;
}

/// Registry of provider adapters keyed by id.
///
/// Built once at startup and shared immutably across queries.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own id. A second registration with
    /// the same id replaces the first.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    /// Look up an adapter by id.
    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    /// All registered provider ids, sorted for deterministic iteration.
    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry has no adapters.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}
