//! Core types shared across the search pipeline.
//!
//! Everything here is plain data: queries as submitted by the caller,
//! results as returned by provider adapters, and the merged response the
//! pipeline hands back. All types derive `serde` so the transport front
//! end can expose them without translation.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Identifier for a backend search provider.
///
/// Cheap to clone, compares case-sensitively. Providers are registered
/// under their id in the [`ProviderRegistry`](crate::provider::ProviderRegistry)
/// and all admission-control state is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a borrowed string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Monetary amount in micro-dollars (1 USD = 1,000,000 micros).
///
/// Budgets and per-query costs are tracked in integer micros so that
/// repeated additions never drift the way floating point would. Serialises
/// as the raw micro count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cost(u64);

impl Cost {
    /// Zero cost.
    pub const ZERO: Cost = Cost(0);

    /// Construct from micro-dollars.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Construct from whole cents.
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents * 10_000)
    }

    /// Construct from whole dollars.
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars * 1_000_000)
    }

    /// The raw micro-dollar count.
    pub const fn micros(&self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition.
    pub fn saturating_add(self, other: Cost) -> Cost {
        Cost(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction, clamping at zero.
    pub fn saturating_sub(self, other: Cost) -> Cost {
        Cost(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

impl std::iter::Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, Cost::saturating_add)
    }
}

/// Content-type classification for a query.
///
/// Closed set — classification that cannot pick a clear winner falls back
/// to [`ContentType::Mixed`] rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Factual,
    Academic,
    Technical,
    News,
    Commercial,
    Educational,
    Mixed,
}

impl ContentType {
    /// Stable lowercase label, used in cache fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Academic => "academic",
            Self::Technical => "technical",
            Self::News => "news",
            Self::Commercial => "commercial",
            Self::Educational => "educational",
            Self::Mixed => "mixed",
        }
    }

    /// All classifiable variants (excludes [`ContentType::Mixed`], which is
    /// the fallback rather than a classification target).
    pub fn classifiable() -> &'static [ContentType] {
        &[
            Self::Factual,
            Self::Academic,
            Self::Technical,
            Self::News,
            Self::Commercial,
            Self::Educational,
        ]
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution strategy for dispatching a query to its candidate providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Concurrent fan-out to all candidates under a shared deadline.
    Parallel,
    /// Sequential dispatch, stopping once results are judged adequate.
    Cascade,
}

/// An externally supplied provider score, blended with the default scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalScore {
    /// Score in the same [0,1] space as the default scorer.
    pub score: f64,
    /// Confidence in [0,1]; weights the blend against the default score.
    pub confidence: f64,
}

/// Optional routing hints attached to a query.
///
/// Named, typed fields rather than a free-form map; unknown hints have
/// nowhere to hide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingHints {
    /// Providers to rank ahead of equal-scored peers.
    #[serde(default)]
    pub prefer: Vec<ProviderId>,
    /// Per-provider scores from a secondary reasoning step, blended with
    /// the default scorer via confidence-weighted average.
    #[serde(default)]
    pub external_scores: HashMap<ProviderId, ExternalScore>,
}

/// A search request as submitted by the caller.
///
/// Immutable once validated. Optional fields fall back to configured
/// defaults inside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The query text.
    pub text: String,
    /// Maximum results in the merged response. Must be > 0 when present.
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Explicit content-type hint, skipping classification.
    #[serde(default)]
    pub content_type: Option<ContentType>,
    /// Explicit provider list. Honoured outright, still subject to
    /// admission control.
    #[serde(default)]
    pub providers: Option<Vec<ProviderId>>,
    /// Ceiling on estimated spend for this query.
    #[serde(default)]
    pub budget: Option<Cost>,
    /// Overall timeout override.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Explicit execution strategy, overriding selection.
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    /// Free-form routing hints, validated at entry.
    #[serde(default)]
    pub hints: RoutingHints,
}

impl SearchQuery {
    /// Build a query with defaults for everything but the text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_results: None,
            content_type: None,
            providers: None,
            budget: None,
            timeout: None,
            strategy: None,
            hints: RoutingHints::default(),
        }
    }

    /// Validate the query once at pipeline entry.
    ///
    /// Checks:
    /// - text must be non-empty after trimming
    /// - `max_results` must be greater than 0 when present
    /// - an explicit provider list must not be empty
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.text.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query text is empty".into()));
        }
        if self.max_results == Some(0) {
            return Err(SearchError::InvalidQuery(
                "max_results must be greater than 0".into(),
            ));
        }
        if let Some(providers) = &self.providers {
            if providers.is_empty() {
                return Err(SearchError::InvalidQuery(
                    "explicit provider list is empty".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Query parameters handed to a provider adapter.
///
/// Already normalised: trimmed text, resolved result count, resolved
/// content-type hint. Adapters never see the raw [`SearchQuery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    /// Trimmed query text.
    pub text: String,
    /// Maximum results the adapter should return.
    pub max_results: usize,
    /// Content-type classification, for adapters that can use it.
    pub content_type: Option<ContentType>,
}

/// A single hit from one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The title of the result page.
    pub title: String,
    /// The result URL as reported by the provider.
    pub url: String,
    /// A text snippet summarising the page.
    pub snippet: String,
    /// Full page content, when the provider supplies it.
    #[serde(default)]
    pub content: Option<String>,
    /// Provider-local relevance score. Scale varies per provider; the
    /// merger normalises before comparison.
    pub score: f64,
    /// Which provider returned this result.
    pub provider: ProviderId,
    /// Publication timestamp, when known.
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    /// Free-form metadata (domain, derived reading time, etc.).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A search result after merging, with its final pipeline rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedResult {
    /// The merged underlying result (metadata and sources unioned).
    pub result: SearchResult,
    /// 1-based position in the final ordering.
    pub rank: usize,
    /// How many providers returned an equivalent result.
    pub consensus: usize,
    /// Weighted final score used for ordering.
    pub final_score: f64,
    /// Every provider that contributed an equivalent result.
    pub sources: Vec<ProviderId>,
}

/// The pipeline's response to one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Merged, deduplicated, ranked results.
    pub results: Vec<MergedResult>,
    /// The original query text.
    pub query: String,
    /// Providers that actually contributed results.
    pub providers_used: Vec<ProviderId>,
    /// Wall-clock time spent producing the response.
    pub elapsed: Duration,
    /// Total estimated spend across dispatched providers.
    pub total_cost: Cost,
    /// Whether the response was served from the cache.
    pub cache_hit: bool,
}
