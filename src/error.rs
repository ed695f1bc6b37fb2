//! Error types for the searchmux pipeline.
//!
//! Provider-level failures (timeouts, transport errors) are recovered
//! locally by admission control and the router; they only surface to the
//! caller when they eliminate every candidate. Query-level failures are
//! always surfaced as typed variants with enough context for the caller
//! to decide whether to retry.

use crate::types::ProviderId;

/// Why a provider was excluded from a query's candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Circuit breaker is open for this provider.
    CircuitOpen,
    /// Rate limiter denied the request (window full or cooling down).
    RateLimited,
    /// Estimated cost exceeded a budget limit.
    OverBudget,
    /// Provider is disabled in configuration.
    Disabled,
    /// Provider id is not present in the registry.
    NotRegistered,
    /// Provider score fell below the configured floor.
    BelowMinScore,
    /// Dispatch was attempted and failed (timeout or provider error).
    Failed,
}

impl ExclusionReason {
    /// Short human-readable label for error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit open",
            Self::RateLimited => "rate limited",
            Self::OverBudget => "over budget",
            Self::Disabled => "disabled",
            Self::NotRegistered => "not registered",
            Self::BelowMinScore => "below minimum score",
            Self::Failed => "dispatch failed",
        }
    }
}

fn format_exclusions(tried: &[(ProviderId, ExclusionReason)]) -> String {
    if tried.is_empty() {
        return "no providers configured".to_string();
    }
    tried
        .iter()
        .map(|(id, reason)| format!("{id} ({})", reason.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during a search operation.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The query failed validation before any dispatch.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid pipeline configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Every candidate was excluded by admission control or scoring.
    /// Carries which providers were considered and why each was excluded.
    #[error("no providers available: {}", format_exclusions(.tried))]
    NoProvidersAvailable {
        tried: Vec<(ProviderId, ExclusionReason)>,
    },

    /// Every candidate was excluded because of budget limits.
    #[error("all providers exceeded budget: {0}")]
    BudgetExhausted(String),

    /// Every candidate was rate-limited or circuit-open.
    #[error("all providers rate limited or circuit open: {0}")]
    AllRateLimited(String),

    /// Every dispatched provider failed.
    #[error("all providers failed: {0}")]
    AllProvidersFailed(String),

    /// A single provider dispatch failed. Handled internally by the
    /// router; only wrapped into [`SearchError::AllProvidersFailed`] if
    /// no sibling succeeds.
    #[error("provider {provider} failed: {message}")]
    Provider {
        provider: ProviderId,
        message: String,
    },

    /// A dispatch exceeded its computed timeout.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// Distributed cache tier error. Never surfaced from the lookup path —
    /// the cache degrades to memory-only instead.
    #[error("cache error: {0}")]
    Cache(String),
}

/// Convenience type alias for searchmux results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_query() {
        let err = SearchError::InvalidQuery("query text is empty".into());
        assert_eq!(err.to_string(), "invalid query: query text is empty");
    }

    #[test]
    fn display_no_providers_lists_reasons() {
        let err = SearchError::NoProvidersAvailable {
            tried: vec![
                (ProviderId::new("brave"), ExclusionReason::CircuitOpen),
                (ProviderId::new("exa"), ExclusionReason::RateLimited),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("brave (circuit open)"));
        assert!(msg.contains("exa (rate limited)"));
    }

    #[test]
    fn display_no_providers_empty_tried() {
        let err = SearchError::NoProvidersAvailable { tried: vec![] };
        assert!(err.to_string().contains("no providers configured"));
    }

    #[test]
    fn display_budget_exhausted() {
        let err = SearchError::BudgetExhausted("3 candidates over limit".into());
        assert!(err.to_string().contains("exceeded budget"));
    }

    #[test]
    fn display_provider_failure() {
        let err = SearchError::Provider {
            provider: ProviderId::new("kagi"),
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "provider kagi failed: connection refused");
    }

    #[test]
    fn exclusion_reason_labels() {
        assert_eq!(ExclusionReason::OverBudget.label(), "over budget");
        assert_eq!(ExclusionReason::Failed.label(), "dispatch failed");
    }

    #[test]
    fn exclusion_reason_serde_snake_case() {
        let json = serde_json::to_string(&ExclusionReason::CircuitOpen).expect("serialize");
        assert_eq!(json, "\"circuit_open\"");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
