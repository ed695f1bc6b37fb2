//! Unified router: candidate selection, admission, strategy execution.
//!
//! Per query the router scores every eligible provider, filters through
//! admission control, picks an execution strategy, and collects raw
//! per-provider result sets under a complexity-scaled timeout budget. No
//! state outlives the query — everything long-lived belongs to the
//! admission module.
//!
//! Failure semantics: a provider timeout or transport error updates that
//! provider's circuit-breaker and rate-limiter state and is excluded
//! from the result set. Only when every candidate is excluded or fails
//! does the caller see an error.

pub mod cascade;
pub mod parallel;

use std::sync::Arc;
use std::time::Duration;

use crate::admission::AdmissionControl;
use crate::analyzer::QueryFeatures;
use crate::config::SearchMuxConfig;
use crate::error::{ExclusionReason, Result, SearchError};
use crate::provider::{ProviderAdapter, ProviderRegistry};
use crate::scoring::{select_score, ProviderScorer, ScoringContext};
use crate::types::{Cost, ProviderId, QueryParams, SearchQuery, SearchResult, StrategyKind};

/// Everything needed to dispatch one provider.
pub(crate) struct PlannedDispatch {
    pub(crate) adapter: Arc<dyn ProviderAdapter>,
    pub(crate) provider: ProviderId,
    pub(crate) params: QueryParams,
    pub(crate) timeout: Duration,
    pub(crate) estimated: Cost,
}

/// Outcome of one provider dispatch attempt.
pub(crate) enum DispatchOutcome {
    Success {
        provider: ProviderId,
        results: Vec<SearchResult>,
        cost: Cost,
    },
    Excluded {
        provider: ProviderId,
        reason: ExclusionReason,
    },
    Failed {
        provider: ProviderId,
        message: String,
    },
}

/// What the router hands to the merger.
#[derive(Debug)]
pub struct RouteOutcome {
    /// Raw result sets per contributing provider, in dispatch order.
    pub results_by_provider: Vec<(ProviderId, Vec<SearchResult>)>,
    /// Providers that contributed at least an empty success.
    pub providers_used: Vec<ProviderId>,
    /// Sum of estimated costs across successful dispatches.
    pub total_cost: Cost,
    /// Providers considered but excluded, with the gate that said no.
    pub excluded: Vec<(ProviderId, ExclusionReason)>,
    /// The strategy that actually ran.
    pub strategy: StrategyKind,
}

/// A scored candidate ready for strategy execution.
struct Candidate {
    adapter: Arc<dyn ProviderAdapter>,
    provider: ProviderId,
    score: f64,
    quality_weight: f64,
    preferred: bool,
    estimated: Cost,
}

/// Orchestrates scoring, admission control, and strategy execution.
pub struct UnifiedRouter {
    registry: Arc<ProviderRegistry>,
    admission: Arc<AdmissionControl>,
    scorers: Vec<Box<dyn ProviderScorer>>,
    config: Arc<SearchMuxConfig>,
}

impl UnifiedRouter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        admission: Arc<AdmissionControl>,
        scorers: Vec<Box<dyn ProviderScorer>>,
        config: Arc<SearchMuxConfig>,
    ) -> Self {
        Self {
            registry,
            admission,
            scorers,
            config,
        }
    }

    /// Route one query: select candidates, choose a strategy, execute,
    /// collect.
    pub async fn route(&self, query: &SearchQuery, features: &QueryFeatures) -> Result<RouteOutcome> {
        let mut excluded: Vec<(ProviderId, ExclusionReason)> = Vec::new();
        let candidates = self.select_candidates(query, features, &mut excluded);

        let planned = self.plan(query, features, candidates, &mut excluded);
        if planned.is_empty() {
            return Err(classify_empty(excluded));
        }

        let strategy = choose_strategy(query, features, planned.len(), &self.config);
        tracing::debug!(
            strategy = ?strategy,
            candidates = planned.len(),
            complexity = features.complexity,
            "executing strategy"
        );

        let outcomes = match strategy {
            StrategyKind::Parallel => parallel::execute(Arc::clone(&self.admission), planned).await,
            StrategyKind::Cascade => {
                cascade::execute(
                    Arc::clone(&self.admission),
                    planned,
                    self.config.router.cascade_adequacy,
                )
                .await
            }
        };

        let mut results_by_provider: Vec<(ProviderId, Vec<SearchResult>)> = Vec::new();
        let mut providers_used: Vec<ProviderId> = Vec::new();
        let mut total_cost = Cost::ZERO;
        let mut failures: Vec<String> = Vec::new();

        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Success {
                    provider,
                    results,
                    cost,
                } => {
                    tracing::debug!(%provider, count = results.len(), "provider returned results");
                    providers_used.push(provider.clone());
                    total_cost = total_cost.saturating_add(cost);
                    results_by_provider.push((provider, results));
                }
                DispatchOutcome::Excluded { provider, reason } => {
                    excluded.push((provider, reason));
                }
                DispatchOutcome::Failed { provider, message } => {
                    tracing::warn!(%provider, error = %message, "provider dispatch failed");
                    failures.push(format!("{provider}: {message}"));
                    excluded.push((provider, ExclusionReason::Failed));
                }
            }
        }

        if results_by_provider.is_empty() {
            if !failures.is_empty() {
                return Err(SearchError::AllProvidersFailed(failures.join("; ")));
            }
            return Err(classify_empty(excluded));
        }

        Ok(RouteOutcome {
            results_by_provider,
            providers_used,
            total_cost,
            excluded,
            strategy,
        })
    }

    /// Score and order the candidate set.
    ///
    /// An explicit provider list is honoured outright (no score floor,
    /// no top-K cut) but still passes admission control at dispatch.
    fn select_candidates(
        &self,
        query: &SearchQuery,
        features: &QueryFeatures,
        excluded: &mut Vec<(ProviderId, ExclusionReason)>,
    ) -> Vec<Candidate> {
        let explicit = query.providers.is_some();
        let ids: Vec<ProviderId> = match &query.providers {
            Some(providers) => providers.clone(),
            None => self.registry.ids(),
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for id in ids {
            let Some(adapter) = self.registry.get(&id) else {
                excluded.push((id, ExclusionReason::NotRegistered));
                continue;
            };
            let provider_config = self.config.provider(&id);
            if !provider_config.enabled {
                excluded.push((id, ExclusionReason::Disabled));
                continue;
            }

            let estimated = adapter.estimate_cost(query);
            let capabilities = adapter.capabilities();
            let status = self.admission.status(&id);
            let ctx = ScoringContext {
                provider: &id,
                config: &provider_config,
                capabilities: &capabilities,
                status: &status,
                estimated_cost: estimated,
            };
            let external = query.hints.external_scores.get(&id).copied();
            let score = select_score(&self.scorers, features, &ctx, external);
            tracing::trace!(provider = %id, score = score.score, confidence = score.confidence, "provider scored");

            if !explicit && score.score < self.config.router.min_score {
                excluded.push((id, ExclusionReason::BelowMinScore));
                continue;
            }

            candidates.push(Candidate {
                adapter,
                preferred: query.hints.prefer.contains(&id),
                provider: id,
                score: score.score,
                quality_weight: provider_config.quality_weight,
                estimated,
            });
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.preferred.cmp(&a.preferred))
                .then_with(|| {
                    b.quality_weight
                        .partial_cmp(&a.quality_weight)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.provider.cmp(&b.provider))
        });

        if !explicit {
            while candidates.len() > self.config.router.max_candidates {
                if let Some(dropped) = candidates.pop() {
                    excluded.push((dropped.provider, ExclusionReason::BelowMinScore));
                }
            }
        }
        candidates
    }

    /// Turn candidates into dispatch plans, applying the query budget
    /// ceiling and per-adapter result caps.
    fn plan(
        &self,
        query: &SearchQuery,
        features: &QueryFeatures,
        candidates: Vec<Candidate>,
        excluded: &mut Vec<(ProviderId, ExclusionReason)>,
    ) -> Vec<PlannedDispatch> {
        let timeout = query
            .timeout
            .unwrap_or_else(|| self.config.provider_timeout(features.complexity));
        let max_results = query.max_results.unwrap_or(self.config.default_max_results);
        let mut remaining_budget = query.budget;

        let mut planned = Vec::new();
        for candidate in candidates {
            if let Some(remaining) = remaining_budget {
                if candidate.estimated > remaining {
                    tracing::debug!(provider = %candidate.provider, %remaining, "query budget exhausted");
                    excluded.push((candidate.provider, ExclusionReason::OverBudget));
                    continue;
                }
                remaining_budget = Some(remaining.saturating_sub(candidate.estimated));
            }

            let capabilities = candidate.adapter.capabilities();
            let params = QueryParams {
                text: query.text.trim().to_string(),
                max_results: max_results.min(capabilities.max_results_per_query),
                content_type: query.content_type.or_else(|| {
                    (features.content_type != crate::types::ContentType::Mixed)
                        .then_some(features.content_type)
                }),
            };
            planned.push(PlannedDispatch {
                adapter: candidate.adapter,
                provider: candidate.provider,
                params,
                timeout,
                estimated: candidate.estimated,
            });
        }
        planned
    }
}

/// Pick a strategy when the query does not name one: parallel for
/// low-complexity queries or small candidate sets, cascade when cost
/// control matters more than latency.
fn choose_strategy(
    query: &SearchQuery,
    features: &QueryFeatures,
    candidate_count: usize,
    config: &SearchMuxConfig,
) -> StrategyKind {
    if let Some(strategy) = query.strategy {
        return strategy;
    }
    if candidate_count <= 2 || features.complexity < config.router.cascade_complexity_floor {
        StrategyKind::Parallel
    } else {
        StrategyKind::Cascade
    }
}

/// Map an all-excluded candidate set to the most specific error.
fn classify_empty(excluded: Vec<(ProviderId, ExclusionReason)>) -> SearchError {
    if excluded.is_empty() {
        return SearchError::NoProvidersAvailable { tried: excluded };
    }
    let summary = || {
        excluded
            .iter()
            .map(|(id, reason)| format!("{id} ({})", reason.label()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    if excluded
        .iter()
        .all(|(_, reason)| *reason == ExclusionReason::OverBudget)
    {
        return SearchError::BudgetExhausted(summary());
    }
    if excluded.iter().all(|(_, reason)| {
        matches!(
            reason,
            ExclusionReason::RateLimited | ExclusionReason::CircuitOpen
        )
    }) {
        return SearchError::AllRateLimited(summary());
    }
    SearchError::NoProvidersAvailable { tried: excluded }
}

/// Run one admitted dispatch under its timeout, reporting the outcome to
/// admission control exactly once.
pub(crate) async fn dispatch_one(
    admission: Arc<AdmissionControl>,
    planned: PlannedDispatch,
) -> DispatchOutcome {
    let ticket = match admission.admit(&planned.provider, planned.estimated) {
        Ok(ticket) => ticket,
        Err(reason) => {
            tracing::debug!(provider = %planned.provider, reason = reason.label(), "admission denied");
            return DispatchOutcome::Excluded {
                provider: planned.provider,
                reason,
            };
        }
    };

    let attempt = planned.adapter.search(&planned.params, planned.timeout);
    match tokio::time::timeout(planned.timeout, attempt).await {
        Ok(Ok(results)) => {
            admission.on_success(ticket, planned.estimated);
            DispatchOutcome::Success {
                provider: planned.provider,
                results,
                cost: planned.estimated,
            }
        }
        Ok(Err(err)) => {
            admission.on_failure(ticket);
            DispatchOutcome::Failed {
                provider: planned.provider,
                message: err.to_string(),
            }
        }
        Err(_) => {
            admission.on_failure(ticket);
            DispatchOutcome::Failed {
                provider: planned.provider,
                message: format!("timed out after {}ms", planned.timeout.as_millis()),
            }
        }
    }
}
