//! Provider scoring: which providers fit a query, and how well.
//!
//! Scorers are pluggable. The router runs every registered scorer and
//! keeps the highest-confidence result, falling back to
//! [`DefaultScorer`] when a scorer errors. An externally supplied score
//! (for example from a secondary reasoning step, carried in the query's
//! routing hints) is blended with the chosen score via a
//! confidence-weighted average.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::{CircuitState, ProviderStatus};
use crate::analyzer::QueryFeatures;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::provider::ProviderCapabilities;
use crate::types::{ContentType, Cost, ExternalScore, ProviderId};

/// Recommended role for a provider in the chosen execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionRole {
    /// Dispatch first (or among the first).
    Primary,
    /// Dispatch only when primaries fall short.
    Fallback,
}

/// A scorer's verdict for one (query, provider) pair. Ephemeral —
/// produced per query and consumed immediately by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: ProviderId,
    /// Fit in [0,1].
    pub score: f64,
    /// Scorer's confidence in its own verdict, in [0,1].
    pub confidence: f64,
    /// Estimated dispatch cost, from the adapter.
    pub estimated_cost: Cost,
    /// Expected latency, from configuration.
    pub estimated_latency: Duration,
    pub role: ExecutionRole,
}

/// Everything a scorer may consult about one provider.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub provider: &'a ProviderId,
    pub config: &'a ProviderConfig,
    pub capabilities: &'a ProviderCapabilities,
    pub status: &'a ProviderStatus,
    pub estimated_cost: Cost,
}

/// A pluggable scoring strategy.
pub trait ProviderScorer: Send + Sync {
    /// Name used in logs when this scorer errors or wins selection.
    fn name(&self) -> &'static str;

    /// Score one provider for one query.
    ///
    /// # Errors
    ///
    /// A scorer may fail (for example when it depends on state that is
    /// unavailable); the router logs the failure and falls back to the
    /// default scorer.
    fn score(&self, features: &QueryFeatures, ctx: &ScoringContext<'_>) -> Result<ProviderScore>;
}

/// Score at or above which a provider is recommended as primary.
const PRIMARY_FLOOR: f64 = 0.5;

/// Default scorer: content-type affinity, static quality weight, and
/// health recency, weighted 50/25/25.
#[derive(Debug, Default)]
pub struct DefaultScorer;

impl DefaultScorer {
    fn affinity(&self, content_type: ContentType, ctx: &ScoringContext<'_>) -> (f64, bool) {
        if let Some(weight) = ctx.config.affinity.get(&content_type) {
            return (*weight, true);
        }
        let covered = ctx.capabilities.content_types.contains(&content_type)
            || ctx.capabilities.content_types.contains(&ContentType::Mixed);
        if covered {
            (ctx.config.default_affinity, false)
        } else {
            (ctx.config.default_affinity * 0.5, false)
        }
    }

    fn health(&self, status: &ProviderStatus) -> f64 {
        match status.circuit.state {
            CircuitState::Closed => {
                (1.0 - 0.1 * f64::from(status.circuit.consecutive_failures)).max(0.5)
            }
            CircuitState::HalfOpen => 0.5,
            CircuitState::Open => 0.0,
        }
    }
}

impl DefaultScorer {
    /// The default scoring formula. Total — the trait method wraps it.
    pub fn evaluate(&self, features: &QueryFeatures, ctx: &ScoringContext<'_>) -> ProviderScore {
        let (affinity, explicit) = self.affinity(features.content_type, ctx);
        let quality = (ctx.config.quality_weight / 2.0).min(1.0);
        let health = self.health(ctx.status);

        let score = (0.5 * affinity + 0.25 * quality + 0.25 * health).clamp(0.0, 1.0);
        let confidence = if explicit { 0.9 } else { 0.6 };

        ProviderScore {
            provider: ctx.provider.clone(),
            score,
            confidence,
            estimated_cost: ctx.estimated_cost,
            estimated_latency: Duration::from_millis(ctx.config.typical_latency_ms),
            role: if score >= PRIMARY_FLOOR {
                ExecutionRole::Primary
            } else {
                ExecutionRole::Fallback
            },
        }
    }
}

impl ProviderScorer for DefaultScorer {
    fn name(&self) -> &'static str {
        "default"
    }

    fn score(&self, features: &QueryFeatures, ctx: &ScoringContext<'_>) -> Result<ProviderScore> {
        Ok(self.evaluate(features, ctx))
    }
}

/// Blend an externally supplied score into a scorer's verdict using a
/// confidence-weighted average. Zero total confidence falls back to a
/// plain mean.
pub fn blend_external(base: &ProviderScore, external: ExternalScore) -> ProviderScore {
    let total = base.confidence + external.confidence;
    let score = if total > 0.0 {
        (base.score * base.confidence + external.score * external.confidence) / total
    } else {
        (base.score + external.score) / 2.0
    };
    let confidence = ((base.confidence + external.confidence) / 2.0).clamp(0.0, 1.0);
    ProviderScore {
        score: score.clamp(0.0, 1.0),
        confidence,
        role: if score >= PRIMARY_FLOOR {
            ExecutionRole::Primary
        } else {
            ExecutionRole::Fallback
        },
        ..base.clone()
    }
}

/// Run every scorer and keep the highest-confidence verdict.
///
/// Scorer errors are logged and skipped; when every registered scorer
/// fails, the default scorer decides (it is infallible). An external
/// score, when present, is blended into the winner.
pub fn select_score(
    scorers: &[Box<dyn ProviderScorer>],
    features: &QueryFeatures,
    ctx: &ScoringContext<'_>,
    external: Option<ExternalScore>,
) -> ProviderScore {
    let mut best: Option<ProviderScore> = None;
    for scorer in scorers {
        match scorer.score(features, ctx) {
            Ok(candidate) => {
                let better = best.as_ref().is_none_or(|current| {
                    candidate.confidence > current.confidence
                        || (candidate.confidence == current.confidence
                            && candidate.score > current.score)
                });
                if better {
                    best = Some(candidate);
                }
            }
            Err(err) => {
                tracing::warn!(scorer = scorer.name(), provider = %ctx.provider, error = %err, "scorer failed");
            }
        }
    }

    let chosen = best.unwrap_or_else(|| DefaultScorer.evaluate(features, ctx));

    match external {
        Some(external) => blend_external(&chosen, external),
        None => chosen,
    }
}
