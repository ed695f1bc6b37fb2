//! Result merging: normalise, deduplicate, rank, truncate.
//!
//! Takes the raw per-provider result sets the router collected and
//! produces one ordered list. Provider-local scores are first brought
//! onto a comparable [0,1] scale, duplicates are merged (exact pass then
//! near-duplicate pass), and the survivors are ranked by
//! `quality_weight * score + consensus_boost - recency_penalty` with a
//! deterministic tie-break chain. No I/O, no side effects.

pub mod dedup;
pub mod similarity;
pub mod url_normalize;

use std::collections::HashMap;

use chrono::Utc;

use crate::config::MergerConfig;
use crate::types::{ContentType, MergedResult, ProviderId, SearchResult};

use dedup::{deduplicate, DedupedResult};

/// Merge per-provider result sets into one ranked list of at most
/// `max_results` entries.
///
/// `quality_weights` supplies the static per-provider quality weight
/// (missing providers default to 1.0). `content_type` drives the
/// recency penalty, which applies only to time-sensitive content.
///
/// Output is deterministic for identical inputs regardless of the order
/// providers are listed in: ties are broken by quality weight, then
/// provider-reported score, then canonical URL.
pub fn merge(
    results_by_provider: Vec<(ProviderId, Vec<SearchResult>)>,
    max_results: usize,
    content_type: ContentType,
    quality_weights: &HashMap<ProviderId, f64>,
    config: &MergerConfig,
) -> Vec<MergedResult> {
    // Bring every provider's scores onto [0,1] before mixing them.
    let mut all: Vec<SearchResult> = Vec::new();
    for (provider, mut results) in results_by_provider {
        normalise_scores(&mut results);
        tracing::trace!(%provider, count = results.len(), "provider results normalised");
        all.extend(results);
    }

    let deduped = deduplicate(all, config);
    tracing::debug!(count = deduped.len(), "results after deduplication");

    let mut scored: Vec<(DedupedResult, f64)> = deduped
        .into_iter()
        .map(|entry| {
            let score = final_score(&entry, content_type, quality_weights, config);
            (entry, score)
        })
        .collect();

    scored.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let a_weight = best_weight(&a.sources, quality_weights);
                let b_weight = best_weight(&b.sources, quality_weights);
                b_weight
                    .partial_cmp(&a_weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                b.result
                    .score
                    .partial_cmp(&a.result.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.canonical.cmp(&b.canonical))
    });

    scored.truncate(max_results);

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (entry, score))| MergedResult {
            consensus: entry.sources.len(),
            sources: entry.sources.clone(),
            rank: index + 1,
            final_score: score,
            result: entry.result,
        })
        .collect()
}

/// Normalise one provider's scores onto [0,1].
///
/// Providers that do not score their results (all zeros) get position
/// decay: the first result scores 1.0, later ones progressively less.
/// Providers with their own scale are divided by their maximum.
fn normalise_scores(results: &mut [SearchResult]) {
    let max = results.iter().map(|r| r.score).fold(0.0_f64, f64::max);
    if max <= 0.0 {
        for (position, result) in results.iter_mut().enumerate() {
            result.score = 1.0 / (1.0 + position as f64 * 0.1);
        }
    } else {
        for result in results.iter_mut() {
            result.score = (result.score.max(0.0) / max).clamp(0.0, 1.0);
        }
    }
}

/// Highest quality weight among the providers that returned this result.
/// Consensus from a strong provider should never rank below the same
/// result attributed to a weak one.
fn best_weight(sources: &[ProviderId], quality_weights: &HashMap<ProviderId, f64>) -> f64 {
    sources
        .iter()
        .map(|id| quality_weights.get(id).copied().unwrap_or(1.0))
        .fold(None, |best: Option<f64>, weight| {
            Some(best.map_or(weight, |b| b.max(weight)))
        })
        .unwrap_or(1.0)
}

fn final_score(
    entry: &DedupedResult,
    content_type: ContentType,
    quality_weights: &HashMap<ProviderId, f64>,
    config: &MergerConfig,
) -> f64 {
    let weight = best_weight(&entry.sources, quality_weights);
    let consensus_bonus = config.consensus_boost * (entry.sources.len().saturating_sub(1)) as f64;
    let penalty = recency_penalty(entry, content_type, config);
    weight * entry.result.score + consensus_bonus - penalty
}

/// Age penalty for time-sensitive content. Results without a timestamp
/// are not penalised.
fn recency_penalty(entry: &DedupedResult, content_type: ContentType, config: &MergerConfig) -> f64 {
    if content_type != ContentType::News {
        return 0.0;
    }
    let Some(published) = entry.result.published else {
        return 0.0;
    };
    let age_days = (Utc::now() - published).num_days().max(0) as f64;
    (age_days * config.recency_penalty_per_day).min(config.max_recency_penalty)
}
