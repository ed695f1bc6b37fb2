//! Query fingerprinting for the response cache.
//!
//! A fingerprint identifies semantically equivalent queries: the text is
//! normalised, the explicit provider set is order-independent, and
//! volatile per-request fields (budget, timeout, hints, request ids)
//! never participate. blake3 keeps the hash stable across processes, so
//! the distributed tier is shared correctly between instances.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SearchQuery;

/// Stable cache key for one logical query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The hex digest, usable directly as a distributed-store key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint for a query.
///
/// Participating fields: normalised query text (trimmed, lowercased,
/// whitespace collapsed), the explicit provider list sorted (absence and
/// emptiness both hash as "any"), the resolved max-results, and the
/// content-type hint. Fields are length-prefixed so adjacent values
/// cannot run into each other.
pub fn fingerprint(query: &SearchQuery, default_max_results: usize) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();

    feed(&mut hasher, &normalise_text(&query.text));

    match &query.providers {
        Some(providers) if !providers.is_empty() => {
            let mut sorted: Vec<&str> = providers.iter().map(|p| p.as_str()).collect();
            sorted.sort_unstable();
            sorted.dedup();
            for provider in sorted {
                feed(&mut hasher, provider);
            }
        }
        _ => feed(&mut hasher, "*"),
    }

    let max_results = query.max_results.unwrap_or(default_max_results);
    feed(&mut hasher, &max_results.to_string());

    match query.content_type {
        Some(content_type) => feed(&mut hasher, content_type.as_str()),
        None => feed(&mut hasher, "-"),
    }

    Fingerprint(hasher.finalize().to_hex().to_string())
}

fn feed(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// Trim, lowercase, and collapse internal whitespace runs.
fn normalise_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, Cost, ProviderId};
    use std::time::Duration;

    #[test]
    fn identical_queries_collide() {
        let a = fingerprint(&SearchQuery::new("rust async"), 10);
        let b = fingerprint(&SearchQuery::new("rust async"), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn text_normalisation_collapses_case_and_whitespace() {
        let a = fingerprint(&SearchQuery::new("  Rust   ASYNC "), 10);
        let b = fingerprint(&SearchQuery::new("rust async"), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_differs() {
        let a = fingerprint(&SearchQuery::new("rust"), 10);
        let b = fingerprint(&SearchQuery::new("go"), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn provider_order_is_irrelevant() {
        let a = fingerprint(
            &SearchQuery {
                providers: Some(vec![ProviderId::new("brave"), ProviderId::new("exa")]),
                ..SearchQuery::new("q")
            },
            10,
        );
        let b = fingerprint(
            &SearchQuery {
                providers: Some(vec![ProviderId::new("exa"), ProviderId::new("brave")]),
                ..SearchQuery::new("q")
            },
            10,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn provider_set_participates() {
        let a = fingerprint(
            &SearchQuery {
                providers: Some(vec![ProviderId::new("brave")]),
                ..SearchQuery::new("q")
            },
            10,
        );
        let b = fingerprint(&SearchQuery::new("q"), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn max_results_participates() {
        let a = fingerprint(
            &SearchQuery {
                max_results: Some(5),
                ..SearchQuery::new("q")
            },
            10,
        );
        let b = fingerprint(&SearchQuery::new("q"), 10);
        assert_ne!(a, b);

        // Explicit value equal to the default collides with the default.
        let c = fingerprint(
            &SearchQuery {
                max_results: Some(10),
                ..SearchQuery::new("q")
            },
            10,
        );
        assert_eq!(b, c);
    }

    #[test]
    fn content_type_hint_participates() {
        let a = fingerprint(
            &SearchQuery {
                content_type: Some(ContentType::News),
                ..SearchQuery::new("q")
            },
            10,
        );
        let b = fingerprint(&SearchQuery::new("q"), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn volatile_fields_do_not_participate() {
        let plain = fingerprint(&SearchQuery::new("q"), 10);
        let with_volatile = fingerprint(
            &SearchQuery {
                budget: Some(Cost::from_cents(3)),
                timeout: Some(Duration::from_secs(2)),
                ..SearchQuery::new("q")
            },
            10,
        );
        assert_eq!(plain, with_volatile);
    }

    #[test]
    fn digest_is_hex_and_stable_length() {
        let fp = fingerprint(&SearchQuery::new("q"), 10);
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.to_string(), fp.as_str());
    }
}
