//! Query feature extraction: content-type classification, complexity,
//! keywords, ambiguity signals.
//!
//! [`analyze`] is a total, side-effect-free function. It never fails:
//! empty or unclassifiable input yields a low-complexity
//! [`ContentType::Mixed`] result rather than an error. Classification is
//! weighted keyword/pattern matching; ties fall back to `Mixed` instead
//! of picking an arbitrary winner.

use serde::{Deserialize, Serialize};

use crate::types::ContentType;

/// Weighted patterns per content type. Multi-word patterns match as
/// substrings of the lowercased query; single words match whole tokens.
const PATTERNS: &[(ContentType, &[(&str, f64)])] = &[
    (
        ContentType::Factual,
        &[
            ("what is", 2.0),
            ("who is", 2.0),
            ("when did", 2.0),
            ("where is", 2.0),
            ("define", 1.5),
            ("definition", 1.5),
            ("meaning", 1.0),
            ("fact", 1.0),
        ],
    ),
    (
        ContentType::Academic,
        &[
            ("research", 1.5),
            ("paper", 1.0),
            ("study", 1.0),
            ("journal", 1.5),
            ("peer-reviewed", 2.0),
            ("peer reviewed", 2.0),
            ("citation", 1.5),
            ("doi", 2.0),
            ("thesis", 1.5),
            ("arxiv", 2.0),
        ],
    ),
    (
        ContentType::Technical,
        &[
            ("error", 1.5),
            ("code", 1.0),
            ("api", 1.5),
            ("debug", 1.5),
            ("install", 1.0),
            ("compile", 1.5),
            ("library", 1.0),
            ("framework", 1.0),
            ("stack trace", 2.0),
            ("documentation", 1.0),
            ("github", 1.5),
            ("implementation", 1.0),
        ],
    ),
    (
        ContentType::News,
        &[
            ("latest", 1.5),
            ("today", 1.5),
            ("breaking", 2.0),
            ("news", 2.0),
            ("announcement", 1.5),
            ("update", 1.0),
            ("yesterday", 1.5),
            ("this week", 1.5),
        ],
    ),
    (
        ContentType::Commercial,
        &[
            ("buy", 2.0),
            ("price", 1.5),
            ("cheap", 1.5),
            ("cheapest", 1.5),
            ("deal", 1.0),
            ("discount", 1.5),
            ("review", 1.0),
            ("best", 0.5),
            ("shop", 1.5),
            ("cost", 1.0),
        ],
    ),
    (
        ContentType::Educational,
        &[
            ("how to", 2.0),
            ("tutorial", 2.0),
            ("learn", 1.5),
            ("guide", 1.5),
            ("course", 1.5),
            ("explain", 1.5),
            ("beginner", 1.5),
            ("introduction", 1.0),
            ("example", 0.5),
            ("step by step", 2.0),
        ],
    ),
];

/// Words carrying no topical signal, excluded from the keyword set.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "that", "the", "to", "was", "what", "when", "where", "which", "who", "why", "with",
];

/// Conjunctions and comparison markers signalling multiple intents.
const MULTI_INTENT_MARKERS: &[&str] = &["and", "or", "vs", "versus", "compare", "compared"];

/// Question-opening words, counted for syntactic ambiguity.
const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "which", "who"];

/// Two candidate content types within this margin of each other are a tie.
const TIE_MARGIN: f64 = 0.25;

/// Syntactic and semantic ambiguity markers detected in a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguitySignals {
    /// Conjunctions or comparison markers suggest more than one intent.
    pub multi_intent: bool,
    /// More than one question form in a single query.
    pub multiple_questions: bool,
    /// Keywords span two or more content domains.
    pub cross_domain: bool,
}

/// Features derived from a query's text. Computed once per query and
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFeatures {
    /// Content-type classification; `Mixed` when no clear winner.
    pub content_type: ContentType,
    /// Complexity score in [0,1].
    pub complexity: f64,
    /// Topical keywords, lowercased, stopwords removed, order preserved.
    pub keywords: Vec<String>,
    /// Ambiguity markers detected in the text.
    pub ambiguity: AmbiguitySignals,
}

/// Analyse a query's text into [`QueryFeatures`].
///
/// Deterministic for identical input. Complexity combines query length,
/// multi-intent conjunctions, cross-domain keyword co-occurrence, and
/// repeated question forms, clamped to [0,1].
pub fn analyze(text: &str) -> QueryFeatures {
    let lowered = text.trim().to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|t| !t.is_empty())
        .collect();

    let keywords = extract_keywords(&tokens);
    let domain_scores = score_domains(&lowered, &tokens);
    let content_type = classify(&domain_scores);

    let domains_hit = domain_scores.iter().filter(|(_, s)| *s > 0.0).count();
    let multi_intent = count_multi_intent(&lowered, &tokens) > 0;
    let question_count = count_question_forms(&lowered, &tokens);

    let ambiguity = AmbiguitySignals {
        multi_intent,
        multiple_questions: question_count > 1,
        cross_domain: domains_hit >= 2,
    };

    let complexity = complexity_score(
        tokens.len(),
        count_multi_intent(&lowered, &tokens),
        domains_hit,
        question_count,
    );

    QueryFeatures {
        content_type,
        complexity,
        keywords,
        ambiguity,
    }
}

fn extract_keywords(tokens: &[&str]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokens
        .iter()
        .filter(|t| !STOPWORDS.contains(t) && t.len() > 1)
        .filter(|t| seen.insert(t.to_string()))
        .map(|t| t.to_string())
        .collect()
}

/// Accumulate weighted pattern hits per content type.
fn score_domains(lowered: &str, tokens: &[&str]) -> Vec<(ContentType, f64)> {
    PATTERNS
        .iter()
        .map(|(content_type, patterns)| {
            let score = patterns
                .iter()
                .filter(|(pattern, _)| {
                    if pattern.contains(' ') {
                        lowered.contains(pattern)
                    } else {
                        tokens.contains(pattern)
                    }
                })
                .map(|(_, weight)| weight)
                .sum();
            (*content_type, score)
        })
        .collect()
}

/// Pick the winning content type, or `Mixed` on a tie or no signal.
fn classify(domain_scores: &[(ContentType, f64)]) -> ContentType {
    let mut sorted: Vec<&(ContentType, f64)> = domain_scores.iter().collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    match sorted.as_slice() {
        [] => ContentType::Mixed,
        [(winner, top), rest @ ..] => {
            if *top <= 0.0 {
                return ContentType::Mixed;
            }
            if let Some((_, runner_up)) = rest.first() {
                if top - runner_up < TIE_MARGIN {
                    return ContentType::Mixed;
                }
            }
            *winner
        }
    }
}

fn count_multi_intent(lowered: &str, tokens: &[&str]) -> usize {
    let marker_hits = tokens
        .iter()
        .filter(|t| MULTI_INTENT_MARKERS.contains(t))
        .count();
    let punctuation_hits = lowered.matches([',', ';']).count();
    marker_hits + punctuation_hits
}

fn count_question_forms(lowered: &str, tokens: &[&str]) -> usize {
    let word_hits = tokens
        .iter()
        .filter(|t| QUESTION_WORDS.contains(t))
        .count();
    let mark_hits = lowered.matches('?').count();
    word_hits.max(mark_hits)
}

/// Combine the four complexity signals into a clamped [0,1] score.
fn complexity_score(
    word_count: usize,
    multi_intent_count: usize,
    domains_hit: usize,
    question_count: usize,
) -> f64 {
    let length = (word_count as f64 / 20.0).min(1.0) * 0.3;
    let intents = (multi_intent_count as f64 / 3.0).min(1.0) * 0.25;
    let cross_domain = if domains_hit >= 2 {
        ((domains_hit - 1) as f64 / 3.0).min(1.0) * 0.25
    } else {
        0.0
    };
    let questions = if question_count >= 2 {
        ((question_count - 1) as f64 / 2.0).min(1.0) * 0.2
    } else {
        0.0
    };
    (length + intents + cross_domain + questions).clamp(0.0, 1.0)
}
