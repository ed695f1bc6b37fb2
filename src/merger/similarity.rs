//! Similarity measures for near-duplicate detection.
//!
//! Two signals, each with its own configurable threshold:
//!
//! - [`string_similarity`]: edit-distance-based ratio over characters,
//!   for short fields (canonical URL, title).
//! - [`ngram_cosine`]: vector-space cosine over character trigrams, for
//!   longer text (snippet, full content) where word order and small
//!   edits should matter less.

use std::collections::HashMap;

use similar::TextDiff;

/// Edit-based similarity of two strings in [0,1]. 1.0 means identical.
///
/// Case-insensitive; empty inputs compare as identical only to other
/// empty inputs.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    f64::from(TextDiff::from_chars(a.as_str(), b.as_str()).ratio())
}

/// Cosine similarity of character-trigram frequency vectors, in [0,1].
///
/// Text is lowercased and non-alphanumeric runs collapse to single
/// spaces before trigram extraction, so punctuation and whitespace
/// differences do not register. Inputs shorter than one trigram fall
/// back to exact comparison.
pub fn ngram_cosine(a: &str, b: &str) -> f64 {
    let a_grams = trigram_counts(a);
    let b_grams = trigram_counts(b);

    if a_grams.is_empty() || b_grams.is_empty() {
        let a_norm = normalise(a);
        let b_norm = normalise(b);
        return if !a_norm.is_empty() && a_norm == b_norm {
            1.0
        } else {
            0.0
        };
    }

    let dot: f64 = a_grams
        .iter()
        .filter_map(|(gram, count)| b_grams.get(gram).map(|other| f64::from(*count) * f64::from(*other)))
        .sum();
    let a_norm: f64 = a_grams.values().map(|c| f64::from(*c).powi(2)).sum::<f64>().sqrt();
    let b_norm: f64 = b_grams.values().map(|c| f64::from(*c).powi(2)).sum::<f64>().sqrt();

    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    (dot / (a_norm * b_norm)).clamp(0.0, 1.0)
}

fn normalise(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn trigram_counts(text: &str) -> HashMap<String, u32> {
    let normalised = normalise(text);
    let chars: Vec<char> = normalised.chars().collect();
    let mut counts = HashMap::new();
    for window in chars.windows(3) {
        let gram: String = window.iter().collect();
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}
