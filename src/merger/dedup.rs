//! Two-pass result deduplication.
//!
//! Pass 1 is exact: results sharing a canonical URL merge into the first
//! occurrence. Pass 2 catches near-duplicates among the survivors using
//! fuzzy URL/title similarity and n-gram cosine similarity over
//! snippets; pairwise matches are united transitively (union-find)
//! within the pass. Merging never drops information — sources are
//! unioned, the highest provider-local score wins, metadata keys are
//! combined, and the longer snippet is kept.

use std::collections::HashMap;

use crate::config::MergerConfig;
use crate::types::{ProviderId, SearchResult};

use super::similarity::{ngram_cosine, string_similarity};
use super::url_normalize::canonical_url;

/// A result after deduplication, with every contributing provider.
#[derive(Debug, Clone)]
pub struct DedupedResult {
    /// The surviving result. Fields come from the first occurrence,
    /// enriched during merges.
    pub result: SearchResult,
    /// Canonical form of the result URL.
    pub canonical: String,
    /// All providers that returned an equivalent result, in first-seen
    /// order, without repeats.
    pub sources: Vec<ProviderId>,
}

impl DedupedResult {
    fn new(result: SearchResult) -> Self {
        let canonical = canonical_url(&result.url);
        let sources = vec![result.provider.clone()];
        Self {
            result,
            canonical,
            sources,
        }
    }

    /// Fold `other` into this entry.
    fn absorb(&mut self, other: &SearchResult) {
        if !self.sources.contains(&other.provider) {
            self.sources.push(other.provider.clone());
        }
        if other.score > self.result.score {
            self.result.score = other.score;
        }
        if other.snippet.len() > self.result.snippet.len() {
            self.result.snippet = other.snippet.clone();
        }
        if self.result.content.is_none() && other.content.is_some() {
            self.result.content = other.content.clone();
        }
        if self.result.published.is_none() {
            self.result.published = other.published;
        }
        for (key, value) in &other.metadata {
            self.result
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    fn absorb_group(&mut self, other: DedupedResult) {
        self.absorb(&other.result);
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
    }
}

/// Union-find over result indices, path-halving.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Union keeping the smaller index as root, so the first occurrence
    /// stays the representative.
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (keep, fold) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[fold] = keep;
    }
}

/// Deduplicate results: exact canonical-URL pass, then near-duplicate
/// pass. Output preserves first-seen order of the surviving entries.
pub fn deduplicate(results: Vec<SearchResult>, config: &MergerConfig) -> Vec<DedupedResult> {
    let exact = exact_pass(results);
    near_duplicate_pass(exact, config)
}

/// Pass 1: merge results sharing a canonical URL into the first
/// occurrence.
fn exact_pass(results: Vec<SearchResult>) -> Vec<DedupedResult> {
    let mut entries: Vec<DedupedResult> = Vec::new();
    let mut by_canonical: HashMap<String, usize> = HashMap::new();

    for result in results {
        let canonical = canonical_url(&result.url);
        match by_canonical.get(&canonical) {
            Some(&index) => entries[index].absorb(&result),
            None => {
                by_canonical.insert(canonical, entries.len());
                entries.push(DedupedResult::new(result));
            }
        }
    }
    entries
}

/// Pass 2: unite near-duplicates transitively and fold each group into
/// its first-seen representative.
fn near_duplicate_pass(entries: Vec<DedupedResult>, config: &MergerConfig) -> Vec<DedupedResult> {
    if entries.len() < 2 {
        return entries;
    }

    let mut set = DisjointSet::new(entries.len());
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if is_near_duplicate(&entries[i], &entries[j], config) {
                set.union(i, j);
            }
        }
    }

    let mut merged: Vec<Option<DedupedResult>> = entries.into_iter().map(Some).collect();
    let mut order: Vec<usize> = Vec::new();

    for index in 0..merged.len() {
        let root = set.find(index);
        if root == index {
            order.push(index);
            continue;
        }
        let Some(folded) = merged[index].take() else {
            continue;
        };
        if let Some(Some(representative)) = merged.get_mut(root).map(Option::as_mut) {
            representative.absorb_group(folded);
        }
    }

    order
        .into_iter()
        .filter_map(|index| merged[index].take())
        .collect()
}

/// Either similarity signal exceeding its threshold marks a pair as
/// near-duplicates.
fn is_near_duplicate(a: &DedupedResult, b: &DedupedResult, config: &MergerConfig) -> bool {
    if string_similarity(&a.canonical, &b.canonical) >= config.fuzzy_threshold {
        return true;
    }
    if string_similarity(&a.result.title, &b.result.title) >= config.fuzzy_threshold {
        return true;
    }
    let a_text = a.result.content.as_deref().unwrap_or(&a.result.snippet);
    let b_text = b.result.content.as_deref().unwrap_or(&b.result.snippet);
    if a_text.is_empty() || b_text.is_empty() {
        return false;
    }
    ngram_cosine(a_text, b_text) >= config.content_threshold
}
