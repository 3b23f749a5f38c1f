//! Relevance scoring helpers shared by every tier
//!
//! Tokenization, token-overlap content scoring, word-set similarity and
//! the small decay curves the tiers build on.

use std::collections::{BTreeSet, HashSet};

use crate::memory::types::NodeId;

/// Results at or below this score are dropped from searches
pub const MIN_RELEVANCE: f32 = 0.1;

/// Clamp a score into the unit interval, mapping NaN to zero
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Lowercased alphanumeric tokens of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Distinct tokens of `text`
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// A search query, tokenized once and shared across nodes
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub tokens: Vec<String>,
}

impl Query {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            tokens: tokenize(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Fraction of query tokens that appear in `values` (case-insensitive,
    /// substring match either way)
    pub fn match_fraction<'a, I>(&self, values: I) -> f32
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.is_empty() {
            return 0.0;
        }
        let values: Vec<String> = values.into_iter().map(|v| v.to_lowercase()).collect();
        if values.is_empty() {
            return 0.0;
        }
        let hits = self
            .tokens
            .iter()
            .filter(|t| values.iter().any(|v| v.contains(t.as_str()) || t.contains(v.as_str())))
            .count();
        hits as f32 / self.tokens.len() as f32
    }

    /// True if any query token matches `value` (case-insensitive substring)
    pub fn mentions(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        !value.is_empty()
            && self
                .tokens
                .iter()
                .any(|t| value.contains(t.as_str()) || t.contains(value.as_str()))
    }
}

/// Token-overlap score between a query and node content.
///
/// Each query token earns 2 for an exact token match, otherwise 1 if some
/// content token contains it; the sum is normalized by `2 * query_tokens`.
pub fn content_score(query: &Query, content: &str) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let content_tokens = tokenize(content);
    if content_tokens.is_empty() {
        return 0.0;
    }

    let points: usize = query
        .tokens
        .iter()
        .map(|q| {
            if content_tokens.iter().any(|c| c == q) {
                2
            } else if content_tokens.iter().any(|c| c.contains(q.as_str())) {
                1
            } else {
                0
            }
        })
        .sum();

    clamp_unit(points as f32 / (2 * query.tokens.len()) as f32)
}

/// Jaccard similarity of the word sets of two texts
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    let a = word_set(a);
    let b = word_set(b);
    set_jaccard(&a, &b)
}

fn set_jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

/// Shared connections over all connections of two nodes
pub fn shared_connection_ratio(a: &BTreeSet<NodeId>, b: &BTreeSet<NodeId>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f32 / union as f32
}

/// Linear decay from 1.0 at age zero to `floor` at `window_days`
pub fn linear_decay(age_days: f32, window_days: f32, floor: f32) -> f32 {
    (1.0 - age_days / window_days).max(floor)
}
