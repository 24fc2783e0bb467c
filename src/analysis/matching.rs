//! Market matching: deciding whether two markets on different platforms
//! describe the same question.
//!
//! Two signals, in priority order:
//! 1. Manual mappings — a human-declared symmetric equivalence between
//!    two market ids. Always confidence 1.0. Symmetric but not
//!    transitive: (A,B) and (B,C) do not imply (A,C).
//! 2. Title text similarity — Jaccard overlap of normalized token sets.
//!
//! The tokenization and similarity function are a frozen contract:
//! lowercase, strip non-word characters, split on whitespace, drop the
//! stopword set below. Reimplementations must score identically.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use serde::Serialize;

use crate::schema::Market;

/// Common English words carrying no matching signal in market titles.
const STOPWORDS: &[&str] = &[
    "will", "the", "a", "an", "by", "in", "on", "to", "be", "is", "of",
];

/// How a match was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Manual,
    Text,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Manual => f.write_str("manual"),
            MatchKind::Text => f.write_str("text"),
        }
    }
}

/// Result of matching a target market against one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub market_a: Market,
    pub market_b: Market,
    /// 0.0 to 1.0.
    pub confidence: f64,
    #[serde(rename = "match_type")]
    pub kind: MatchKind,
}

/// Normalize a title into its comparison token set.
fn tokenize(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Jaccard similarity of the two titles' token sets. Zero when either
/// set is empty after stopword removal.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

/// Matches similar markets across platforms.
///
/// The manual-mapping table is mutated only by explicit adds; readers
/// during fan-out take the read lock and observe a consistent snapshot.
#[derive(Default)]
pub struct MarketMatcher {
    manual_mappings: RwLock<HashMap<String, HashSet<String>>>,
}

impl MarketMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare two markets equivalent. The relation is symmetric and
    /// never expires.
    pub fn add_manual_mapping(&self, id_a: &str, id_b: &str) {
        let mut mappings = self.manual_mappings.write().expect("mapping lock poisoned");
        mappings
            .entry(id_a.to_string())
            .or_default()
            .insert(id_b.to_string());
        mappings
            .entry(id_b.to_string())
            .or_default()
            .insert(id_a.to_string());
    }

    /// Whether a manual mapping exists between two ids.
    pub fn is_manual_match(&self, id_a: &str, id_b: &str) -> bool {
        self.manual_mappings
            .read()
            .expect("mapping lock poisoned")
            .get(id_a)
            .is_some_and(|set| set.contains(id_b))
    }

    /// Find candidates that describe the same question as `target`,
    /// sorted by confidence descending. Self-matches are excluded;
    /// manual mappings bypass the confidence threshold.
    pub fn find_matches(
        &self,
        target: &Market,
        candidates: &[Market],
        min_confidence: f64,
    ) -> Vec<MatchResult> {
        let target_id = target.id();
        let mut results = Vec::new();

        for candidate in candidates {
            if candidate.id() == target_id {
                continue;
            }

            if self.is_manual_match(&target_id, &candidate.id()) {
                results.push(MatchResult {
                    market_a: target.clone(),
                    market_b: candidate.clone(),
                    confidence: 1.0,
                    kind: MatchKind::Manual,
                });
                continue;
            }

            let confidence = text_similarity(&target.title, &candidate.title);
            if confidence >= min_confidence {
                results.push(MatchResult {
                    market_a: target.clone(),
                    market_b: candidate.clone(),
                    confidence,
                    kind: MatchKind::Text,
                });
            }
        }

        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
