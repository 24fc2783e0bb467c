//! Arbitrage detection and platform comparison over a pool of markets.
//!
//! Both operations lean on the matcher to decide which markets describe
//! the same question, then look at the probability spread between the
//! matched legs. Prices are point-in-time snapshots from independent
//! sources; a spread is a signal, not an executable guarantee.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::analysis::matching::MarketMatcher;
use crate::schema::Market;

/// Smallest probability difference worth reporting.
pub const DEFAULT_MIN_SPREAD: f64 = 0.05;

/// Match confidence below which two markets are not treated as the
/// same question.
pub const DEFAULT_MIN_MATCH_CONFIDENCE: f64 = 0.5;

/// Which leg to buy: always the cheaper side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    BuyASellB,
    BuyBSellA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::BuyASellB => f.write_str("buy_a_sell_b"),
            Direction::BuyBSellA => f.write_str("buy_b_sell_a"),
        }
    }
}

/// Two markets believed to describe the same question with materially
/// different prices.
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageOpportunity {
    pub market_a: Market,
    pub market_b: Market,
    /// Absolute probability difference.
    pub spread: f64,
    pub match_confidence: f64,
    pub direction: Direction,
}

/// One side-by-side comparison cluster.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformComparison {
    pub title: String,
    /// Distinct platforms in the cluster, each with its own quote.
    pub platforms: BTreeMap<String, PlatformQuote>,
    /// `max(p) - min(p)` across the cluster.
    pub max_spread: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformQuote {
    pub probability: f64,
    pub url: String,
}

/// Detects arbitrage opportunities across platforms.
pub struct ArbitrageDetector {
    matcher: Arc<MarketMatcher>,
}

impl ArbitrageDetector {
    pub fn new(matcher: Arc<MarketMatcher>) -> Self {
        ArbitrageDetector { matcher }
    }

    /// Find price spreads between matched markets.
    ///
    /// Each unordered pair is reported at most once (keyed by the sorted
    /// id tuple) and only when `spread >= min_spread`. Results are
    /// sorted by spread descending.
    pub fn find_arbitrage(
        &self,
        markets: &[Market],
        min_spread: f64,
        min_match_confidence: f64,
    ) -> Vec<ArbitrageOpportunity> {
        let mut opportunities = Vec::new();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

        for target in markets {
            let matches = self.matcher.find_matches(target, markets, min_match_confidence);

            for m in matches {
                let id_a = m.market_a.id();
                let id_b = m.market_b.id();
                let pair = if id_a <= id_b {
                    (id_a, id_b)
                } else {
                    (id_b, id_a)
                };
                if !seen_pairs.insert(pair) {
                    continue;
                }

                let spread = (m.market_a.probability - m.market_b.probability).abs();
                if spread < min_spread {
                    continue;
                }

                let direction = if m.market_a.probability < m.market_b.probability {
                    Direction::BuyASellB
                } else {
                    Direction::BuyBSellA
                };

                opportunities.push(ArbitrageOpportunity {
                    market_a: m.market_a,
                    market_b: m.market_b,
                    spread,
                    match_confidence: m.confidence,
                    direction,
                });
            }
        }

        opportunities.sort_by(|a, b| {
            b.spread
                .partial_cmp(&a.spread)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        opportunities
    }

    /// Group matched markets into equivalence clusters and emit one
    /// comparison per cluster with at least one matched pair.
    ///
    /// One-pass greedy walk: each market is absorbed into the first
    /// cluster that matches it and never revisited.
    pub fn compare_platforms(
        &self,
        markets: &[Market],
        min_match_confidence: f64,
    ) -> Vec<PlatformComparison> {
        let mut comparisons = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();

        for target in markets {
            let target_id = target.id();
            if processed.contains(&target_id) {
                continue;
            }
            processed.insert(target_id);

            let candidates: Vec<Market> = markets
                .iter()
                .filter(|m| !processed.contains(&m.id()))
                .cloned()
                .collect();
            let matches = self.matcher.find_matches(target, &candidates, min_match_confidence);
            if matches.is_empty() {
                continue;
            }

            let mut platforms = BTreeMap::new();
            platforms.insert(
                target.platform.clone(),
                PlatformQuote {
                    probability: target.probability,
                    url: target.url.clone(),
                },
            );
            let mut min_prob = target.probability;
            let mut max_prob = target.probability;

            for m in matches {
                processed.insert(m.market_b.id());
                min_prob = min_prob.min(m.market_b.probability);
                max_prob = max_prob.max(m.market_b.probability);
                platforms.insert(
                    m.market_b.platform.clone(),
                    PlatformQuote {
                        probability: m.market_b.probability,
                        url: m.market_b.url.clone(),
                    },
                );
            }

            comparisons.push(PlatformComparison {
                title: target.title.clone(),
                platforms,
                max_spread: max_prob - min_prob,
            });
        }

        comparisons
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn detector_with_mapping(pairs: &[(&str, &str)]) -> ArbitrageDetector {
        let matcher = Arc::new(MarketMatcher::new());
        for (a, b) in pairs {
            matcher.add_manual_mapping(a, b);
        }
        ArbitrageDetector::new(matcher)
    }

    #[test]
    fn test_manual_pair_produces_single_opportunity() {
        let detector = detector_with_mapping(&[("manifold:a", "polymarket:b")]);
        let pool = vec![
            Market::stub("manifold", "a", "Apples", 0.40),
            Market::stub("polymarket", "b", "Oranges", 0.60),
        ];

        let opps = detector.find_arbitrage(&pool, 0.05, 0.5);
        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert!((opp.spread - 0.20).abs() < 1e-9);
        assert_eq!(opp.direction, Direction::BuyASellB);
        assert!((opp.match_confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_spread_is_absolute_difference() {
        let detector = detector_with_mapping(&[("m:a", "p:b")]);
        let pool = vec![
            Market::stub("m", "a", "X", 0.90),
            Market::stub("p", "b", "Y", 0.55),
        ];
        let opps = detector.find_arbitrage(&pool, 0.05, 0.5);
        assert_eq!(opps.len(), 1);
        assert!((opps[0].spread - 0.35).abs() < 1e-9);
        assert_eq!(opps[0].direction, Direction::BuyBSellA);
    }

    #[test]
    fn test_spread_below_minimum_ignored() {
        let detector = detector_with_mapping(&[("m:a", "p:b")]);
        let pool = vec![
            Market::stub("m", "a", "X", 0.50),
            Market::stub("p", "b", "Y", 0.52),
        ];
        assert!(detector.find_arbitrage(&pool, 0.05, 0.5).is_empty());
    }

    #[test]
    fn test_each_unordered_pair_reported_once() {
        let detector = detector_with_mapping(&[("m:a", "p:b")]);
        let pool = vec![
            Market::stub("m", "a", "X", 0.40),
            Market::stub("p", "b", "Y", 0.60),
        ];
        // Both iteration orders reach the same pair; it must dedupe.
        let opps = detector.find_arbitrage(&pool, 0.05, 0.5);
        assert_eq!(opps.len(), 1);
    }

    #[test]
    fn test_opportunities_sorted_by_spread_descending() {
        let detector = detector_with_mapping(&[("m:a", "p:b"), ("m:c", "p:d")]);
        let pool = vec![
            Market::stub("m", "a", "X", 0.45),
            Market::stub("p", "b", "Y", 0.55),
            Market::stub("m", "c", "Z", 0.20),
            Market::stub("p", "d", "W", 0.80),
        ];
        let opps = detector.find_arbitrage(&pool, 0.05, 0.5);
        assert_eq!(opps.len(), 2);
        assert!((opps[0].spread - 0.60).abs() < 1e-9);
        assert!((opps[1].spread - 0.10).abs() < 1e-9);
        assert!(opps.windows(2).all(|w| w[0].spread >= w[1].spread));
    }

    #[test]
    fn test_text_matches_feed_detection() {
        let detector = detector_with_mapping(&[]);
        let pool = vec![
            Market::stub("manifold", "a", "Will Trump win 2024?", 0.40),
            Market::stub("polymarket", "b", "Trump wins 2024", 0.60),
        ];
        let opps = detector.find_arbitrage(&pool, 0.05, 0.5);
        assert_eq!(opps.len(), 1);
        assert!((opps[0].match_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_direction_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Direction::BuyASellB).unwrap(),
            "\"buy_a_sell_b\""
        );
    }

    // -- compare_platforms --

    #[test]
    fn test_compare_builds_cluster_with_spread() {
        let detector = detector_with_mapping(&[
            ("manifold:a", "polymarket:b"),
            ("manifold:a", "kalshi:c"),
        ]);
        let pool = vec![
            Market::stub("manifold", "a", "Q?", 0.40),
            Market::stub("polymarket", "b", "R?", 0.52),
            Market::stub("kalshi", "c", "S?", 0.45),
        ];

        let comparisons = detector.compare_platforms(&pool, 0.5);
        assert_eq!(comparisons.len(), 1);
        let c = &comparisons[0];
        assert_eq!(c.title, "Q?");
        assert_eq!(c.platforms.len(), 3);
        assert!((c.platforms["polymarket"].probability - 0.52).abs() < 1e-9);
        assert!((c.max_spread - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_compare_omits_unmatched_markets() {
        let detector = detector_with_mapping(&[]);
        let pool = vec![
            Market::stub("manifold", "a", "Alpha topic", 0.40),
            Market::stub("kalshi", "b", "Totally separate", 0.60),
        ];
        assert!(detector.compare_platforms(&pool, 0.5).is_empty());
    }

    #[test]
    fn test_compare_clusters_are_disjoint() {
        let detector = detector_with_mapping(&[("m:a", "p:b"), ("m:c", "p:d")]);
        let pool = vec![
            Market::stub("m", "a", "Q1", 0.40),
            Market::stub("p", "b", "R1", 0.50),
            Market::stub("m", "c", "Q2", 0.30),
            Market::stub("p", "d", "R2", 0.35),
        ];
        let comparisons = detector.compare_platforms(&pool, 0.5);
        assert_eq!(comparisons.len(), 2);
        // A market absorbed into the first cluster never reappears.
        let total_quotes: usize = comparisons.iter().map(|c| c.platforms.len()).sum();
        assert_eq!(total_quotes, 4);
    }

    #[test]
    fn test_compare_single_market_pool_empty() {
        let detector = detector_with_mapping(&[]);
        let pool = vec![Market::stub("m", "a", "Q?", 0.5)];
        assert!(detector.compare_platforms(&pool, 0.5).is_empty());
    }
}
