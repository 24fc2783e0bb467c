//! Federation orchestrator.
//!
//! Owns the adapter set and every cross-cutting concern: concurrent
//! fan-out with partial-failure aggregation, per-platform rate
//! limiting, the matcher/detector pair, the watchlist, and the optional
//! memory back-end. The tool surface calls straight into this layer.
//!
//! Failure policy: federated operations absorb `Platform` errors into a
//! per-platform errors list and succeed with whatever the other
//! platforms returned; point operations propagate them. An `Invariant`
//! error aborts the whole operation — it means an adapter produced an
//! out-of-range probability, which is a bug, not an upstream outage.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analysis::arbitrage::{
    ArbitrageDetector, ArbitrageOpportunity, Direction, PlatformComparison,
    DEFAULT_MIN_MATCH_CONFIDENCE,
};
use crate::analysis::matching::MarketMatcher;
use crate::error::FederationError;
use crate::limiter::RateLimiter;
use crate::platforms::PlatformAdapter;
use crate::schema::{Category, Market};
use crate::storage::MemoryStore;
use crate::watchlist::Watchlist;

// ---------------------------------------------------------------------------
// Response records
// ---------------------------------------------------------------------------

/// JSON-safe view of a `Market` returned to callers. Normalization to
/// this shape happens here, not inside adapters.
#[derive(Debug, Clone, Serialize)]
pub struct MarketRecord {
    pub id: String,
    pub platform: String,
    pub native_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub probability: f64,
    pub volume: Option<f64>,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub last_fetched: DateTime<Utc>,
}

impl From<&Market> for MarketRecord {
    fn from(m: &Market) -> Self {
        MarketRecord {
            id: m.id(),
            platform: m.platform.clone(),
            native_id: m.native_id.clone(),
            url: m.url.clone(),
            title: m.title.clone(),
            description: m.description.clone(),
            category: m.category,
            probability: m.probability,
            volume: m.volume,
            resolved: m.resolved,
            resolution: m.resolution.clone(),
            last_fetched: m.last_fetched,
        }
    }
}

/// One upstream's failure inside a federated operation.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformFailure {
    pub platform: String,
    pub error: String,
}

impl PlatformFailure {
    fn from_error(platform: &str, err: FederationError) -> Self {
        // A Platform error already knows its origin; keep the bare
        // message so the platform name isn't repeated in the entry.
        let error = match err {
            FederationError::Platform { message, .. } => message,
            other => other.to_string(),
        };
        PlatformFailure {
            platform: platform.to_string(),
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub markets: Vec<MarketRecord>,
    pub errors: Vec<PlatformFailure>,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<Category>,
    pub errors: Vec<PlatformFailure>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub status: &'static str,
    pub market_id: String,
    pub alias: Option<String>,
    pub market: MarketRecord,
}

#[derive(Debug, Serialize)]
pub struct TrackedMarket {
    pub market: MarketRecord,
    pub alias: Option<String>,
    pub tracked_at: DateTime<Utc>,
}

/// Failure re-fetching one watchlist entry; keyed by the entry's full
/// id rather than a platform, since one entry failing is an entry-level
/// event.
#[derive(Debug, Clone, Serialize)]
pub struct EntryFailure {
    pub market_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TrackedResponse {
    pub tracked_markets: Vec<TrackedMarket>,
    pub errors: Vec<EntryFailure>,
}

#[derive(Debug, Serialize)]
pub struct OpportunityRecord {
    pub market_a: MarketRecord,
    pub market_b: MarketRecord,
    pub spread: f64,
    pub match_confidence: f64,
    pub direction: Direction,
}

impl From<&ArbitrageOpportunity> for OpportunityRecord {
    fn from(o: &ArbitrageOpportunity) -> Self {
        OpportunityRecord {
            market_a: MarketRecord::from(&o.market_a),
            market_b: MarketRecord::from(&o.market_b),
            spread: o.spread,
            match_confidence: o.match_confidence,
            direction: o.direction,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArbitrageResponse {
    pub opportunities: Vec<OpportunityRecord>,
    pub errors: Vec<PlatformFailure>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    pub comparisons: Vec<PlatformComparison>,
    pub errors: Vec<PlatformFailure>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
    limiter: RateLimiter,
    matcher: Arc<MarketMatcher>,
    detector: ArbitrageDetector,
    watchlist: Watchlist,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl Orchestrator {
    pub fn new(adapters: Vec<Arc<dyn PlatformAdapter>>, limiter: RateLimiter) -> Self {
        let matcher = Arc::new(MarketMatcher::new());
        let detector = ArbitrageDetector::new(Arc::clone(&matcher));
        Orchestrator {
            adapters,
            limiter,
            matcher,
            detector,
            watchlist: Watchlist::new(),
            memory: None,
        }
    }

    /// Attach an optional memory back-end. Writes are best-effort.
    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    /// Names of the configured platforms, in registration order.
    pub fn platform_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    fn adapter(&self, platform: &str) -> Result<Arc<dyn PlatformAdapter>, FederationError> {
        self.adapters
            .iter()
            .find(|a| a.name() == platform)
            .cloned()
            .ok_or_else(|| {
                FederationError::InvalidArgument(format!("unknown platform: {platform}"))
            })
    }

    /// The adapters a federated call targets. Unknown names in the
    /// filter are ignored; `None` means all.
    fn select(&self, platforms: Option<&[String]>) -> Vec<Arc<dyn PlatformAdapter>> {
        match platforms {
            None => self.adapters.clone(),
            Some(filter) => self
                .adapters
                .iter()
                .filter(|a| filter.iter().any(|p| p == a.name()))
                .cloned()
                .collect(),
        }
    }

    /// Fold fan-out results into (markets, per-platform failures),
    /// aborting on invariant violations.
    fn collect(
        results: Vec<(&'static str, Result<Vec<Market>, FederationError>)>,
    ) -> Result<(Vec<Market>, Vec<PlatformFailure>), FederationError> {
        let mut markets = Vec::new();
        let mut errors = Vec::new();
        for (name, result) in results {
            match result {
                Ok(batch) => markets.extend(batch),
                Err(e @ FederationError::Invariant(_)) => return Err(e),
                Err(e) => {
                    warn!(platform = name, error = %e, "platform call failed, continuing");
                    errors.push(PlatformFailure::from_error(name, e));
                }
            }
        }
        Ok((markets, errors))
    }

    /// Concurrent search across the selected adapters.
    async fn fan_out_search(
        &self,
        query: &str,
        platforms: Option<&[String]>,
    ) -> Result<(Vec<Market>, Vec<PlatformFailure>), FederationError> {
        let selected = self.select(platforms);
        debug!(query, adapters = selected.len(), "fanning out search");

        let calls: Vec<_> = selected
            .into_iter()
            .map(|adapter| {
                let query = query.to_string();
                async move {
                    self.limiter.acquire(adapter.name()).await;
                    let result = adapter.search_markets(&query, None).await;
                    (adapter.name(), result)
                }
            })
            .collect();

        Self::collect(join_all(calls).await)
    }

    // -- Federated operations --------------------------------------------

    /// Search every selected platform for markets matching a query.
    pub async fn search_markets(
        &self,
        query: &str,
        platforms: Option<&[String]>,
    ) -> Result<SearchResponse, FederationError> {
        let (markets, errors) = self.fan_out_search(query, platforms).await?;
        info!(
            query,
            markets = markets.len(),
            failed_platforms = errors.len(),
            "federated search complete"
        );
        Ok(SearchResponse {
            markets: markets.iter().map(MarketRecord::from).collect(),
            errors,
        })
    }

    /// Union of every platform's normalized categories.
    pub async fn list_categories(&self) -> Result<CategoriesResponse, FederationError> {
        let calls: Vec<_> = self
            .adapters
            .iter()
            .cloned()
            .map(|adapter| async move {
                self.limiter.acquire(adapter.name()).await;
                let result = adapter.list_categories().await;
                (adapter.name(), result)
            })
            .collect();

        let mut all: BTreeSet<Category> = BTreeSet::new();
        let mut errors = Vec::new();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(cats) => all.extend(cats),
                Err(e @ FederationError::Invariant(_)) => return Err(e),
                Err(e) => errors.push(PlatformFailure::from_error(name, e)),
            }
        }

        Ok(CategoriesResponse {
            categories: all.into_iter().collect(),
            errors,
        })
    }

    /// Browse one category across every platform, sorted by volume
    /// descending (missing volume sorts as zero) and truncated to
    /// `limit` after aggregation.
    pub async fn browse_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<SearchResponse, FederationError> {
        let category: Category = category.parse()?;

        let calls: Vec<_> = self
            .adapters
            .iter()
            .cloned()
            .map(|adapter| async move {
                self.limiter.acquire(adapter.name()).await;
                let result = adapter.browse_category(category, limit).await;
                (adapter.name(), result)
            })
            .collect();

        let (mut markets, errors) = Self::collect(join_all(calls).await)?;

        markets.sort_by(|a, b| {
            let va = a.volume.unwrap_or(0.0);
            let vb = b.volume.unwrap_or(0.0);
            vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
        });
        markets.truncate(limit);

        Ok(SearchResponse {
            markets: markets.iter().map(MarketRecord::from).collect(),
            errors,
        })
    }

    /// Pool recent markets from every platform and run the detector.
    pub async fn find_arbitrage(
        &self,
        min_spread: f64,
    ) -> Result<ArbitrageResponse, FederationError> {
        if !(0.0..=1.0).contains(&min_spread) {
            return Err(FederationError::InvalidArgument(format!(
                "min_spread must be within [0,1], got {min_spread}"
            )));
        }

        // An empty query pulls each platform's recent/popular slate.
        let (markets, errors) = self.fan_out_search("", None).await?;
        let opportunities =
            self.detector
                .find_arbitrage(&markets, min_spread, DEFAULT_MIN_MATCH_CONFIDENCE);

        info!(
            pool = markets.len(),
            opportunities = opportunities.len(),
            min_spread,
            "arbitrage scan complete"
        );

        Ok(ArbitrageResponse {
            opportunities: opportunities.iter().map(OpportunityRecord::from).collect(),
            errors,
        })
    }

    /// Federated search followed by equivalence clustering.
    pub async fn compare_platforms(
        &self,
        query: &str,
    ) -> Result<ComparisonResponse, FederationError> {
        let (markets, errors) = self.fan_out_search(query, None).await?;
        let comparisons = self
            .detector
            .compare_platforms(&markets, DEFAULT_MIN_MATCH_CONFIDENCE);
        Ok(ComparisonResponse {
            comparisons,
            errors,
        })
    }

    // -- Point operations ------------------------------------------------

    /// Single-platform point read. Unknown platform is a caller error.
    pub async fn get_market_odds(
        &self,
        platform: &str,
        market_id: &str,
    ) -> Result<MarketRecord, FederationError> {
        let adapter = self.adapter(platform)?;
        self.limiter.acquire(platform).await;
        let market = adapter.get_market(market_id).await?;
        Ok(MarketRecord::from(&market))
    }

    /// Verify a market exists, then register it in the watchlist.
    pub async fn track_market(
        &self,
        platform: &str,
        market_id: &str,
        alias: Option<String>,
    ) -> Result<TrackResponse, FederationError> {
        let adapter = self.adapter(platform)?;
        self.limiter.acquire(platform).await;
        let market = adapter.get_market(market_id).await?;

        let full_id = market.id();
        self.watchlist.insert(full_id.clone(), alias.clone());
        info!(market_id = %full_id, alias = ?alias, "market tracked");

        if let Some(store) = &self.memory {
            let content = format!("Tracking {full_id}: {}", market.title);
            let metadata = json!({"market_id": full_id, "alias": alias});
            if let Err(e) = store.store("tracked-markets", &content, Some(metadata)).await {
                warn!(error = %e, "memory store write failed, continuing");
            }
        }

        Ok(TrackResponse {
            status: "tracked",
            market_id: full_id,
            alias,
            market: MarketRecord::from(&market),
        })
    }

    /// Remove a market from the watchlist. Returns whether it was
    /// tracked.
    pub fn untrack_market(&self, full_id: &str) -> bool {
        let removed = self.watchlist.remove(full_id);
        if removed {
            info!(market_id = full_id, "market untracked");
        }
        removed
    }

    /// Refresh-on-read of every watchlist entry. One entry failing to
    /// re-fetch is recorded and never aborts the listing.
    pub async fn get_tracked_markets(&self) -> Result<TrackedResponse, FederationError> {
        let mut tracked = Vec::new();
        let mut errors = Vec::new();

        for (full_id, entry) in self.watchlist.snapshot() {
            let (platform, native_id) = match full_id.split_once(':') {
                Some(parts) => parts,
                None => {
                    errors.push(EntryFailure {
                        market_id: full_id.clone(),
                        error: "malformed id".to_string(),
                    });
                    continue;
                }
            };

            let refetch = async {
                let adapter = self.adapter(platform)?;
                self.limiter.acquire(platform).await;
                adapter.get_market(native_id).await
            };
            match refetch.await {
                Ok(market) => tracked.push(TrackedMarket {
                    market: MarketRecord::from(&market),
                    alias: entry.alias,
                    tracked_at: entry.tracked_at,
                }),
                Err(e) => errors.push(EntryFailure {
                    market_id: full_id,
                    error: e.to_string(),
                }),
            }
        }

        Ok(TrackedResponse {
            tracked_markets: tracked,
            errors,
        })
    }

    // -- Admin -----------------------------------------------------------

    /// Declare two markets equivalent, bypassing text matching.
    pub async fn add_manual_mapping(&self, id_a: &str, id_b: &str) {
        self.matcher.add_manual_mapping(id_a, id_b);
        info!(id_a, id_b, "manual mapping added");

        if let Some(store) = &self.memory {
            let content = format!("Mapped {id_a} <-> {id_b}");
            let metadata = json!({"market_a": id_a, "market_b": id_b});
            if let Err(e) = store.store("market-mappings", &content, Some(metadata)).await {
                warn!(error = %e, "memory store write failed, continuing");
            }
        }
    }

    /// Shut down every adapter.
    pub async fn close(&self) {
        for adapter in &self.adapters {
            adapter.close().await;
        }
        info!(adapters = self.adapters.len(), "all adapters closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Minimal in-process adapter for wiring tests. The heavier
    /// federation scenarios live in tests/federation.rs.
    struct StubAdapter {
        name: &'static str,
        markets: Vec<Market>,
    }

    #[async_trait]
    impl PlatformAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn get_market(&self, native_id: &str) -> Result<Market, FederationError> {
            self.markets
                .iter()
                .find(|m| m.native_id == native_id)
                .cloned()
                .ok_or_else(|| {
                    FederationError::platform(self.name, format!("market not found: {native_id}"))
                })
        }

        async fn search_markets(
            &self,
            _query: &str,
            _category: Option<Category>,
        ) -> Result<Vec<Market>, FederationError> {
            Ok(self.markets.clone())
        }

        async fn list_categories(&self) -> Result<Vec<Category>, FederationError> {
            Ok(vec![Category::Politics])
        }

        async fn browse_category(
            &self,
            _category: Category,
            _limit: usize,
        ) -> Result<Vec<Market>, FederationError> {
            Ok(self.markets.clone())
        }
    }

    fn orchestrator_with(markets: Vec<Market>) -> Orchestrator {
        let adapter = Arc::new(StubAdapter {
            name: "stub",
            markets,
        });
        Orchestrator::new(vec![adapter], RateLimiter::new())
    }

    #[tokio::test]
    async fn test_unknown_platform_is_invalid_argument() {
        let orch = orchestrator_with(vec![]);
        let err = orch.get_market_odds("bovada", "x").await.unwrap_err();
        assert!(matches!(err, FederationError::InvalidArgument(_)));
        assert!(format!("{err}").contains("bovada"));
    }

    #[tokio::test]
    async fn test_unknown_category_is_invalid_argument() {
        let orch = orchestrator_with(vec![]);
        let err = orch.browse_category("memes", 10).await.unwrap_err();
        assert!(matches!(err, FederationError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_negative_min_spread_is_invalid_argument() {
        let orch = orchestrator_with(vec![]);
        let err = orch.find_arbitrage(-0.1).await.unwrap_err();
        assert!(matches!(err, FederationError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_platform_filter_selects_subset() {
        let orch = orchestrator_with(vec![Market::stub("stub", "1", "Q?", 0.5)]);

        let all = orch.search_markets("q", None).await.unwrap();
        assert_eq!(all.markets.len(), 1);

        let none = orch
            .search_markets("q", Some(&["manifold".to_string()]))
            .await
            .unwrap();
        assert!(none.markets.is_empty());
        assert!(none.errors.is_empty());
    }

    #[tokio::test]
    async fn test_market_record_normalization() {
        let orch = orchestrator_with(vec![Market::stub("stub", "m1", "Title", 0.42)]);
        let record = orch.get_market_odds("stub", "m1").await.unwrap();
        assert_eq!(record.id, "stub:m1");
        assert_eq!(record.platform, "stub");
        assert!((record.probability - 0.42).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_point_read_propagates_platform_error() {
        let orch = orchestrator_with(vec![]);
        let err = orch.get_market_odds("stub", "missing").await.unwrap_err();
        assert!(matches!(err, FederationError::Platform { .. }));
    }

    #[tokio::test]
    async fn test_untrack_roundtrip() {
        let orch = orchestrator_with(vec![Market::stub("stub", "m1", "Title", 0.42)]);
        orch.track_market("stub", "m1", None).await.unwrap();
        assert!(orch.untrack_market("stub:m1"));
        assert!(!orch.untrack_market("stub:m1"));
    }

    #[tokio::test]
    async fn test_platform_names_in_registration_order() {
        let a = Arc::new(StubAdapter { name: "alpha", markets: vec![] });
        let b = Arc::new(StubAdapter { name: "beta", markets: vec![] });
        let orch = Orchestrator::new(vec![a, b], RateLimiter::new());
        assert_eq!(orch.platform_names(), vec!["alpha", "beta"]);
    }
}
