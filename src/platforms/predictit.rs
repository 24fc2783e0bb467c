//! PredictIt adapter.
//!
//! Base URL: https://www.predictit.org/api/marketdata
//! Auth: not required.
//!
//! PredictIt is politics-only and its public API is minimal: there is no
//! search endpoint (we fetch `/all/` and filter client-side), no volume
//! or liquidity, and no creation timestamp (`created_at` is stamped at
//! decode time — observably wrong, but the API offers nothing better).
//! Markets are multi-contract: each contract becomes one `Outcome` at
//! its own standalone price, and the record-level probability comes from
//! the first contract.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{build_client, send_json, PlatformAdapter, SEARCH_LIMIT};
use crate::error::FederationError;
use crate::schema::{Category, Market, Outcome};

const BASE_URL: &str = "https://www.predictit.org/api/marketdata";
const PLATFORM_NAME: &str = "predictit";

// ---------------------------------------------------------------------------
// API response types (PredictIt JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AllMarketsResponse {
    #[serde(default)]
    markets: Vec<RawMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    id: i64,
    name: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    /// "Open" or "Closed".
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contracts: Vec<RawContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContract {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    last_trade_price: Option<f64>,
    #[serde(default)]
    best_buy_yes_cost: Option<f64>,
}

impl RawContract {
    /// Price priority: last trade, then best buy-yes offer, then 0.5.
    fn price(&self) -> f64 {
        self.last_trade_price
            .or(self.best_buy_yes_cost)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct PredictItAdapter {
    http: Client,
}

impl PredictItAdapter {
    pub fn new() -> Result<Self, FederationError> {
        Ok(PredictItAdapter {
            http: build_client(PLATFORM_NAME)?,
        })
    }

    /// Case-insensitive substring match against name or short name.
    fn matches_query(raw: &RawMarket, query_lower: &str) -> bool {
        raw.name.to_lowercase().contains(query_lower)
            || raw
                .short_name
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(query_lower))
    }

    /// Decode one PredictIt market payload into the normalized schema.
    fn parse_market(raw: RawMarket) -> Result<Market, FederationError> {
        let probability = raw
            .contracts
            .first()
            .map(RawContract::price)
            .unwrap_or(0.5);

        let outcomes: Vec<Outcome> = raw
            .contracts
            .iter()
            .map(|c| Outcome::new(c.name.as_deref().unwrap_or("Unknown"), c.price()))
            .collect();

        let url = raw
            .url
            .unwrap_or_else(|| format!("https://www.predictit.org/markets/detail/{}", raw.id));

        let market = Market {
            platform: PLATFORM_NAME.to_string(),
            native_id: raw.id.to_string(),
            url,
            title: raw.name,
            description: String::new(), // not in the API
            category: Category::Politics,
            probability,
            outcomes,
            volume: None,
            liquidity: None,
            // Creation time is not exposed by the API; decode time is
            // the best available stand-in.
            created_at: Utc::now(),
            closes_at: None,
            resolved: raw.status.as_deref() == Some("Closed"),
            resolution: None,
            last_fetched: Utc::now(),
            price_history: Vec::new(),
        };
        market.validate()?;
        Ok(market)
    }

    async fn fetch_all(&self) -> Result<Vec<RawMarket>, FederationError> {
        let url = format!("{BASE_URL}/all/");
        debug!(url = %url, "fetching all PredictIt markets");
        let all: AllMarketsResponse = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        Ok(all.markets)
    }
}

#[async_trait]
impl PlatformAdapter for PredictItAdapter {
    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    async fn get_market(&self, native_id: &str) -> Result<Market, FederationError> {
        let url = format!("{BASE_URL}/markets/{native_id}");
        debug!(url = %url, "fetching PredictIt market");
        let raw: RawMarket = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        Self::parse_market(raw)
    }

    /// PredictIt has no search endpoint: fetch everything and filter
    /// client-side, stopping at the search limit.
    async fn search_markets(
        &self,
        query: &str,
        _category: Option<Category>,
    ) -> Result<Vec<Market>, FederationError> {
        let query_lower = query.to_lowercase();
        let mut results = Vec::new();
        for raw in self.fetch_all().await? {
            if Self::matches_query(&raw, &query_lower) {
                results.push(Self::parse_market(raw)?);
                if results.len() >= SEARCH_LIMIT {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// The platform is politics-only.
    async fn list_categories(&self) -> Result<Vec<Category>, FederationError> {
        Ok(vec![Category::Politics])
    }

    async fn browse_category(
        &self,
        category: Category,
        limit: usize,
    ) -> Result<Vec<Market>, FederationError> {
        if category != Category::Politics {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for raw in self.fetch_all().await? {
            if raw.status.as_deref() == Some("Open") {
                results.push(Self::parse_market(raw)?);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
