//! Kalshi adapter.
//!
//! Base URL: https://api.elections.kalshi.com/trade-api/v2
//! Auth: public market data needs none; a bearer token is attached when
//! configured (some deployments require it).
//!
//! Kalshi quotes prices in integer cents. The Yes probability prefers
//! the current ask (`yes_ask / 100`), falling back to the last trade
//! (`last_price / 100`), then 0.5; both fields can be `null` and are
//! handled explicitly. Categories are a fixed list on this exchange.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{build_client, parse_rfc3339, send_json, PlatformAdapter, SEARCH_LIMIT};
use crate::error::FederationError;
use crate::schema::{Category, Market};

const BASE_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";
const PLATFORM_NAME: &str = "kalshi";

/// Kalshi's category slate, normalized.
const CATEGORIES: &[Category] = &[
    Category::Politics,
    Category::Crypto,
    Category::Economics,
    Category::Science,
    Category::Entertainment,
    Category::Sports,
    Category::Technology,
];

// ---------------------------------------------------------------------------
// API response types (Kalshi JSON → Rust)
// ---------------------------------------------------------------------------

/// `/markets/{ticker}` wraps the market in an envelope.
#[derive(Debug, Deserialize)]
struct SingleMarketResponse {
    market: RawMarket,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    markets: Vec<RawMarket>,
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    ticker: String,
    title: String,
    #[serde(default)]
    subtitle: Option<String>,

    /// Cents, 0–100. Explicitly nullable.
    #[serde(default)]
    yes_ask: Option<f64>,
    #[serde(default)]
    last_price: Option<f64>,

    #[serde(default)]
    volume: Option<f64>,

    /// "active", "finalized", ...
    #[serde(default)]
    status: Option<String>,
    /// Outcome label once settled; empty string until then.
    #[serde(default)]
    result: Option<String>,

    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    close_time: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct KalshiAdapter {
    http: Client,
    /// Bearer token for deployments that require authentication.
    api_token: Option<String>,
}

impl KalshiAdapter {
    pub fn new(api_token: Option<String>) -> Result<Self, FederationError> {
        Ok(KalshiAdapter {
            http: build_client(PLATFORM_NAME)?,
            api_token,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(url);
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Decode one Kalshi market payload into the normalized schema.
    fn parse_market(raw: RawMarket) -> Result<Market, FederationError> {
        // Cents to probability: ask first, last trade second.
        let probability = raw
            .yes_ask
            .or(raw.last_price)
            .map(|cents| cents / 100.0)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let category = raw
            .category
            .as_deref()
            .and_then(|c| c.parse::<Category>().ok())
            .unwrap_or(Category::Other);

        // `result` is "" until the market settles.
        let resolution = raw.result.filter(|r| !r.is_empty());
        let resolved = raw.status.as_deref() == Some("finalized") || resolution.is_some();

        let market = Market {
            platform: PLATFORM_NAME.to_string(),
            native_id: raw.ticker.clone(),
            url: format!("https://kalshi.com/markets/{}", raw.ticker),
            title: raw.title,
            description: raw.subtitle.unwrap_or_default(),
            category,
            probability,
            outcomes: Market::binary_outcomes(probability),
            volume: Some(raw.volume.unwrap_or(0.0)),
            liquidity: None, // Kalshi reports open interest, not liquidity
            created_at: Utc::now(), // not on the market payload
            closes_at: raw.close_time.as_deref().and_then(parse_rfc3339),
            resolved,
            resolution,
            last_fetched: Utc::now(),
            price_history: Vec::new(),
        };
        market.validate()?;
        Ok(market)
    }
}

#[async_trait]
impl PlatformAdapter for KalshiAdapter {
    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    async fn get_market(&self, native_id: &str) -> Result<Market, FederationError> {
        let url = format!("{BASE_URL}/markets/{native_id}");
        debug!(url = %url, "fetching Kalshi market");
        let envelope: SingleMarketResponse =
            send_json(PLATFORM_NAME, self.request(&url)).await?;
        Self::parse_market(envelope.market)
    }

    /// Kalshi search goes through the ticker parameter.
    async fn search_markets(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> Result<Vec<Market>, FederationError> {
        let url = format!("{BASE_URL}/markets?ticker={}", urlencoding::encode(query));
        debug!(url = %url, "searching Kalshi markets");
        let page: MarketsResponse = send_json(PLATFORM_NAME, self.request(&url)).await?;

        let mut results = Vec::new();
        for raw in page.markets {
            let market = Self::parse_market(raw)?;
            if category.map_or(true, |c| market.category == c) {
                results.push(market);
                if results.len() >= SEARCH_LIMIT {
                    break;
                }
            }
        }
        Ok(results)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, FederationError> {
        let mut cats = CATEGORIES.to_vec();
        cats.sort();
        Ok(cats)
    }

    async fn browse_category(
        &self,
        category: Category,
        limit: usize,
    ) -> Result<Vec<Market>, FederationError> {
        let url = format!("{BASE_URL}/markets?limit={limit}&status=active");
        debug!(url = %url, category = %category, "browsing Kalshi markets");
        let page: MarketsResponse = send_json(PLATFORM_NAME, self.request(&url)).await?;

        let mut markets = Vec::new();
        for raw in page.markets {
            let market = Self::parse_market(raw)?;
            if market.category == category {
                markets.push(market);
                if markets.len() >= limit {
                    break;
                }
            }
        }
        Ok(markets)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
