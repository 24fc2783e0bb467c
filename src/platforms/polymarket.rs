//! Polymarket adapter.
//!
//! Base URL: https://gamma-api.polymarket.com
//! Auth: not required for reads.
//!
//! The gamma API is loosely typed: `outcomePrices` and `outcomes` may be
//! JSON arrays or JSON-encoded strings, and their elements may be
//! numbers or numeric strings. `volume`/`liquidity` likewise. The
//! decoder accepts both forms. The Yes price is `outcomePrices[0]`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{build_client, parse_rfc3339, send_json, PlatformAdapter, SEARCH_LIMIT};
use crate::error::FederationError;
use crate::schema::{Category, Market, Outcome};

const BASE_URL: &str = "https://gamma-api.polymarket.com";
const PLATFORM_NAME: &str = "polymarket";

/// Tag → normalized category. The first matching tag on a market wins.
const CATEGORY_MAP: &[(&str, Category)] = &[
    ("politics", Category::Politics),
    ("crypto", Category::Crypto),
    ("bitcoin", Category::Crypto),
    ("ethereum", Category::Crypto),
    ("sports", Category::Sports),
    ("entertainment", Category::Entertainment),
    ("science", Category::Science),
    ("technology", Category::Technology),
    ("ai", Category::Ai),
    ("business", Category::Economics),
    ("finance", Category::Finance),
];

// ---------------------------------------------------------------------------
// API response types (gamma JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    id: String,
    question: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    slug: Option<String>,

    /// Array of prices, or a JSON-encoded string of one.
    #[serde(default)]
    outcome_prices: Option<Value>,
    /// Array of outcome names, or a JSON-encoded string of one.
    #[serde(default)]
    outcomes: Option<Value>,

    /// Number or numeric string.
    #[serde(default)]
    volume: Option<Value>,
    #[serde(default)]
    liquidity: Option<Value>,

    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,

    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    closed: bool,

    #[serde(default)]
    tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loose-value coercion
// ---------------------------------------------------------------------------

/// Unwrap an array that may itself arrive JSON-encoded as a string.
fn value_list(value: &Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// A number that may arrive as a JSON number or a numeric string.
fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct PolymarketAdapter {
    http: Client,
}

impl PolymarketAdapter {
    pub fn new() -> Result<Self, FederationError> {
        Ok(PolymarketAdapter {
            http: build_client(PLATFORM_NAME)?,
        })
    }

    fn map_category(tags: &[String]) -> Category {
        for tag in tags {
            let tag = tag.to_lowercase();
            if let Some((_, cat)) = CATEGORY_MAP.iter().find(|(t, _)| *t == tag) {
                return *cat;
            }
        }
        Category::Other
    }

    /// Decode one gamma market payload into the normalized schema.
    fn parse_market(raw: RawMarket) -> Result<Market, FederationError> {
        let category = Self::map_category(&raw.tags);

        let prices = value_list(&raw.outcome_prices);
        let probability = prices
            .first()
            .and_then(value_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        // One outcome per listed name, each at its own standalone price.
        let names = value_list(&raw.outcomes);
        let names: Vec<String> = if names.is_empty() {
            vec!["Yes".to_string(), "No".to_string()]
        } else {
            names
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect()
        };
        let outcomes = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let prob = prices
                    .get(i)
                    .and_then(value_f64)
                    .unwrap_or(0.5)
                    .clamp(0.0, 1.0);
                Outcome::new(name, prob)
            })
            .collect();

        let created_at = raw
            .start_date
            .as_deref()
            .and_then(parse_rfc3339)
            .unwrap_or_else(Utc::now);
        let closes_at = raw.end_date.as_deref().and_then(parse_rfc3339);

        let slug = raw.slug.unwrap_or_else(|| raw.id.clone());

        let market = Market {
            platform: PLATFORM_NAME.to_string(),
            native_id: raw.id,
            url: format!("https://polymarket.com/market/{slug}"),
            title: raw.question,
            description: raw.description.unwrap_or_default(),
            category,
            probability,
            outcomes,
            volume: Some(raw.volume.as_ref().and_then(value_f64).unwrap_or(0.0)),
            liquidity: Some(raw.liquidity.as_ref().and_then(value_f64).unwrap_or(0.0)),
            created_at,
            closes_at,
            resolved: raw.closed && !raw.active,
            resolution: None, // gamma does not expose an outcome label
            last_fetched: Utc::now(),
            price_history: Vec::new(),
        };
        market.validate()?;
        Ok(market)
    }
}

#[async_trait]
impl PlatformAdapter for PolymarketAdapter {
    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    async fn get_market(&self, native_id: &str) -> Result<Market, FederationError> {
        let url = format!("{BASE_URL}/markets/{native_id}");
        debug!(url = %url, "fetching Polymarket market");
        let raw: RawMarket = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        Self::parse_market(raw)
    }

    async fn search_markets(
        &self,
        query: &str,
        _category: Option<Category>,
    ) -> Result<Vec<Market>, FederationError> {
        let url = format!(
            "{BASE_URL}/markets?active=true&closed=false&limit={SEARCH_LIMIT}&title_like={}",
            urlencoding::encode(query),
        );
        debug!(url = %url, "searching Polymarket markets");
        let raw: Vec<RawMarket> = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        raw.into_iter().map(Self::parse_market).collect()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, FederationError> {
        let mut cats: Vec<Category> = CATEGORY_MAP.iter().map(|(_, c)| *c).collect();
        cats.sort();
        cats.dedup();
        Ok(cats)
    }

    async fn browse_category(
        &self,
        category: Category,
        limit: usize,
    ) -> Result<Vec<Market>, FederationError> {
        if !CATEGORY_MAP.iter().any(|(_, c)| *c == category) {
            return Ok(Vec::new());
        }

        let url = format!("{BASE_URL}/markets?active=true&closed=false&limit={limit}");
        debug!(url = %url, category = %category, "browsing Polymarket markets");
        let raw: Vec<RawMarket> = send_json(PLATFORM_NAME, self.http.get(&url)).await?;

        let mut markets = Vec::new();
        for m in raw {
            let market = Self::parse_market(m)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(value: serde_json::Value) -> RawMarket {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_with_array_prices() {
        let raw = raw_from(json!({
            "id": "12345",
            "question": "Q?",
            "slug": "q-market",
            "outcomePrices": ["0.62", "0.38"],
            "outcomes": ["Yes", "No"],
            "tags": ["Crypto"],
            "volume": "15000.5",
            "liquidity": 2000.0,
            "startDate": "2024-01-01T00:00:00Z",
            "endDate": "2026-12-31T00:00:00Z"
        }));
        let m = PolymarketAdapter::parse_market(raw).unwrap();

        assert_eq!(m.id(), "polymarket:12345");
        assert!((m.probability - 0.62).abs() < 1e-9);
        assert_eq!(m.category, Category::Crypto);
        assert_eq!(m.url, "https://polymarket.com/market/q-market");
        assert_eq!(m.volume, Some(15000.5));
        assert_eq!(m.liquidity, Some(2000.0));
        assert_eq!(m.outcomes.len(), 2);
        assert!((m.outcomes[1].probability - 0.38).abs() < 1e-9);
        assert!(!m.resolved);
    }

    #[test]
    fn test_decode_with_string_encoded_prices() {
        let raw = raw_from(json!({
            "id": "777",
            "question": "Q?",
            "outcomePrices": "[\"0.25\", \"0.75\"]",
            "outcomes": "[\"Yes\", \"No\"]"
        }));
        let m = PolymarketAdapter::parse_market(raw).unwrap();
        assert!((m.probability - 0.25).abs() < 1e-9);
        assert_eq!(m.outcomes[0].name, "Yes");
    }

    #[test]
    fn test_missing_prices_default_to_half() {
        let raw = raw_from(json!({"id": "1", "question": "Q?"}));
        let m = PolymarketAdapter::parse_market(raw).unwrap();
        assert!((m.probability - 0.5).abs() < 1e-9);
        assert_eq!(m.outcomes.len(), 2);
        assert!((m.outcomes[0].probability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_resolved_requires_closed_and_inactive() {
        let m = PolymarketAdapter::parse_market(raw_from(
            json!({"id": "1", "question": "Q?", "closed": true, "active": false}),
        ))
        .unwrap();
        assert!(m.resolved);

        let m = PolymarketAdapter::parse_market(raw_from(
            json!({"id": "1", "question": "Q?", "closed": true, "active": true}),
        ))
        .unwrap();
        assert!(!m.resolved);
    }

    #[test]
    fn test_business_tag_maps_to_economics() {
        let raw = raw_from(json!({
            "id": "1",
            "question": "Q?",
            "tags": ["Business"]
        }));
        assert_eq!(
            PolymarketAdapter::parse_market(raw).unwrap().category,
            Category::Economics
        );
    }

    #[test]
    fn test_url_falls_back_to_id_without_slug() {
        let raw = raw_from(json!({"id": "42", "question": "Q?"}));
        let m = PolymarketAdapter::parse_market(raw).unwrap();
        assert_eq!(m.url, "https://polymarket.com/market/42");
    }

    #[test]
    fn test_value_f64_accepts_number_and_string() {
        assert_eq!(value_f64(&json!(1.5)), Some(1.5));
        assert_eq!(value_f64(&json!("1.5")), Some(1.5));
        assert_eq!(value_f64(&json!("abc")), None);
        assert_eq!(value_f64(&json!(null)), None);
    }

    #[test]
    fn test_value_list_handles_malformed_string() {
        assert!(value_list(&Some(json!("not json"))).is_empty());
        assert!(value_list(&None).is_empty());
    }

    #[tokio::test]
    async fn test_list_categories_sorted_unique() {
        let adapter = PolymarketAdapter::new().unwrap();
        let cats = adapter.list_categories().await.unwrap();
        assert!(cats.windows(2).all(|w| w[0] < w[1]));
        assert!(cats.contains(&Category::Economics));
        assert!(!cats.contains(&Category::Gaming));
    }
}
