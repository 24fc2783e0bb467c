//! Manifold Markets adapter.
//!
//! API docs: https://docs.manifold.markets/api
//! Base URL: https://api.manifold.markets/v0
//! Auth: not required for reads.
//!
//! Manifold exposes server-side search (`term=`), probabilities directly
//! on the payload, millisecond-epoch timestamps, and group slugs for
//! categorisation. The `url` field is occasionally absent; we fall back
//! to `https://manifold.markets/market/{id}` (the format is not
//! officially contracted).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{build_client, datetime_from_millis, send_json, PlatformAdapter, SEARCH_LIMIT};
use crate::error::FederationError;
use crate::schema::{Category, Market};

const BASE_URL: &str = "https://api.manifold.markets/v0";
const PLATFORM_NAME: &str = "manifold";

/// Group slug → normalized category. The first matching slug on a
/// market wins.
const CATEGORY_MAP: &[(&str, Category)] = &[
    ("politics", Category::Politics),
    ("us-politics", Category::Politics),
    ("world-politics", Category::Politics),
    ("sports", Category::Sports),
    ("crypto", Category::Crypto),
    ("bitcoin", Category::Crypto),
    ("ethereum", Category::Crypto),
    ("ai", Category::Ai),
    ("technology", Category::Technology),
    ("science", Category::Science),
    ("economics", Category::Economics),
    ("finance", Category::Finance),
    ("entertainment", Category::Entertainment),
    ("gaming", Category::Gaming),
];

// ---------------------------------------------------------------------------
// API response types (Manifold JSON → Rust)
// ---------------------------------------------------------------------------

/// The market shape returned by `/v0/market/{id}` and
/// `/v0/search-markets`. Only the fields we decode are listed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    id: String,
    question: String,
    /// Plain string on lite markets, rich-text JSON on full ones.
    #[serde(default)]
    description: serde_json::Value,
    #[serde(default)]
    url: Option<String>,

    /// "BINARY", "MULTIPLE_CHOICE", ...
    #[serde(default)]
    outcome_type: Option<String>,
    /// Implied probability for binary markets.
    #[serde(default)]
    probability: Option<f64>,

    #[serde(default)]
    volume: Option<f64>,

    /// Milliseconds since epoch.
    created_time: i64,
    #[serde(default)]
    close_time: Option<i64>,

    #[serde(default)]
    is_resolved: bool,
    #[serde(default)]
    resolution: Option<String>,

    #[serde(default)]
    group_slugs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct ManifoldAdapter {
    http: Client,
}

impl ManifoldAdapter {
    pub fn new() -> Result<Self, FederationError> {
        Ok(ManifoldAdapter {
            http: build_client(PLATFORM_NAME)?,
        })
    }

    fn map_category(slugs: &[String]) -> Category {
        for slug in slugs {
            if let Some((_, cat)) = CATEGORY_MAP.iter().find(|(s, _)| s == slug) {
                return *cat;
            }
        }
        Category::Other
    }

    /// Decode one Manifold market payload into the normalized schema.
    fn parse_market(raw: RawMarket) -> Result<Market, FederationError> {
        let category = Self::map_category(&raw.group_slugs);
        let probability = raw.probability.unwrap_or(0.5).clamp(0.0, 1.0);

        let outcomes = if raw.outcome_type.as_deref() == Some("BINARY") {
            Market::binary_outcomes(probability)
        } else {
            Vec::new()
        };

        // Full markets carry rich-text description objects; flatten
        // anything non-string to its JSON text.
        let description = match raw.description {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };

        let url = raw
            .url
            .unwrap_or_else(|| format!("https://manifold.markets/market/{}", raw.id));

        let market = Market {
            platform: PLATFORM_NAME.to_string(),
            native_id: raw.id,
            url,
            title: raw.question,
            description,
            category,
            probability,
            outcomes,
            volume: raw.volume,
            liquidity: None, // not exposed on the market payload
            created_at: datetime_from_millis(raw.created_time),
            closes_at: raw.close_time.map(datetime_from_millis),
            resolved: raw.is_resolved,
            resolution: raw.resolution,
            last_fetched: Utc::now(),
            price_history: Vec::new(),
        };
        market.validate()?;
        Ok(market)
    }
}

#[async_trait]
impl PlatformAdapter for ManifoldAdapter {
    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    async fn get_market(&self, native_id: &str) -> Result<Market, FederationError> {
        let url = format!("{BASE_URL}/market/{native_id}");
        debug!(url = %url, "fetching Manifold market");
        let raw: RawMarket = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        Self::parse_market(raw)
    }

    async fn search_markets(
        &self,
        query: &str,
        _category: Option<Category>,
    ) -> Result<Vec<Market>, FederationError> {
        let url = format!(
            "{BASE_URL}/search-markets?term={}&limit={SEARCH_LIMIT}",
            urlencoding::encode(query),
        );
        debug!(url = %url, "searching Manifold markets");
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
        // A category this platform never produces yields no markets.
        if !CATEGORY_MAP.iter().any(|(_, c)| *c == category) {
            return Ok(Vec::new());
        }

        let url = format!("{BASE_URL}/search-markets?term=&filter=open&limit={limit}");
        debug!(url = %url, category = %category, "browsing Manifold markets");
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
    fn test_decode_binary_market() {
        let raw = raw_from(json!({
            "id": "m1",
            "question": "Q?",
            "probability": 0.40,
            "createdTime": 1_704_067_200_000i64,
            "outcomeType": "BINARY",
            "groupSlugs": ["crypto"],
            "url": "https://manifold.markets/x/q"
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();

        assert_eq!(m.platform, "manifold");
        assert_eq!(m.native_id, "m1");
        assert_eq!(m.id(), "manifold:m1");
        assert!((m.probability - 0.40).abs() < 1e-9);
        assert_eq!(m.category, Category::Crypto);
        assert_eq!(m.outcomes.len(), 2);
        assert_eq!(m.outcomes[0].name, "Yes");
        assert!((m.outcomes[0].probability - 0.40).abs() < 1e-9);
        assert_eq!(m.outcomes[1].name, "No");
        assert!((m.outcomes[1].probability - 0.60).abs() < 1e-9);
        assert!(!m.resolved);
        assert_eq!(m.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_first_matching_slug_wins() {
        let raw = raw_from(json!({
            "id": "m2",
            "question": "Q?",
            "createdTime": 0,
            "groupSlugs": ["unknown-tag", "sports", "crypto"]
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();
        assert_eq!(m.category, Category::Sports);
    }

    #[test]
    fn test_unknown_slugs_map_to_other() {
        let raw = raw_from(json!({
            "id": "m3",
            "question": "Q?",
            "createdTime": 0,
            "groupSlugs": ["whales", "memes"]
        }));
        assert_eq!(
            ManifoldAdapter::parse_market(raw).unwrap().category,
            Category::Other
        );
    }

    #[test]
    fn test_missing_probability_defaults_to_half() {
        let raw = raw_from(json!({
            "id": "m4",
            "question": "Q?",
            "createdTime": 0,
            "outcomeType": "MULTIPLE_CHOICE"
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();
        assert!((m.probability - 0.5).abs() < 1e-9);
        // Non-binary markets have no synthetic Yes/No pair.
        assert!(m.outcomes.is_empty());
    }

    #[test]
    fn test_out_of_range_probability_clamped() {
        let raw = raw_from(json!({
            "id": "m5",
            "question": "Q?",
            "probability": 1.5,
            "createdTime": 0,
            "outcomeType": "BINARY"
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();
        assert!((m.probability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_url_fallback_when_absent() {
        let raw = raw_from(json!({
            "id": "m6",
            "question": "Q?",
            "createdTime": 0
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();
        assert_eq!(m.url, "https://manifold.markets/market/m6");
    }

    #[test]
    fn test_rich_text_description_flattened() {
        let raw = raw_from(json!({
            "id": "m7",
            "question": "Q?",
            "createdTime": 0,
            "description": {"type": "doc", "content": []}
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();
        assert!(m.description.contains("doc"));
    }

    #[test]
    fn test_resolution_carried_through() {
        let raw = raw_from(json!({
            "id": "m8",
            "question": "Q?",
            "createdTime": 0,
            "isResolved": true,
            "resolution": "YES",
            "closeTime": 1_704_067_200_000i64
        }));
        let m = ManifoldAdapter::parse_market(raw).unwrap();
        assert!(m.resolved);
        assert_eq!(m.resolution.as_deref(), Some("YES"));
        assert!(m.closes_at.is_some());
    }

    #[tokio::test]
    async fn test_list_categories_sorted_unique() {
        let adapter = ManifoldAdapter::new().unwrap();
        let cats = adapter.list_categories().await.unwrap();
        let mut sorted = cats.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(cats, sorted);
        assert!(cats.contains(&Category::Politics));
        assert!(cats.contains(&Category::Gaming));
        assert!(!cats.contains(&Category::Health));
    }
}
