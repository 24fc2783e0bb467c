//! Metaculus adapter.
//!
//! Base URL: https://www.metaculus.com/api2
//! Auth: not required for reads.
//!
//! Metaculus is a forecasting community, not an exchange: there is no
//! volume or liquidity, and the "price" is the community median
//! (`community_prediction.full.q2`). The `resolution` field has mixed
//! types in the wild (boolean-as-number, string, null) and is
//! stringified here, matching how consumers of this API have to treat
//! it.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{build_client, parse_rfc3339, send_json, PlatformAdapter, SEARCH_LIMIT};
use crate::error::FederationError;
use crate::schema::{Category, Market};

const BASE_URL: &str = "https://www.metaculus.com/api2";
const PLATFORM_NAME: &str = "metaculus";

/// Category name → normalized category. The first matching name on a
/// question wins.
const CATEGORY_MAP: &[(&str, Category)] = &[
    ("ai", Category::Ai),
    ("artificial intelligence", Category::Ai),
    ("technology", Category::Technology),
    ("tech", Category::Technology),
    ("science", Category::Science),
    ("biology", Category::Science),
    ("physics", Category::Science),
    ("space", Category::Science),
    ("climate", Category::Science),
    ("environment", Category::Science),
    ("crypto", Category::Crypto),
    ("cryptocurrency", Category::Crypto),
    ("bitcoin", Category::Crypto),
    ("finance", Category::Finance),
    ("economics", Category::Economics),
    ("politics", Category::Politics),
    ("geopolitics", Category::Politics),
    ("sports", Category::Sports),
    ("entertainment", Category::Entertainment),
    ("health", Category::Health),
    ("medicine", Category::Health),
];

// ---------------------------------------------------------------------------
// API response types (Metaculus JSON → Rust)
// ---------------------------------------------------------------------------

/// Paginated envelope from `/api2/questions/`.
#[derive(Debug, Deserialize)]
struct QuestionPage {
    #[serde(default)]
    results: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: i64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    page_url: Option<String>,

    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    close_time: Option<String>,

    /// "OPEN", "RESOLVED", ...
    #[serde(default)]
    active_state: Option<String>,
    /// Mixed types in the wild: number, boolean, string, null.
    #[serde(default)]
    resolution: Option<Value>,

    #[serde(default)]
    community_prediction: Option<CommunityPrediction>,
    #[serde(default)]
    categories: Vec<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct CommunityPrediction {
    #[serde(default)]
    full: Option<PredictionQuartiles>,
}

#[derive(Debug, Deserialize)]
struct PredictionQuartiles {
    /// The median.
    #[serde(default)]
    q2: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    name: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct MetaculusAdapter {
    http: Client,
}

impl MetaculusAdapter {
    pub fn new() -> Result<Self, FederationError> {
        Ok(MetaculusAdapter {
            http: build_client(PLATFORM_NAME)?,
        })
    }

    fn map_category(categories: &[RawCategory]) -> Category {
        for cat in categories {
            let name = cat.name.to_lowercase();
            if let Some((_, mapped)) = CATEGORY_MAP.iter().find(|(n, _)| *n == name) {
                return *mapped;
            }
        }
        Category::Other
    }

    /// Stringify the mixed-type resolution value. Null stays absent;
    /// everything else becomes its JSON text (strings unquoted).
    fn stringify_resolution(value: Option<Value>) -> Option<String> {
        match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Decode one Metaculus question payload into the normalized schema.
    fn parse_market(raw: RawQuestion) -> Result<Market, FederationError> {
        let category = Self::map_category(&raw.categories);

        // Community median, hidden on some questions until reveal.
        let probability = raw
            .community_prediction
            .as_ref()
            .and_then(|cp| cp.full.as_ref())
            .and_then(|full| full.q2)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let created_at = raw
            .created_time
            .as_deref()
            .and_then(parse_rfc3339)
            .unwrap_or_else(Utc::now);
        let closes_at = raw.close_time.as_deref().and_then(parse_rfc3339);

        let url = raw
            .page_url
            .unwrap_or_else(|| format!("https://www.metaculus.com/questions/{}/", raw.id));

        let market = Market {
            platform: PLATFORM_NAME.to_string(),
            native_id: raw.id.to_string(),
            url,
            title: raw.title,
            description: raw.description.unwrap_or_default(),
            category,
            probability,
            outcomes: Market::binary_outcomes(probability),
            volume: None,    // no trading volume on a forecasting site
            liquidity: None, // no liquidity concept
            created_at,
            closes_at,
            resolved: raw.active_state.as_deref() == Some("RESOLVED"),
            resolution: Self::stringify_resolution(raw.resolution),
            last_fetched: Utc::now(),
            price_history: Vec::new(),
        };
        market.validate()?;
        Ok(market)
    }
}

#[async_trait]
impl PlatformAdapter for MetaculusAdapter {
    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }

    async fn get_market(&self, native_id: &str) -> Result<Market, FederationError> {
        let url = format!("{BASE_URL}/questions/{native_id}/");
        debug!(url = %url, "fetching Metaculus question");
        let raw: RawQuestion = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        Self::parse_market(raw)
    }

    async fn search_markets(
        &self,
        query: &str,
        _category: Option<Category>,
    ) -> Result<Vec<Market>, FederationError> {
        let url = format!(
            "{BASE_URL}/questions/?search={}&limit={SEARCH_LIMIT}",
            urlencoding::encode(query),
        );
        debug!(url = %url, "searching Metaculus questions");
        let page: QuestionPage = send_json(PLATFORM_NAME, self.http.get(&url)).await?;
        page.results.into_iter().map(Self::parse_market).collect()
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
        // No server-side category filter; fetch recent and keep matches.
        let url = format!("{BASE_URL}/questions/?limit={limit}");
        debug!(url = %url, category = %category, "browsing Metaculus questions");
        let page: QuestionPage = send_json(PLATFORM_NAME, self.http.get(&url)).await?;

        let mut markets = Vec::new();
        for q in page.results {
            let market = Self::parse_market(q)?;
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
