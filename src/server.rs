//! MCP tool surface.
//!
//! Maps the eight named tools onto orchestrator operations. Each tool
//! returns one JSON object pretty-printed into a single text content
//! block. Argument schemas are derived from the parameter structs;
//! invalid arguments surface as protocol-level errors.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router, ErrorData, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::analysis::arbitrage::DEFAULT_MIN_SPREAD;
use crate::error::FederationError;
use crate::orchestrator::Orchestrator;

// ---------------------------------------------------------------------------
// Tool parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMarketsParams {
    #[schemars(description = "Search query (e.g. 'Will Trump win 2024?')")]
    pub query: String,
    #[schemars(description = "Optional: restrict the search to these platforms")]
    pub platforms: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetMarketOddsParams {
    #[schemars(description = "Platform name (manifold, polymarket, metaculus, predictit, kalshi)")]
    pub platform: String,
    #[schemars(description = "The market's platform-native ID")]
    pub market_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BrowseCategoryParams {
    #[schemars(description = "Normalized category to browse (e.g. politics, crypto, ai)")]
    pub category: String,
    #[schemars(description = "Max markets to return (default 20)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TrackMarketParams {
    #[schemars(description = "Platform name (manifold, polymarket, metaculus, predictit, kalshi)")]
    pub platform: String,
    #[schemars(description = "The market's platform-native ID")]
    pub market_id: String,
    #[schemars(description = "Optional friendly name for the market")]
    pub alias: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindArbitrageParams {
    #[schemars(description = "Minimum probability difference to report (default 0.05)")]
    pub min_spread: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ComparePlatformsParams {
    #[schemars(description = "Search query to find markets to compare")]
    pub query: String,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MarketServer {
    orchestrator: Arc<Orchestrator>,
    tool_router: ToolRouter<Self>,
}

impl MarketServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        MarketServer {
            orchestrator,
            tool_router: Self::tool_router(),
        }
    }

    /// Serialize a result object into the single text block every tool
    /// returns.
    fn reply<T: Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| ErrorData::internal_error(format!("serialization failed: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Caller errors become invalid-params; upstream and internal
    /// failures escaping a point operation become internal errors
    /// carrying the `[platform] message` text.
    fn tool_error(err: FederationError) -> ErrorData {
        match err {
            FederationError::InvalidArgument(_) => ErrorData::invalid_params(err.to_string(), None),
            _ => ErrorData::internal_error(err.to_string(), None),
        }
    }
}

#[tool_router]
impl MarketServer {
    /// Federated free-text search; an optional platform list filters
    /// which adapters are called.
    #[tool(description = "Search for prediction markets across platforms")]
    async fn search_markets(
        &self,
        Parameters(params): Parameters<SearchMarketsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .orchestrator
            .search_markets(&params.query, params.platforms.as_deref())
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    /// Single-platform point read.
    #[tool(description = "Get current odds for a specific market")]
    async fn get_market_odds(
        &self,
        Parameters(params): Parameters<GetMarketOddsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .orchestrator
            .get_market_odds(&params.platform, &params.market_id)
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    #[tool(description = "List available market categories")]
    async fn list_categories(&self) -> Result<CallToolResult, ErrorData> {
        let result = self
            .orchestrator
            .list_categories()
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    /// Aggregated browse: the union of every platform's results,
    /// sorted by volume descending and truncated.
    #[tool(description = "Browse markets in a specific category")]
    async fn browse_category(
        &self,
        Parameters(params): Parameters<BrowseCategoryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let limit = params.limit.unwrap_or(20) as usize;
        let result = self
            .orchestrator
            .browse_category(&params.category, limit)
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    /// Verifies the market exists before registering it.
    #[tool(description = "Add a market to your tracking watchlist")]
    async fn track_market(
        &self,
        Parameters(params): Parameters<TrackMarketParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .orchestrator
            .track_market(&params.platform, &params.market_id, params.alias)
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    #[tool(description = "Get all markets in your watchlist with current prices")]
    async fn get_tracked_markets(&self) -> Result<CallToolResult, ErrorData> {
        let result = self
            .orchestrator
            .get_tracked_markets()
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    #[tool(description = "Find price discrepancies across platforms")]
    async fn find_arbitrage(
        &self,
        Parameters(params): Parameters<FindArbitrageParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let min_spread = params.min_spread.unwrap_or(DEFAULT_MIN_SPREAD);
        let result = self
            .orchestrator
            .find_arbitrage(min_spread)
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }

    #[tool(description = "Side-by-side odds comparison for markets matching a query")]
    async fn compare_platforms(
        &self,
        Parameters(params): Parameters<ComparePlatformsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .orchestrator
            .compare_platforms(&params.query)
            .await
            .map_err(Self::tool_error)?;
        Self::reply(&result)
    }
}

#[tool_handler]
impl ServerHandler for MarketServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "oddsmesh".into(),
                title: Some("Prediction Market Federation".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only prediction-market aggregation. \
                 \n- search_markets({ query, platforms? }) — federated free-text search. \
                 \n- get_market_odds({ platform, market_id }) — one market's current odds. \
                 \n- list_categories() — the normalized category vocabulary in use. \
                 \n- browse_category({ category, limit? }) — top markets by volume in a category. \
                 \n- track_market({ platform, market_id, alias? }) — add a market to the watchlist. \
                 \n- get_tracked_markets() — re-fetch everything on the watchlist. \
                 \n- find_arbitrage({ min_spread? }) — price spreads between equivalent markets. \
                 \n- compare_platforms({ query }) — side-by-side odds for matching markets. \
                 \nPrices are point-in-time snapshots from independent sources; a federated \
                 call can partially fail, in which case the per-platform errors array is \
                 populated and the remaining platforms' results are still returned."
                    .into(),
            ),
        }
    }
}
