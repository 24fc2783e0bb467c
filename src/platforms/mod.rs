//! Platform integrations.
//!
//! Defines the `PlatformAdapter` trait and provides implementations for
//! the five federated upstreams:
//! - Manifold — play-money exchange, `api.manifold.markets/v0`
//! - Polymarket — on-chain exchange, `gamma-api.polymarket.com`
//! - Metaculus — forecasting community, `metaculus.com/api2`
//! - PredictIt — politics-only exchange, `predictit.org/api/marketdata`
//! - Kalshi — regulated exchange, `api.elections.kalshi.com/trade-api/v2`
//!
//! Every adapter owns a long-lived HTTP client with a 30-second
//! per-request timeout and decodes its upstream's payloads into the
//! normalized `Market` schema through typed serde intermediates.

pub mod kalshi;
pub mod manifold;
pub mod metaculus;
pub mod polymarket;
pub mod predictit;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;

use crate::error::FederationError;
use crate::schema::{Category, Market};

/// Maximum markets returned by a single search.
pub(crate) const SEARCH_LIMIT: usize = 20;

const USER_AGENT: &str = "oddsmesh/0.1.0 (prediction-market-federation)";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Abstraction over prediction-market platforms.
///
/// The contract is read-only: four query operations plus an explicit
/// shutdown hook. Decoding is total — every operation either returns
/// normalized `Market`s or a `Platform` error; raw upstream shapes never
/// escape an adapter.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform tag used in ids, rate limiting, and error attribution.
    fn name(&self) -> &'static str;

    /// Fetch one market by its platform-native identifier.
    async fn get_market(&self, native_id: &str) -> Result<Market, FederationError>;

    /// Search for markets matching a free-text query (up to 20).
    async fn search_markets(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> Result<Vec<Market>, FederationError>;

    /// The normalized categories this platform can produce.
    async fn list_categories(&self) -> Result<Vec<Category>, FederationError>;

    /// Browse up to `limit` markets in one normalized category.
    async fn browse_category(
        &self,
        category: Category,
        limit: usize,
    ) -> Result<Vec<Market>, FederationError>;

    /// Release the adapter's HTTP client. The default is a no-op: the
    /// client tears down its connection pool on drop.
    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Build the long-lived HTTP client an adapter owns.
pub(crate) fn build_client(platform: &str) -> Result<reqwest::Client, FederationError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| {
            FederationError::internal(platform, format!("failed to build HTTP client: {e}"))
        })
}

/// Send a request and decode the JSON body, folding transport errors,
/// non-2xx statuses, and shape mismatches into `Platform` errors.
pub(crate) async fn send_json<T: DeserializeOwned>(
    platform: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, FederationError> {
    let response = request
        .send()
        .await
        .map_err(|e| FederationError::platform(platform, format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FederationError::platform(
            platform,
            format!("HTTP {status}: {body}"),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| FederationError::platform(platform, format!("failed to decode response: {e}")))
}

/// Millisecond-epoch timestamp to a timezone-aware instant.
pub(crate) fn datetime_from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// ISO 8601 / RFC 3339 string to a timezone-aware instant.
pub(crate) fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>().ok()
}
