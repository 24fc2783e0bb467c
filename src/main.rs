//! Entry point. Loads configuration, initialises structured logging on
//! stderr (stdout carries the MCP frames), builds the enabled platform
//! adapters, and serves the tool surface over stdio until the client
//! disconnects.

use std::sync::Arc;

use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};
use tracing::info;

use oddsmesh::config::AppConfig;
use oddsmesh::limiter::RateLimiter;
use oddsmesh::orchestrator::Orchestrator;
use oddsmesh::platforms::{
    kalshi::KalshiAdapter, manifold::ManifoldAdapter, metaculus::MetaculusAdapter,
    polymarket::PolymarketAdapter, predictit::PredictItAdapter, PlatformAdapter,
};
use oddsmesh::server::MarketServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (non-fatal when missing).
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default("config.toml")?;
    init_logging();

    let adapters = build_adapters(&cfg)?;
    anyhow::ensure!(!adapters.is_empty(), "no platforms enabled in config");

    let limiter = RateLimiter::with_limits(cfg.rate_limits.clone());
    let orchestrator = Arc::new(Orchestrator::new(adapters, limiter));

    info!(
        platforms = ?orchestrator.platform_names(),
        "oddsmesh serving MCP over stdio"
    );

    let service = MarketServer::new(Arc::clone(&orchestrator))
        .serve(stdio())
        .await?;
    service.waiting().await?;

    orchestrator.close().await;
    info!("oddsmesh shut down cleanly");
    Ok(())
}

/// Build one adapter per enabled platform.
fn build_adapters(cfg: &AppConfig) -> Result<Vec<Arc<dyn PlatformAdapter>>> {
    let mut adapters: Vec<Arc<dyn PlatformAdapter>> = Vec::new();

    if cfg.platforms.manifold.enabled {
        adapters.push(Arc::new(ManifoldAdapter::new()?));
    }
    if cfg.platforms.polymarket.enabled {
        adapters.push(Arc::new(PolymarketAdapter::new()?));
    }
    if cfg.platforms.metaculus.enabled {
        adapters.push(Arc::new(MetaculusAdapter::new()?));
    }
    if cfg.platforms.predictit.enabled {
        adapters.push(Arc::new(PredictItAdapter::new()?));
    }
    if cfg.platforms.kalshi.enabled {
        let token = match &cfg.platforms.kalshi.api_token_env {
            Some(env_name) => Some(AppConfig::resolve_env(env_name)?),
            None => None,
        };
        adapters.push(Arc::new(KalshiAdapter::new(token)?));
    }

    Ok(adapters)
}

/// Initialise the `tracing` subscriber on stderr.
///
/// `RUST_LOG` controls the filter (default `oddsmesh=info`);
/// `ODDSMESH_LOG_JSON` switches to structured JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oddsmesh=info"));

    if std::env::var("ODDSMESH_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    }
}
