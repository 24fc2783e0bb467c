//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` into strongly-typed structs. Secrets (the
//! optional Kalshi token) are referenced by env-var name in the config
//! and resolved at runtime; nothing is mutated at module scope. Every
//! section has defaults, so the engine runs with no config file at all.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub platforms: PlatformsConfig,
    /// Requests-per-minute overrides, keyed by platform name.
    pub rate_limits: HashMap<String, u32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlatformsConfig {
    pub manifold: PlatformConfig,
    pub polymarket: PlatformConfig,
    pub metaculus: PlatformConfig,
    pub predictit: PlatformConfig,
    pub kalshi: KalshiConfig,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        PlatformsConfig {
            manifold: PlatformConfig::default(),
            polymarket: PlatformConfig::default(),
            metaculus: PlatformConfig::default(),
            predictit: PlatformConfig::default(),
            kalshi: KalshiConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlatformConfig {
    pub enabled: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KalshiConfig {
    pub enabled: bool,
    /// Name of the env var holding a bearer token, if one is needed.
    pub api_token_env: Option<String>,
}

impl Default for KalshiConfig {
    fn default() -> Self {
        KalshiConfig {
            enabled: true,
            api_token_env: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Resolve an environment variable name to its value. Used for
    /// secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
