//! Normalized market schema shared by every platform adapter.
//!
//! Upstream payloads are decoded into these records at the adapter
//! boundary; everything downstream (matching, arbitrage, the tool
//! surface) works only with this shape. Prices are probabilities in
//! [0,1]; monetary quantities keep their platform-native units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FederationError;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Closed category vocabulary. Adapters map platform-raw tags into this
/// set; unknown tags become `Other`. Platform-raw strings never reach
/// the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Crypto,
    Sports,
    Ai,
    Technology,
    Science,
    Economics,
    Finance,
    Entertainment,
    Gaming,
    Health,
    Other,
}

impl Category {
    /// All categories in the vocabulary (useful for iteration).
    pub const ALL: &'static [Category] = &[
        Category::Politics,
        Category::Crypto,
        Category::Sports,
        Category::Ai,
        Category::Technology,
        Category::Science,
        Category::Economics,
        Category::Finance,
        Category::Entertainment,
        Category::Gaming,
        Category::Health,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Crypto => "crypto",
            Category::Sports => "sports",
            Category::Ai => "ai",
            Category::Technology => "technology",
            Category::Science => "science",
            Category::Economics => "economics",
            Category::Finance => "finance",
            Category::Entertainment => "entertainment",
            Category::Gaming => "gaming",
            Category::Health => "health",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "politics" => Ok(Category::Politics),
            "crypto" => Ok(Category::Crypto),
            "sports" => Ok(Category::Sports),
            "ai" => Ok(Category::Ai),
            "technology" => Ok(Category::Technology),
            "science" => Ok(Category::Science),
            "economics" => Ok(Category::Economics),
            "finance" => Ok(Category::Finance),
            "entertainment" => Ok(Category::Entertainment),
            "gaming" => Ok(Category::Gaming),
            "health" => Ok(Category::Health),
            "other" => Ok(Category::Other),
            _ => Err(FederationError::InvalidArgument(format!(
                "unknown category: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome / PricePoint
// ---------------------------------------------------------------------------

/// One named side of a market with its own standalone price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub name: String,
    pub probability: f64,
}

impl Outcome {
    pub fn new(name: impl Into<String>, probability: f64) -> Self {
        Outcome {
            name: name.into(),
            probability,
        }
    }
}

/// A historical price observation. `price_history` is append-only and
/// starts empty at decode time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Unified market representation across all platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Short lowercase tag of the source platform.
    pub platform: String,
    /// Opaque per-platform identifier.
    pub native_id: String,
    /// Canonical web URL for human inspection.
    pub url: String,

    pub title: String,
    pub description: String,
    pub category: Category,

    /// The "Yes" probability, in [0,1].
    pub probability: f64,
    /// Binary markets carry exactly [Yes=p, No=1-p]; multi-outcome
    /// markets list every contract at its own standalone price.
    pub outcomes: Vec<Outcome>,

    /// Platform-native units; not unified across platforms.
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub closes_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolution: Option<String>,

    /// Decode time of this snapshot.
    pub last_fetched: DateTime<Utc>,
    pub price_history: Vec<PricePoint>,
}

impl Market {
    /// Federation-wide key: `"{platform}:{native_id}"`. Stable for the
    /// lifetime of the upstream market.
    pub fn id(&self) -> String {
        format!("{}:{}", self.platform, self.native_id)
    }

    /// The [Yes=p, No=1-p] outcome pair every binary market carries.
    pub fn binary_outcomes(probability: f64) -> Vec<Outcome> {
        vec![
            Outcome::new("Yes", probability),
            Outcome::new("No", 1.0 - probability),
        ]
    }

    /// Check the probability bounds invariant on the record and every
    /// outcome. Adapters clamp before construction, so a violation here
    /// is an adapter bug, not an upstream condition.
    pub fn validate(&self) -> Result<(), FederationError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(FederationError::Invariant(format!(
                "market {} has probability {} outside [0,1]",
                self.id(),
                self.probability
            )));
        }
        for outcome in &self.outcomes {
            if !(0.0..=1.0).contains(&outcome.probability) {
                return Err(FederationError::Invariant(format!(
                    "market {} outcome '{}' has probability {} outside [0,1]",
                    self.id(),
                    outcome.name,
                    outcome.probability
                )));
            }
        }
        Ok(())
    }

    /// Minimal market for unit tests elsewhere in the crate.
    #[cfg(test)]
    pub(crate) fn stub(platform: &str, native_id: &str, title: &str, probability: f64) -> Self {
        Market {
            platform: platform.to_string(),
            native_id: native_id.to_string(),
            url: format!("https://example.com/{native_id}"),
            title: title.to_string(),
            description: String::new(),
            category: Category::Other,
            probability,
            outcomes: Market::binary_outcomes(probability),
            volume: None,
            liquidity: None,
            created_at: Utc::now(),
            closes_at: None,
            resolved: false,
            resolution: None,
            last_fetched: Utc::now(),
            price_history: Vec::new(),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({:.0}% | {})",
            self.platform,
            self.title,
            self.probability * 100.0,
            self.category,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let m = Market::stub("manifold", "abc123", "Q?", 0.4);
        assert_eq!(m.id(), "manifold:abc123");
    }

    #[test]
    fn test_binary_outcomes_sum_to_one() {
        let outcomes = Market::binary_outcomes(0.37);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].name, "Yes");
        assert_eq!(outcomes[1].name, "No");
        let sum = outcomes[0].probability + outcomes[1].probability;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_accepts_bounds() {
        assert!(Market::stub("kalshi", "T1", "Q?", 0.0).validate().is_ok());
        assert!(Market::stub("kalshi", "T1", "Q?", 1.0).validate().is_ok());
        assert!(Market::stub("kalshi", "T1", "Q?", 0.5).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_probability() {
        let mut m = Market::stub("kalshi", "T1", "Q?", 0.5);
        m.probability = 1.5;
        m.outcomes = Vec::new();
        let err = m.validate().unwrap_err();
        assert!(matches!(err, FederationError::Invariant(_)));
        assert!(format!("{err}").contains("kalshi:T1"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_outcome() {
        let mut m = Market::stub("predictit", "99", "Q?", 0.5);
        m.outcomes = vec![Outcome::new("Candidate A", -0.1)];
        assert!(matches!(
            m.validate(),
            Err(FederationError::Invariant(_))
        ));
    }

    #[test]
    fn test_category_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Category::Ai).unwrap(), "\"ai\"");
        assert_eq!(
            serde_json::to_string(&Category::Entertainment).unwrap(),
            "\"entertainment\""
        );
    }

    #[test]
    fn test_category_from_str_roundtrip() {
        for cat in Category::ALL {
            let parsed: Category = cat.as_str().parse().unwrap();
            assert_eq!(parsed, *cat);
        }
        assert!("memes".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_from_str_case_insensitive() {
        assert_eq!("Politics".parse::<Category>().unwrap(), Category::Politics);
        assert_eq!("AI".parse::<Category>().unwrap(), Category::Ai);
    }

    #[test]
    fn test_market_serialization_roundtrip() {
        let m = Market::stub("polymarket", "0xfeed", "Will it happen?", 0.62);
        let json = serde_json::to_string(&m).unwrap();
        let parsed: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.native_id, "0xfeed");
        assert_eq!(parsed.category, Category::Other);
        assert!((parsed.probability - 0.62).abs() < 1e-9);
        assert!(parsed.price_history.is_empty());
    }

    #[test]
    fn test_market_display() {
        let m = Market::stub("kalshi", "T1", "Will CPI exceed 3%?", 0.4);
        let s = format!("{m}");
        assert!(s.contains("kalshi"));
        assert!(s.contains("CPI"));
    }
}
