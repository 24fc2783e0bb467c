//! Cross-platform analytics: equivalence matching and arbitrage
//! detection over the normalized market pool.

pub mod arbitrage;
pub mod matching;
