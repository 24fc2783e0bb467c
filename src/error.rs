//! Error types shared across the federation engine.
//!
//! Three kinds cover everything the engine can report:
//! - `Platform`: any failure attributable to a single upstream (HTTP
//!   non-2xx, connection error, decode failure, timeout). Federated
//!   operations absorb these into a per-platform errors list; point
//!   operations propagate them.
//! - `InvalidArgument`: a caller error (unknown platform, out-of-range
//!   parameter). Always propagates.
//! - `Invariant`: a probability outside [0,1] reaching construction.
//!   Indicates an adapter bug and aborts the enclosing operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("[{platform}] {message}")]
    Platform { platform: String, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl FederationError {
    /// Build a `Platform` error from anything displayable.
    pub fn platform(platform: &str, message: impl std::fmt::Display) -> Self {
        FederationError::Platform {
            platform: platform.to_string(),
            message: message.to_string(),
        }
    }

    /// Wrap an unexpected failure at the adapter boundary. Anything that
    /// is not already a typed upstream failure becomes
    /// `[platform] internal: ...` so the fan-out only ever sees the
    /// three-kind union.
    pub fn internal(platform: &str, message: impl std::fmt::Display) -> Self {
        FederationError::Platform {
            platform: platform.to_string(),
            message: format!("internal: {message}"),
        }
    }

    /// The platform this error is attributable to, if any.
    pub fn platform_name(&self) -> Option<&str> {
        match self {
            FederationError::Platform { platform, .. } => Some(platform),
            _ => None,
        }
    }
}
