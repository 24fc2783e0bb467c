//! Per-platform token-bucket rate limiting for upstream API calls.
//!
//! Each platform has its own bucket sized to its requests-per-minute
//! allowance. Buckets start full and refill continuously; a caller that
//! finds the bucket empty sleeps until one token has accrued. Token
//! state is updated under a mutex, but the sleep itself happens outside
//! it so one throttled platform never blocks acquires on another.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Requests per minute for a platform with no configured limit.
const DEFAULT_LIMIT: u32 = 60;

/// Default per-platform limits (requests per minute).
fn default_limits() -> HashMap<String, u32> {
    HashMap::from([
        ("kalshi".to_string(), 10),
        ("predictit".to_string(), 20),
        ("polymarket".to_string(), 30),
        ("metaculus".to_string(), 60),
        ("manifold".to_string(), 100),
    ])
}

struct Bucket {
    tokens: f64,
    last_update: Instant,
}

pub struct RateLimiter {
    limits: HashMap<String, u32>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Limiter with the default per-platform rates.
    pub fn new() -> Self {
        RateLimiter {
            limits: default_limits(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter with custom rates layered over the defaults.
    pub fn with_limits(overrides: HashMap<String, u32>) -> Self {
        let mut limits = default_limits();
        limits.extend(overrides);
        RateLimiter {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The configured requests-per-minute rate for a platform.
    pub fn limit_for(&self, platform: &str) -> u32 {
        self.limits.get(platform).copied().unwrap_or(DEFAULT_LIMIT)
    }

    /// Take one token for `platform`, sleeping until one is available.
    ///
    /// When the bucket is empty the caller reserves the next token to
    /// accrue: the bucket is zeroed under the lock and the sleep covers
    /// exactly the refill interval, so concurrent callers cannot
    /// double-spend.
    pub async fn acquire(&self, platform: &str) {
        let limit = self.limit_for(platform) as f64;
        let per_second = limit / 60.0;

        let wait = {
            let mut buckets = self.buckets.lock().await;
            let now = Instant::now();
            let bucket = buckets.entry(platform.to_string()).or_insert(Bucket {
                tokens: limit,
                last_update: now,
            });

            let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * per_second).min(limit);
            bucket.last_update = now;

            if bucket.tokens < 1.0 {
                let wait = (1.0 - bucket.tokens) / per_second;
                // Consume the token that accrues during the sleep.
                bucket.tokens = 0.0;
                Some(Duration::from_secs_f64(wait))
            } else {
                bucket.tokens -= 1.0;
                None
            }
        };

        if let Some(wait) = wait {
            debug!(
                platform,
                wait_secs = wait.as_secs_f64(),
                "rate limit reached, sleeping"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.limit_for("kalshi"), 10);
        assert_eq!(limiter.limit_for("predictit"), 20);
        assert_eq!(limiter.limit_for("polymarket"), 30);
        assert_eq!(limiter.limit_for("metaculus"), 60);
        assert_eq!(limiter.limit_for("manifold"), 100);
    }

    #[test]
    fn test_unknown_platform_defaults_to_sixty() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.limit_for("bovada"), 60);
    }

    #[test]
    fn test_overrides_layer_over_defaults() {
        let limiter =
            RateLimiter::with_limits(HashMap::from([("kalshi".to_string(), 5)]));
        assert_eq!(limiter.limit_for("kalshi"), 5);
        assert_eq!(limiter.limit_for("manifold"), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_starts_full() {
        let limiter = RateLimiter::with_limits(HashMap::from([("test".to_string(), 10)]));
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire("test").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_sleeps_refill_interval() {
        let limiter = RateLimiter::with_limits(HashMap::from([("test".to_string(), 2)]));
        limiter.acquire("test").await;
        limiter.acquire("test").await;

        let start = Instant::now();
        limiter.acquire("test").await;
        // 2/min means one token accrues every 30 seconds.
        assert!((start.elapsed().as_secs_f64() - 30.0).abs() < 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_refill_over_time() {
        let limiter = RateLimiter::with_limits(HashMap::from([("test".to_string(), 60)]));
        for _ in 0..60 {
            limiter.acquire("test").await;
        }

        // A minute of idle time refills the bucket completely.
        tokio::time::advance(Duration::from_secs(60)).await;
        let start = Instant::now();
        for _ in 0..60 {
            limiter.acquire("test").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_clamped_to_bucket_size() {
        let limiter = RateLimiter::with_limits(HashMap::from([("test".to_string(), 2)]));
        limiter.acquire("test").await;

        // Far more idle time than the bucket can hold.
        tokio::time::advance(Duration::from_secs(600)).await;
        let start = Instant::now();
        limiter.acquire("test").await;
        limiter.acquire("test").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        // Third acquire must wait: the bucket held 2, not 20.
        limiter.acquire("test").await;
        assert!(start.elapsed() >= Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_platforms_have_independent_buckets() {
        let limiter = RateLimiter::with_limits(HashMap::from([
            ("a".to_string(), 1),
            ("b".to_string(), 1),
        ]));
        let start = Instant::now();
        limiter.acquire("a").await;
        limiter.acquire("b").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
