//! Rate-limited fetcher wrapper.
//!
//! Wraps any PageFetcher with a token bucket from the governor crate, so a
//! single process never exceeds the configured request rate however many
//! tasks are fetching at once.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::FetchResult;
use crate::traits::fetcher::{FetchedPage, PageFetcher};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces rate limits.
pub struct RateLimitedFetcher<F: PageFetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

/// Zero would disable the limiter entirely; treat it as one.
fn at_least_one(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

impl<F: PageFetcher> RateLimitedFetcher<F> {
    /// Create a new rate-limited fetcher.
    ///
    /// # Arguments
    /// * `fetcher` - The underlying fetcher to wrap
    /// * `requests_per_second` - Maximum requests per second
    pub fn new(fetcher: F, requests_per_second: u32) -> Self {
        Self::with_quota(fetcher, Quota::per_second(at_least_one(requests_per_second)))
    }

    /// Create with a custom quota.
    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create with burst support.
    pub fn with_burst(fetcher: F, requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(at_least_one(requests_per_second))
            .allow_burst(at_least_one(burst));
        Self::with_quota(fetcher, quota)
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        self.limiter.until_ready().await;
        self.inner.fetch(url).await
    }
}

/// Extension trait for easy rate limiting.
pub trait FetcherExt: PageFetcher + Sized {
    /// Wrap this fetcher with rate limiting.
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, requests_per_second)
    }

    /// Wrap with rate limiting and burst support.
    fn rate_limited_with_burst(self, requests_per_second: u32, burst: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::with_burst(self, requests_per_second, burst)
    }
}

impl<F: PageFetcher + Sized> FetcherExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;
    use std::time::Instant;

    #[tokio::test]
    async fn test_rate_limiting() {
        let mock = MockFetcher::new()
            .with_page("https://example.com/1", "Page 1")
            .with_page("https://example.com/2", "Page 2")
            .with_page("https://example.com/3", "Page 3");

        // 2 requests per second
        let fetcher = mock.rate_limited(2);

        let start = Instant::now();
        for url in ["https://example.com/1", "https://example.com/2", "https://example.com/3"] {
            fetcher.fetch(url).await.unwrap();
        }
        let elapsed = start.elapsed();

        // First is immediate, the next two wait for the bucket to refill
        assert!(elapsed.as_millis() >= 500, "Rate limiting not working: {:?}", elapsed);
        assert_eq!(fetcher.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_burst_allows_immediate_requests() {
        let mock = MockFetcher::new().with_page("https://example.com/1", "Page 1");
        let fetcher = mock.rate_limited_with_burst(1, 3);

        let start = Instant::now();
        for _ in 0..3 {
            fetcher.fetch("https://example.com/1").await.unwrap();
        }
        assert!(start.elapsed().as_millis() < 500);
    }

    #[tokio::test]
    async fn test_zero_rate_is_clamped() {
        let mock = MockFetcher::new().with_page("https://example.com/1", "Page 1");
        let fetcher = mock.rate_limited(0);
        assert!(fetcher.fetch("https://example.com/1").await.is_ok());
    }
}
