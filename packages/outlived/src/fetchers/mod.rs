//! Fetcher implementations.
//!
//! - `HttpFetcher` - reqwest-backed GET with `Content-Location` capture
//! - `RateLimitedFetcher` - token-bucket wrapper for any fetcher
//! - `PopularityFetcher` - trailing pageview sums on top of a fetcher

pub mod http;
pub mod popularity;
pub mod rate_limited;

pub use http::HttpFetcher;
pub use popularity::PopularityFetcher;
pub use rate_limited::{FetcherExt, RateLimitedFetcher};
