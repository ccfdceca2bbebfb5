//! Configuration for scraping and queue behaviour.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::date::month_name;

/// Render API serving article HTML.
pub const DEFAULT_WIKI_BASE_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/html";

/// Wikimedia REST API root.
pub const DEFAULT_METRICS_BASE_URL: &str = "https://wikimedia.org/api/rest_v1";

/// Configuration for the scrape pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Queue that holds scrape tasks.
    ///
    /// Its emptiness gates new scans. Default: "scrape".
    pub queue_id: String,

    /// Base URL for day and person pages (no trailing slash).
    pub wiki_base_url: String,

    /// Base URL for the pageview metrics API (no trailing slash).
    pub metrics_base_url: String,

    /// Project whose pageviews are counted. Default: "en.wikipedia.org".
    pub project: String,

    /// User-Agent sent with every request.
    pub user_agent: String,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Sustained outbound request rate in single-process mode.
    pub requests_per_second: u32,

    /// Burst allowance on top of the sustained rate.
    pub burst: u32,

    /// How often the in-process queue looks for work. Default: 5s.
    pub poll_interval: Duration,

    /// Days without update after which a figure is expired. Default: 30.
    pub stale_after_days: i64,

    /// Length of the trailing pageview window. Default: 90.
    pub popularity_window_days: i64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            queue_id: "scrape".to_string(),
            wiki_base_url: DEFAULT_WIKI_BASE_URL.to_string(),
            metrics_base_url: DEFAULT_METRICS_BASE_URL.to_string(),
            project: "en.wikipedia.org".to_string(),
            user_agent: "Outlived/1.0".to_string(),
            request_timeout: Duration::from_secs(30),
            requests_per_second: 10,
            burst: 10,
            poll_interval: Duration::from_secs(5),
            stale_after_days: 30,
            popularity_window_days: 90,
        }
    }
}

impl ScrapeConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_id(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = queue_id.into();
        self
    }

    /// Set the page base URL. A trailing slash is dropped.
    pub fn with_wiki_base_url(mut self, url: impl Into<String>) -> Self {
        self.wiki_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the metrics base URL. A trailing slash is dropped.
    pub fn with_metrics_base_url(mut self, url: impl Into<String>) -> Self {
        self.metrics_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the request rate and burst.
    pub fn with_rate_limit(mut self, requests_per_second: u32, burst: u32) -> Self {
        self.requests_per_second = requests_per_second;
        self.burst = burst;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stale_after_days(mut self, days: i64) -> Self {
        self.stale_after_days = days;
        self
    }

    /// URL of the page listing events of a calendar day, e.g. `.../August_9`.
    pub fn day_page_url(&self, month: u32, day: u32) -> Option<String> {
        let name = month_name(month)?;
        Some(format!("{}/{}_{}", self.wiki_base_url, name, day))
    }

    /// URL of a person's page from its link.
    pub fn person_page_url(&self, link: &str) -> String {
        format!("{}/{}", self.wiki_base_url, link.trim_start_matches('/'))
    }

    /// Link named by a `Content-Location` header, if it points into the wiki.
    pub fn link_from_location(&self, location: &str) -> Option<String> {
        let prefix = format!("{}/", self.wiki_base_url);
        location
            .strip_prefix(&prefix)
            .filter(|link| !link.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.queue_id, "scrape");
        assert_eq!(config.user_agent, "Outlived/1.0");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stale_after_days, 30);
        assert_eq!(config.popularity_window_days, 90);
    }

    #[test]
    fn test_builders() {
        let config = ScrapeConfig::new()
            .with_queue_id("nightly")
            .with_user_agent("OutlivedTest/0.1")
            .with_poll_interval(Duration::from_millis(250))
            .with_stale_after_days(7)
            .with_rate_limit(2, 4);
        assert_eq!(config.queue_id, "nightly");
        assert_eq!(config.user_agent, "OutlivedTest/0.1");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.stale_after_days, 7);
        assert_eq!((config.requests_per_second, config.burst), (2, 4));
    }

    #[test]
    fn test_page_urls() {
        let config = ScrapeConfig::new().with_wiki_base_url("http://wiki.test/html/");
        assert_eq!(
            config.day_page_url(8, 9).as_deref(),
            Some("http://wiki.test/html/August_9")
        );
        assert_eq!(config.day_page_url(13, 1), None);
        assert_eq!(
            config.person_page_url("Jerry_Garcia"),
            "http://wiki.test/html/Jerry_Garcia"
        );
    }

    #[test]
    fn test_link_from_location() {
        let config = ScrapeConfig::new();
        assert_eq!(
            config.link_from_location(
                "https://en.wikipedia.org/api/rest_v1/page/html/Jerome_John_Garcia"
            ),
            Some("Jerome_John_Garcia".to_string())
        );
        assert_eq!(config.link_from_location("https://elsewhere.test/x"), None);
    }
}
