//! Trailing page-view counts from the Wikimedia metrics API.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::config::ScrapeConfig;
use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::PageFetcher;

#[derive(Debug, Deserialize)]
struct PageviewsResponse {
    #[serde(default)]
    items: Vec<PageviewsItem>,
}

#[derive(Debug, Deserialize)]
struct PageviewsItem {
    #[serde(default)]
    views: u64,
}

/// Sums daily views of an article over a trailing window ending yesterday.
#[derive(Clone)]
pub struct PopularityFetcher {
    fetcher: Arc<dyn PageFetcher>,
    metrics_base_url: String,
    project: String,
    window_days: u64,
}

impl PopularityFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScrapeConfig) -> Self {
        Self {
            fetcher,
            metrics_base_url: config.metrics_base_url.clone(),
            project: config.project.clone(),
            window_days: config.popularity_window_days.max(1) as u64,
        }
    }

    /// First and last day of the window for `today`. Today is excluded.
    pub fn window(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let end = today.checked_sub_days(Days::new(1))?;
        let start = end.checked_sub_days(Days::new(self.window_days - 1))?;
        Some((start, end))
    }

    /// Metrics request URL for `link` as seen on `today`.
    pub fn views_url(&self, link: &str, today: NaiveDate) -> FetchResult<String> {
        let article = article_of(link)?;
        let (start, end) = self.window(today).ok_or_else(|| FetchError::InvalidLink {
            link: link.to_string(),
        })?;
        Ok(format!(
            "{}/metrics/pageviews/per-article/{}/all-access/user/{}/daily/{}00/{}00",
            self.metrics_base_url,
            self.project,
            article,
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        ))
    }

    /// Views of `link` over the window ending yesterday (UTC).
    pub async fn trailing_views(&self, link: &str) -> FetchResult<u64> {
        self.trailing_views_on(link, Utc::now().date_naive()).await
    }

    /// Views of `link` over the window ending the day before `today`.
    pub async fn trailing_views_on(&self, link: &str, today: NaiveDate) -> FetchResult<u64> {
        let url = self.views_url(link, today)?;
        let page = self.fetcher.fetch(&url).await?;
        let parsed: PageviewsResponse =
            serde_json::from_str(&page.body).map_err(|e| FetchError::Malformed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let views = parsed.items.iter().map(|item| item.views).sum();
        debug!(link = %link, views, "fetched pageviews");
        Ok(views)
    }
}

/// The article name: the last path segment of a link.
fn article_of(link: &str) -> FetchResult<&str> {
    link.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| FetchError::InvalidLink {
            link: link.to_string(),
        })
}
