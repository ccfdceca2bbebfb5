//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use reqwest::header::CONTENT_LOCATION;
use tracing::{debug, warn};
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{FetchedPage, PageFetcher};

/// Plain HTTP GET fetcher.
///
/// Sends the configured User-Agent, follows redirects and reports the
/// `Content-Location` header (resolved against the request URL) so callers
/// can learn a page's canonical name.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the timeout and User-Agent from `config`.
    pub fn new(config: &ScrapeConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Http(Box::new(e)))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTP request failed");
            FetchError::Http(Box::new(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_location = response
            .headers()
            .get(CONTENT_LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| match Url::parse(url) {
                Ok(base) => base.join(location).ok().map(String::from),
                Err(_) => Some(location.to_string()),
            });

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(Box::new(e)))?;

        let mut page = FetchedPage::new(url, body);
        page.content_location = content_location;
        Ok(page)
    }
}
