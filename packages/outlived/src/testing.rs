//! Testing utilities including mock implementations.
//!
//! These are useful for testing the pipeline without making real network
//! calls or standing up a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{FetchError, FetchResult, StoreError, StoreResult};
use crate::stores::MemoryFigureBackend;
use crate::traits::fetcher::{FetchedPage, PageFetcher};
use crate::traits::store::FigureBackend;
use crate::types::figure::Figure;

/// A mock fetcher for testing.
///
/// Serves predefined bodies by exact URL. Unknown URLs answer with a 404
/// status error, failing URLs with a transport error.
#[derive(Default)]
pub struct MockFetcher {
    /// Predefined pages by URL
    pages: Arc<RwLock<HashMap<String, FetchedPage>>>,

    /// URLs that should fail
    fail_urls: Arc<RwLock<Vec<String>>>,

    /// Delay before every response
    delay: Option<Duration>,

    /// Call tracking
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined body for a URL.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), body);
        self.pages.write().unwrap().insert(url, page);
        self
    }

    /// Add a body served with a `Content-Location` header.
    pub fn with_redirect(
        self,
        url: impl Into<String>,
        body: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), body).with_content_location(location);
        self.pages.write().unwrap().insert(url, page);
        self
    }

    /// Mark a URL as failing.
    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.fail_urls.write().unwrap().push(url.into());
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Number of requests made for `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_urls.read().unwrap().iter().any(|u| u == url) {
            return Err(FetchError::Http(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Mock connection refused",
            ))));
        }

        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// A figure backend that fails on demand.
///
/// Wraps a [`MemoryFigureBackend`] so successful writes remain inspectable.
#[derive(Default)]
pub struct FlakyFigureBackend {
    inner: MemoryFigureBackend,
    fail_puts: AtomicBool,
    /// Deletes succeed this many times, then fail
    deletes_before_failure: Option<usize>,
    deletes: AtomicUsize,
}

impl FlakyFigureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put_figures` call fail until cleared.
    pub fn fail_puts(self) -> Self {
        self.fail_puts.store(true, Ordering::SeqCst);
        self
    }

    /// Let `n` delete calls succeed, then fail the rest.
    pub fn fail_deletes_after(mut self, n: usize) -> Self {
        self.deletes_before_failure = Some(n);
        self
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// The backend holding every record written so far.
    pub fn inner(&self) -> &MemoryFigureBackend {
        &self.inner
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Storage(format!("injected {} failure", what).into())
    }
}

#[async_trait]
impl FigureBackend for FlakyFigureBackend {
    fn batch_limit(&self) -> usize {
        self.inner.batch_limit()
    }

    async fn put_figures(&self, figures: &[Figure]) -> StoreResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected("put"));
        }
        self.inner.put_figures(figures).await
    }

    async fn get_figure(&self, link: &str) -> StoreResult<Option<Figure>> {
        self.inner.get_figure(link).await
    }

    async fn figures_died_on(&self, month: u32, day: u32, limit: usize) -> StoreResult<Vec<Figure>> {
        self.inner.figures_died_on(month, day, limit).await
    }

    async fn figures_alive_at_most(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        self.inner.figures_alive_at_most(days, limit).await
    }

    async fn figures_alive_for(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        self.inner.figures_alive_for(days, limit).await
    }

    async fn stale_links(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.inner.stale_links(cutoff).await
    }

    async fn delete_figures(&self, links: &[String]) -> StoreResult<usize> {
        let call = self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.deletes_before_failure.is_some_and(|n| call >= n) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete_figures(links).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }

    async fn latest_generation(&self) -> StoreResult<Option<i64>> {
        self.inner.latest_generation().await
    }
}
