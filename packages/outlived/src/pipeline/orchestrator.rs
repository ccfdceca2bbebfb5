//! Scan orchestration: day tasks fan out into person tasks, person tasks
//! become figures.
//!
//! ```text
//! start_scan
//!     └─► 366 day tasks ─► handle_day_task
//!                              ├─► fetch day page
//!                              ├─► extract_deaths
//!                              └─► one person task per entry ─► handle_person_task
//!                                                                  ├─► fetch person page
//!                                                                  ├─► extract_person
//!                                                                  ├─► trailing pageviews
//!                                                                  └─► FigureStore::upsert_batch
//! ```
//!
//! Fetch and extraction failures are logged and end the task normally.
//! Queue and store failures are returned so the queue redelivers the task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::error::{FetchError, FetchResult, QueueResult, Result, ScrapeError};
use crate::extract::{extract_deaths, extract_person};
use crate::fetchers::PopularityFetcher;
use crate::pipeline::figure_store::FigureStore;
use crate::traits::fetcher::{FetchedPage, PageFetcher};
use crate::traits::queue::{TaskHandler, TaskQueue};
use crate::types::figure::Figure;
use crate::types::task::{calendar_day_slots, ScrapeTask, TaskPayload};

/// Where the current scan is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    /// Day tasks are being enqueued
    Scheduling,
    /// Tasks remain in the queue
    Draining,
}

/// Outcome of [`ScrapeOrchestrator::start_scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A scan is already scheduling or draining; nothing was enqueued
    AlreadyRunning,
    Started { enqueued: usize, duplicates: usize },
}

/// Outcome of one person task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonOutcome {
    /// A figure was written under this link
    Stored { link: String },
    /// The person was dropped for this cycle
    Skipped,
}

/// Clears the scheduling flag however `start_scan` exits.
struct SchedulingGuard<'a>(&'a AtomicBool);

impl Drop for SchedulingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives a full scan through a [`TaskQueue`].
pub struct ScrapeOrchestrator {
    config: ScrapeConfig,
    queue: Arc<dyn TaskQueue>,
    fetcher: Arc<dyn PageFetcher>,
    popularity: PopularityFetcher,
    store: FigureStore,
    scheduling: AtomicBool,
}

impl ScrapeOrchestrator {
    pub fn new(
        config: ScrapeConfig,
        queue: Arc<dyn TaskQueue>,
        fetcher: Arc<dyn PageFetcher>,
        store: FigureStore,
    ) -> Self {
        let popularity = PopularityFetcher::new(fetcher.clone(), &config);
        Self {
            config,
            queue,
            fetcher,
            popularity,
            store,
            scheduling: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn store(&self) -> &FigureStore {
        &self.store
    }

    pub async fn scan_state(&self) -> QueueResult<ScanState> {
        if self.scheduling.load(Ordering::SeqCst) {
            return Ok(ScanState::Scheduling);
        }
        if self.queue.queue_empty(&self.config.queue_id).await? {
            Ok(ScanState::Idle)
        } else {
            Ok(ScanState::Draining)
        }
    }

    /// Enqueue one day task per calendar day, unless a scan is underway.
    ///
    /// The queue-emptiness check is the only cross-process guard, so two
    /// processes racing here may both schedule. Task ids are deterministic,
    /// which makes the second set mostly duplicates.
    pub async fn start_scan(&self) -> Result<ScanOutcome> {
        if self.scheduling.swap(true, Ordering::SeqCst) {
            debug!("scan already scheduling in this process");
            return Ok(ScanOutcome::AlreadyRunning);
        }
        let _guard = SchedulingGuard(&self.scheduling);

        let queue_id = &self.config.queue_id;
        if !self.queue.queue_empty(queue_id).await? {
            info!(queue_id = %queue_id, "queue not empty, scan skipped");
            return Ok(ScanOutcome::AlreadyRunning);
        }

        let mut enqueued = 0;
        let mut duplicates = 0;
        for (month, day) in calendar_day_slots() {
            if self
                .queue
                .enqueue_task(queue_id, ScrapeTask::day(month, day))
                .await?
                .is_created()
            {
                enqueued += 1;
            } else {
                duplicates += 1;
            }
        }

        info!(queue_id = %queue_id, enqueued, duplicates, "scan started");
        Ok(ScanOutcome::Started {
            enqueued,
            duplicates,
        })
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchResult<FetchedPage> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            page = self.fetcher.fetch(url) => page,
        }
    }

    /// Read the death list of one calendar day and enqueue its people.
    ///
    /// Returns how many person tasks were newly enqueued.
    pub async fn handle_day_task(
        &self,
        month: u32,
        day: u32,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let Some(url) = self.config.day_page_url(month, day) else {
            warn!(month, day, "no such calendar day, task dropped");
            return Ok(0);
        };

        let page = match self.fetch(&url, cancel).await {
            Ok(page) => page,
            Err(FetchError::Cancelled) => return Err(ScrapeError::Cancelled),
            Err(e) => {
                warn!(month, day, error = %e, "day page fetch failed");
                return Ok(0);
            }
        };

        let entries = match extract_deaths(&page.body) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(month, day, error = %e, "day page has no death list");
                return Ok(0);
            }
        };

        let found = entries.len();
        let mut enqueued = 0;
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            let task = ScrapeTask::person(entry.href, entry.title, entry.description);
            if self
                .queue
                .enqueue_task(&self.config.queue_id, task)
                .await?
                .is_created()
            {
                enqueued += 1;
            }
        }

        info!(month, day, found, enqueued, "day task finished");
        Ok(enqueued)
    }

    /// Build and store the figure for one person.
    pub async fn handle_person_task(
        &self,
        href: &str,
        title: &str,
        desc: &str,
        cancel: &CancellationToken,
    ) -> Result<PersonOutcome> {
        let url = self.config.person_page_url(href);
        let page = match self.fetch(&url, cancel).await {
            Ok(page) => page,
            Err(FetchError::Cancelled) => return Err(ScrapeError::Cancelled),
            Err(e) => {
                warn!(link = %href, error = %e, "person page fetch failed");
                return Ok(PersonOutcome::Skipped);
            }
        };

        let link = page
            .content_location
            .as_deref()
            .and_then(|location| self.config.link_from_location(location))
            .unwrap_or_else(|| href.to_string());
        if link != href {
            debug!(requested = %href, canonical = %link, "person page redirected");
        }

        let facts = match extract_person(&page.body, title) {
            Ok(facts) => facts,
            Err(e) => {
                warn!(link = %link, error = %e, "person page extraction failed");
                return Ok(PersonOutcome::Skipped);
            }
        };

        let name = facts
            .full_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| title.to_string());

        let views = tokio::select! {
            _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            views = self.popularity.trailing_views(&link) => views,
        };
        let views = match views {
            Ok(views) => views,
            Err(e) => {
                warn!(link = %link, error = %e, "pageviews unavailable, person skipped");
                return Ok(PersonOutcome::Skipped);
            }
        };

        let Some(figure) = Figure::new(link.clone(), name, desc, facts.born, facts.died) else {
            warn!(link = %link, "death precedes birth, person skipped");
            return Ok(PersonOutcome::Skipped);
        };
        let figure = figure.with_pageviews(views).with_image(facts.image);

        self.store.upsert_batch(vec![figure]).await?;
        debug!(link = %link, views, "figure stored");
        Ok(PersonOutcome::Stored { link })
    }

    /// Run the task named by a dispatch URI, as an external router would.
    pub async fn handle_dispatch(&self, uri: &str, cancel: &CancellationToken) -> Result<()> {
        let task = ScrapeTask::from_dispatch_uri(uri)?;
        self.handle(&task, cancel).await
    }
}

#[async_trait]
impl TaskHandler for ScrapeOrchestrator {
    async fn handle(&self, task: &ScrapeTask, cancel: &CancellationToken) -> Result<()> {
        match &task.payload {
            TaskPayload::Day { month, day } => {
                self.handle_day_task(*month, *day, cancel).await?;
            }
            TaskPayload::Person { href, title, desc } => {
                self.handle_person_task(href, title, desc, cancel).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queues::LocalTaskQueue;
    use crate::stores::MemoryFigureBackend;
    use crate::testing::{FlakyFigureBackend, MockFetcher};
    use crate::traits::store::FigureBackend;
    use crate::types::date::Date;
    use chrono::{Days, Utc};
    use std::time::Duration;

    const WIKI: &str = "https://en.wikipedia.org/api/rest_v1/page/html";

    const DAY_PAGE: &str = r#"<html><body>
        <section><h2 id="Deaths">Deaths</h2>
        <ul>
          <li>1995 – <a href="./Jerry_Garcia" title="Jerry Garcia">Jerry Garcia</a>, American guitarist (b. 1942)</li>
          <li>2000 – <a href="./Nobody_Known" title="Nobody Known">Nobody Known</a>, mystery</li>
        </ul></section>
    </body></html>"#;

    const GARCIA_PAGE: &str = r#"<html><body><section>
        <table class="infobox vcard">
          <tr><th colspan="2"><div class="fn">Jerome John Garcia</div></th></tr>
          <tr><td colspan="2"><img src="//upload.wikimedia.org/garcia.jpg" alt="Garcia in 1979"></td></tr>
          <tr><th>Born</th><td>Jerome John Garcia<br>August 1, 1942<br>San Francisco</td></tr>
          <tr><th>Died</th><td>August 9, 1995 (aged 53)<br>Forest Knolls</td></tr>
        </table>
    </section></body></html>"#;

    fn views_url(article: &str) -> String {
        let end = Utc::now().date_naive() - Days::new(1);
        let start = end - Days::new(89);
        format!(
            "https://wikimedia.org/api/rest_v1/metrics/pageviews/per-article/en.wikipedia.org/all-access/user/{}/daily/{}00/{}00",
            article,
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        )
    }

    struct Harness {
        orchestrator: ScrapeOrchestrator,
        queue: Arc<LocalTaskQueue>,
        fetcher: Arc<MockFetcher>,
    }

    fn harness(fetcher: MockFetcher, backend: Arc<dyn FigureBackend>) -> Harness {
        let queue = Arc::new(LocalTaskQueue::new());
        let fetcher = Arc::new(fetcher);
        let orchestrator = ScrapeOrchestrator::new(
            ScrapeConfig::default(),
            queue.clone(),
            fetcher.clone(),
            FigureStore::new(backend),
        );
        Harness {
            orchestrator,
            queue,
            fetcher,
        }
    }

    #[tokio::test]
    async fn test_start_scan_enqueues_every_day() {
        let h = harness(MockFetcher::new(), Arc::new(MemoryFigureBackend::new()));

        let outcome = h.orchestrator.start_scan().await.unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Started {
                enqueued: 366,
                duplicates: 0
            }
        );
        assert_eq!(h.orchestrator.scan_state().await.unwrap(), ScanState::Draining);

        let pending = h.queue.pending("scrape").unwrap();
        assert_eq!(pending.len(), 366);
        assert!(pending.contains(&ScrapeTask::day(2, 29)));
    }

    #[tokio::test]
    async fn test_start_scan_noop_when_queue_busy() {
        let h = harness(MockFetcher::new(), Arc::new(MemoryFigureBackend::new()));
        h.queue
            .enqueue_task("scrape", ScrapeTask::person("A", "A", ""))
            .await
            .unwrap();

        let outcome = h.orchestrator.start_scan().await.unwrap();
        assert_eq!(outcome, ScanOutcome::AlreadyRunning);
        assert_eq!(h.queue.pending("scrape").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_scans_produce_identical_ids() {
        let first = harness(MockFetcher::new(), Arc::new(MemoryFigureBackend::new()));
        let second = harness(MockFetcher::new(), Arc::new(MemoryFigureBackend::new()));
        first.orchestrator.start_scan().await.unwrap();
        second.orchestrator.start_scan().await.unwrap();

        let ids = |h: &Harness| -> Vec<_> {
            h.queue
                .pending("scrape")
                .unwrap()
                .into_iter()
                .map(|t| t.id)
                .collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_day_task_enqueues_people() {
        let fetcher = MockFetcher::new().with_page(format!("{}/August_9", WIKI), DAY_PAGE);
        let h = harness(fetcher, Arc::new(MemoryFigureBackend::new()));

        let enqueued = h
            .orchestrator
            .handle_day_task(8, 9, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(enqueued, 2);
        let pending = h.queue.pending("scrape").unwrap();
        assert_eq!(
            pending[0],
            ScrapeTask::person("Jerry_Garcia", "Jerry Garcia", "American guitarist")
        );
    }

    #[tokio::test]
    async fn test_day_task_fetch_failure_is_swallowed() {
        let h = harness(MockFetcher::new(), Arc::new(MemoryFigureBackend::new()));
        let enqueued = h
            .orchestrator
            .handle_day_task(8, 9, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(enqueued, 0);
        assert!(h.queue.pending("scrape").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_person_task_stores_figure() {
        let fetcher = MockFetcher::new()
            .with_page(format!("{}/Jerry_Garcia", WIKI), GARCIA_PAGE)
            .with_page(views_url("Jerry_Garcia"), r#"{"items":[{"views":40},{"views":2}]}"#);
        let backend = Arc::new(MemoryFigureBackend::new());
        let h = harness(fetcher, backend.clone());

        let outcome = h
            .orchestrator
            .handle_person_task(
                "Jerry_Garcia",
                "Jerry Garcia",
                "American guitarist",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PersonOutcome::Stored {
                link: "Jerry_Garcia".to_string()
            }
        );

        let figure = backend.get_figure("Jerry_Garcia").await.unwrap().unwrap();
        assert_eq!(figure.name, "Jerome John Garcia");
        assert_eq!(figure.description, "American guitarist");
        assert_eq!(figure.born, Date::new(1942, 8, 1).unwrap());
        assert_eq!(figure.died, Date::new(1995, 8, 9).unwrap());
        assert_eq!(figure.days_alive, 19366);
        assert_eq!(figure.pageviews, 42);
        assert_eq!(
            figure.image.unwrap().src,
            "//upload.wikimedia.org/garcia.jpg"
        );
        assert!(figure.generation > 0);
    }

    #[tokio::test]
    async fn test_person_task_follows_canonical_location() {
        let fetcher = MockFetcher::new()
            .with_redirect(
                format!("{}/Jerry_garcia", WIKI),
                GARCIA_PAGE,
                format!("{}/Jerry_Garcia", WIKI),
            )
            .with_page(views_url("Jerry_Garcia"), r#"{"items":[{"views":1}]}"#);
        let backend = Arc::new(MemoryFigureBackend::new());
        let h = harness(fetcher, backend.clone());

        h.orchestrator
            .handle_person_task("Jerry_garcia", "Jerry Garcia", "", &CancellationToken::new())
            .await
            .unwrap();

        assert!(backend.get_figure("Jerry_Garcia").await.unwrap().is_some());
        assert!(backend.get_figure("Jerry_garcia").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_person_skipped_without_pageviews() {
        let fetcher = MockFetcher::new().with_page(format!("{}/Jerry_Garcia", WIKI), GARCIA_PAGE);
        let backend = Arc::new(MemoryFigureBackend::new());
        let h = harness(fetcher, backend.clone());

        let outcome = h
            .orchestrator
            .handle_person_task("Jerry_Garcia", "Jerry Garcia", "", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PersonOutcome::Skipped);
        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_person_skipped_on_extraction_failure() {
        let fetcher = MockFetcher::new()
            .with_page(format!("{}/Jerry_Garcia", WIKI), "<html><body><p>stub</p></body></html>");
        let h = harness(fetcher, Arc::new(MemoryFigureBackend::new()));

        let outcome = h
            .orchestrator
            .handle_person_task("Jerry_Garcia", "Jerry Garcia", "", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PersonOutcome::Skipped);
        // No pageview request once extraction fails
        assert_eq!(h.fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_returned() {
        let fetcher = MockFetcher::new()
            .with_page(format!("{}/Jerry_Garcia", WIKI), GARCIA_PAGE)
            .with_page(views_url("Jerry_Garcia"), r#"{"items":[]}"#);
        let h = harness(fetcher, Arc::new(FlakyFigureBackend::new().fail_puts()));

        let result = h
            .orchestrator
            .handle_person_task("Jerry_Garcia", "Jerry Garcia", "", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ScrapeError::Store(_))));
    }

    #[tokio::test]
    async fn test_redelivered_person_stores_after_store_recovers() {
        let fetcher = MockFetcher::new()
            .with_page(format!("{}/Jerry_Garcia", WIKI), GARCIA_PAGE)
            .with_page(views_url("Jerry_Garcia"), r#"{"items":[{"views":3}]}"#);
        let backend = Arc::new(FlakyFigureBackend::new().fail_puts());
        let h = harness(fetcher, backend.clone());
        let cancel = CancellationToken::new();

        let first = h
            .orchestrator
            .handle_person_task("Jerry_Garcia", "Jerry Garcia", "", &cancel)
            .await;
        assert!(first.is_err());
        assert_eq!(h.orchestrator.store().backend().count().await.unwrap(), 0);

        backend.set_fail_puts(false);
        let second = h
            .orchestrator
            .handle_person_task("Jerry_Garcia", "Jerry Garcia", "", &cancel)
            .await
            .unwrap();

        assert_eq!(
            second,
            PersonOutcome::Stored {
                link: "Jerry_Garcia".to_string()
            }
        );
        assert_eq!(h.orchestrator.store().backend().count().await.unwrap(), 1);
        assert_eq!(backend.inner().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_person_skipped_when_pageviews_unreachable() {
        let fetcher = MockFetcher::new()
            .with_page(format!("{}/Jerry_Garcia", WIKI), GARCIA_PAGE)
            .fail_url(views_url("Jerry_Garcia"));
        let backend = Arc::new(MemoryFigureBackend::new());
        let h = harness(fetcher, backend.clone());

        let outcome = h
            .orchestrator
            .handle_person_task("Jerry_Garcia", "Jerry Garcia", "", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PersonOutcome::Skipped);
        assert_eq!(h.fetcher.call_count(&views_url("Jerry_Garcia")), 1);
        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_aborts_task() {
        let fetcher = MockFetcher::new()
            .with_page(format!("{}/August_9", WIKI), DAY_PAGE)
            .with_delay(Duration::from_secs(30));
        let h = harness(fetcher, Arc::new(MemoryFigureBackend::new()));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = h.orchestrator.handle_day_task(8, 9, &cancel).await;
        assert!(matches!(result, Err(ScrapeError::Cancelled)));
        assert!(h.queue.pending("scrape").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_uri_routes_to_handler() {
        let fetcher = MockFetcher::new().with_page(format!("{}/August_9", WIKI), DAY_PAGE);
        let h = harness(fetcher, Arc::new(MemoryFigureBackend::new()));

        h.orchestrator
            .handle_dispatch("/task/scrapeday?m=8&d=9", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.queue.pending("scrape").unwrap().len(), 2);

        let err = h
            .orchestrator
            .handle_dispatch("/task/scrapeday?m=13&d=1", &CancellationToken::new())
            .await;
        assert!(matches!(err, Err(ScrapeError::Queue(_))));
    }
}
