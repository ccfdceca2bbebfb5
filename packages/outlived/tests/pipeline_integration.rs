//! End-to-end scans against mocked pages.

use std::sync::Arc;

use chrono::{Days, Duration, Utc};
use tokio_util::sync::CancellationToken;

use outlived::testing::MockFetcher;
use outlived::{
    Date, FigureStore, LocalTaskQueue, ManagedTaskQueue, MemoryFigureBackend, MemoryTaskStore,
    QueueWorker, QueueWorkerConfig, ScanOutcome, ScanState, ScrapeConfig, ScrapeOrchestrator,
    TaskQueue,
};

const WIKI: &str = "https://en.wikipedia.org/api/rest_v1/page/html";

const AUGUST_9: &str = r#"<!DOCTYPE html><html><body>
<section data-mw-section-id="1"><h2 id="Events">Events</h2>
  <ul><li>1945 – <a href="./Atomic_bombing_of_Nagasaki">Nagasaki</a> is bombed</li></ul>
</section>
<section data-mw-section-id="2"><h2 id="Births">Births</h2>
  <ul><li>1896 – <a href="./Jean_Piaget" title="Jean Piaget">Jean Piaget</a>, Swiss psychologist (d. 1980)</li></ul>
</section>
<section data-mw-section-id="3"><h2 id="Deaths">Deaths</h2>
  <ul>
    <li>117 – <a href="./Trajan" title="Trajan">Trajan</a>, Roman emperor (b. 53)</li>
    <li>1995 – <a href="./Jerry_garcia" title="Jerry Garcia (musician)">Jerry Garcia</a>, American guitarist and songwriter (b. 1942)</li>
    <li>2008 – <a href="./Bernie_Mac" title="Bernie Mac">Bernie Mac</a>, American comedian (b. 1957)</li>
  </ul>
</section>
</body></html>"#;

const TRAJAN: &str = r#"<html><body><section>
  <p><b>Trajan</b> (18 September 53 – 8 August 117) was Roman emperor from 98 to 117.</p>
</section></body></html>"#;

const GARCIA: &str = r#"<html><body><section>
  <table class="infobox biography vcard">
    <tr><th colspan="2"><div class="fn">Jerome John Garcia</div></th></tr>
    <tr><td colspan="2"><img src="//upload.wikimedia.org/Jerry_Garcia.jpg" alt="Garcia performing"></td></tr>
    <tr><th>Born</th><td>August 1, 1942<br>San Francisco, California</td></tr>
    <tr><th>Died</th><td>August 9, 1995 (aged 53)<br>Forest Knolls, California</td></tr>
  </table>
</section></body></html>"#;

// No Died row: the person is skipped
const BERNIE_MAC: &str = r#"<html><body><section>
  <table class="infobox vcard">
    <tr><th colspan="2"><div class="fn">Bernard Jeffrey McCullough</div></th></tr>
    <tr><th>Born</th><td>October 5, 1957</td></tr>
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

fn mock_wiki() -> MockFetcher {
    MockFetcher::new()
        .with_page(format!("{}/August_9", WIKI), AUGUST_9)
        .with_page(format!("{}/Trajan", WIKI), TRAJAN)
        .with_redirect(
            format!("{}/Jerry_garcia", WIKI),
            GARCIA,
            format!("{}/Jerry_Garcia", WIKI),
        )
        .with_page(format!("{}/Bernie_Mac", WIKI), BERNIE_MAC)
        .with_page(views_url("Trajan"), r#"{"items":[{"views":5000},{"views":1200}]}"#)
        .with_page(views_url("Jerry_Garcia"), r#"{"items":[{"views":900}]}"#)
        .with_page(views_url("Bernie_Mac"), r#"{"items":[{"views":700}]}"#)
}

#[tokio::test]
async fn full_scan_through_local_queue() {
    let fetcher = Arc::new(mock_wiki());
    let queue = Arc::new(LocalTaskQueue::new());
    let backend = Arc::new(MemoryFigureBackend::new());
    let store = FigureStore::new(backend.clone());
    let orchestrator = ScrapeOrchestrator::new(
        ScrapeConfig::default(),
        queue.clone(),
        fetcher.clone(),
        store.clone(),
    );
    let cancel = CancellationToken::new();

    assert_eq!(
        orchestrator.start_scan().await.unwrap(),
        ScanOutcome::Started {
            enqueued: 366,
            duplicates: 0
        }
    );
    // A second scan while the first drains does nothing
    assert_eq!(
        orchestrator.start_scan().await.unwrap(),
        ScanOutcome::AlreadyRunning
    );

    let mut processed = 0;
    while let Some((_, ok)) = queue.process_next("scrape", &orchestrator, &cancel).await.unwrap() {
        assert!(ok);
        processed += 1;
    }
    assert_eq!(processed, 366 + 3);
    assert_eq!(orchestrator.scan_state().await.unwrap(), ScanState::Idle);

    assert_eq!(store.count().await.unwrap(), 2);

    let died: Vec<_> = store
        .died_on(8, 9, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.link)
        .collect();
    // Trajan died on August 8 by his page; Garcia stored under the canonical link
    assert_eq!(died, vec!["Jerry_Garcia".to_string()]);

    let trajan = store.get("Trajan").await.unwrap().unwrap();
    assert_eq!(trajan.born, Date::new(53, 9, 18).unwrap());
    assert_eq!(trajan.died, Date::new(117, 8, 8).unwrap());
    assert_eq!(trajan.pageviews, 6200);
    assert_eq!(trajan.description, "Roman emperor");

    let garcia = store.get("Jerry_Garcia").await.unwrap().unwrap();
    assert_eq!(garcia.name, "Jerome John Garcia");
    assert_eq!(garcia.days_alive, 19366);
    assert_eq!(garcia.pageviews, 900);

    // Day pages other than August 9 were requested and answered 404
    assert_eq!(fetcher.call_count(&format!("{}/January_1", WIKI)), 1);
    assert_eq!(fetcher.call_count(&format!("{}/February_29", WIKI)), 1);
}

#[tokio::test]
async fn full_scan_through_managed_queue() {
    let fetcher = Arc::new(mock_wiki());
    let tasks = Arc::new(MemoryTaskStore::new());
    let queue = Arc::new(ManagedTaskQueue::new(tasks.clone()));
    let store = FigureStore::new(Arc::new(MemoryFigureBackend::new()));
    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        ScrapeConfig::default(),
        queue.clone(),
        fetcher,
        store.clone(),
    ));

    orchestrator.start_scan().await.unwrap();

    let worker = QueueWorker::with_config(
        tasks,
        orchestrator.clone(),
        "scrape",
        QueueWorkerConfig {
            batch_size: 50,
            ..QueueWorkerConfig::with_worker_id("integration")
        },
    );
    let shutdown = CancellationToken::new();
    while worker.run_once(&shutdown).await.unwrap() > 0 {}

    assert!(queue.queue_empty("scrape").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn rescan_refreshes_and_expiry_keeps_fresh_records() {
    let fetcher = Arc::new(mock_wiki());
    let queue = Arc::new(LocalTaskQueue::new());
    let backend = Arc::new(MemoryFigureBackend::new());
    let store = FigureStore::new(backend.clone());
    let orchestrator = ScrapeOrchestrator::new(
        ScrapeConfig::default(),
        queue.clone(),
        fetcher,
        store.clone(),
    );
    let cancel = CancellationToken::new();

    // A record nobody lists any more, last refreshed long ago
    let gone = outlived::Figure::new(
        "Forgotten_Person",
        "Forgotten Person",
        "",
        Date::new(1900, 1, 1).unwrap(),
        Date::new(1950, 1, 1).unwrap(),
    )
    .unwrap()
    .stamped(1, Utc::now() - Duration::days(45));
    backend.seed([gone]).unwrap();

    orchestrator.start_scan().await.unwrap();
    while queue
        .process_next("scrape", &orchestrator, &cancel)
        .await
        .unwrap()
        .is_some()
    {}

    let summary = store.expire_stale(30).await;
    assert_eq!(summary.deleted, 1);
    assert!(!summary.abandoned);
    assert!(store.get("Forgotten_Person").await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 2);
}
