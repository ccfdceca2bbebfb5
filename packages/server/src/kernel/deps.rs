//! Server dependencies: storage backends, queue and orchestrator.
//!
//! Backends are chosen from the configuration: SQLite when `DATABASE_URL`
//! is set, in-memory otherwise.

use std::sync::Arc;

use anyhow::{Context, Result};
use outlived::{
    FetcherExt, FigureBackend, FigureStore, HttpFetcher, LocalTaskQueue, ManagedTaskQueue,
    MemoryFigureBackend, MemoryTaskStore, PageFetcher, QueueWorker, QueueWorkerConfig,
    ScrapeConfig, ScrapeOrchestrator, SqliteFigureBackend, SqliteTaskStore, TaskQueue, TaskStore,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, QueueMode};

/// The queue in use and what drains it.
#[derive(Clone)]
pub enum QueueBackend {
    Local(Arc<LocalTaskQueue>),
    Managed(Arc<dyn TaskStore>),
}

/// Everything the background services share.
#[derive(Clone)]
pub struct ServerDeps {
    pub scrape: ScrapeConfig,
    pub orchestrator: Arc<ScrapeOrchestrator>,
    pub queue: QueueBackend,
    pub workers: usize,
}

impl ServerDeps {
    /// Connect storage and assemble the pipeline.
    pub async fn build(config: &Config) -> Result<Self> {
        let scrape = config.scrape_config();

        let fetcher: Arc<dyn PageFetcher> = Arc::new(
            HttpFetcher::new(&scrape)
                .context("Failed to build HTTP client")?
                .rate_limited_with_burst(scrape.requests_per_second, scrape.burst),
        );

        let backend: Arc<dyn FigureBackend> = match &config.database_url {
            Some(url) => Arc::new(
                SqliteFigureBackend::new(url)
                    .await
                    .context("Failed to open figure database")?,
            ),
            None => Arc::new(MemoryFigureBackend::new()),
        };

        let (queue, task_queue): (QueueBackend, Arc<dyn TaskQueue>) = match config.queue {
            QueueMode::Local => {
                let local = Arc::new(LocalTaskQueue::new());
                let task_queue: Arc<dyn TaskQueue> = local.clone();
                (QueueBackend::Local(local), task_queue)
            }
            QueueMode::Managed => {
                let store: Arc<dyn TaskStore> = match &config.database_url {
                    Some(url) => Arc::new(
                        SqliteTaskStore::new(url)
                            .await
                            .context("Failed to open task database")?,
                    ),
                    None => Arc::new(MemoryTaskStore::new()),
                };
                let task_queue: Arc<dyn TaskQueue> = Arc::new(ManagedTaskQueue::new(store.clone()));
                (QueueBackend::Managed(store), task_queue)
            }
        };

        let orchestrator = Arc::new(ScrapeOrchestrator::new(
            scrape.clone(),
            task_queue,
            fetcher,
            FigureStore::new(backend),
        ));

        Ok(Self {
            scrape,
            orchestrator,
            queue,
            workers: config.workers.max(1),
        })
    }

    /// Start draining the queue in background tasks.
    pub fn spawn_queue(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let queue_id = self.scrape.queue_id.clone();

        match &self.queue {
            QueueBackend::Local(queue) => {
                let queue = queue.clone();
                let orchestrator = self.orchestrator.clone();
                let poll_interval = self.scrape.poll_interval;
                vec![tokio::spawn(async move {
                    if let Err(e) = queue
                        .run(&queue_id, orchestrator.as_ref(), poll_interval, shutdown)
                        .await
                    {
                        tracing::error!(error = %e, "local queue stopped with error");
                    }
                })]
            }
            QueueBackend::Managed(store) => (0..self.workers)
                .map(|_| {
                    let worker = QueueWorker::with_config(
                        store.clone(),
                        self.orchestrator.clone(),
                        queue_id.clone(),
                        QueueWorkerConfig {
                            poll_interval: self.scrape.poll_interval,
                            ..Default::default()
                        },
                    );
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move { worker.run(shutdown).await })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(queue: QueueMode) -> Config {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.queue = queue;
        config
    }

    #[tokio::test]
    async fn test_local_queue_by_default() {
        let deps = ServerDeps::build(&config(QueueMode::Local)).await.unwrap();
        assert!(matches!(deps.queue, QueueBackend::Local(_)));
        assert_eq!(deps.scrape.queue_id, "scrape");
    }

    #[tokio::test]
    async fn test_managed_workers_stop_on_shutdown() {
        let mut config = config(QueueMode::Managed);
        config.workers = 3;
        let deps = ServerDeps::build(&config).await.unwrap();
        assert!(matches!(deps.queue, QueueBackend::Managed(_)));

        let shutdown = CancellationToken::new();
        let handles = deps.spawn_queue(shutdown.clone());
        assert_eq!(handles.len(), 3);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sqlite_backends_from_database_url() {
        let mut config = config(QueueMode::Managed);
        config.database_url = Some("sqlite::memory:".to_string());
        let deps = ServerDeps::build(&config).await.unwrap();
        assert_eq!(deps.orchestrator.store().count().await.unwrap(), 0);
    }
}
