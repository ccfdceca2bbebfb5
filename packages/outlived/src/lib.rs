//! Historical Figure Lifespan Ingestion
//!
//! Builds a dataset of historical figures with their birth and death dates
//! and a popularity signal, by crawling the death lists of every calendar
//! day and the pages of the people listed there.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use outlived::{
//!     FetcherExt, FigureStore, HttpFetcher, LocalTaskQueue, MemoryFigureBackend,
//!     ScrapeConfig, ScrapeOrchestrator,
//! };
//!
//! let config = ScrapeConfig::default();
//! let fetcher = Arc::new(HttpFetcher::new(&config)?.rate_limited(config.requests_per_second));
//! let queue = Arc::new(LocalTaskQueue::new());
//! let store = FigureStore::new(Arc::new(MemoryFigureBackend::new()));
//!
//! let orchestrator = ScrapeOrchestrator::new(config.clone(), queue.clone(), fetcher, store);
//! orchestrator.start_scan().await?;
//! queue.run(&config.queue_id, &orchestrator, config.poll_interval, shutdown).await?;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Dates, figures and scrape tasks
//! - [`extract`] - DateParser, DeathListExtractor and PersonPageExtractor
//! - [`traits`] - Fetcher, queue and storage seams
//! - [`fetchers`] - HTTP, rate limiting and pageview popularity
//! - [`queues`] - Local and managed task queues
//! - [`stores`] - Figure storage backends
//! - [`pipeline`] - ScrapeOrchestrator and FigureStore
//! - [`testing`] - Mock implementations for testing

pub mod config;
pub mod error;
pub mod extract;
pub mod fetchers;
pub mod pipeline;
pub mod queues;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::ScrapeConfig;
pub use error::{
    DateError, ExtractError, FetchError, QueueError, ScrapeError, StoreError,
};
pub use traits::{
    fetcher::{FetchedPage, PageFetcher},
    queue::{ClaimedTask, EnqueueResult, TaskHandler, TaskQueue, TaskStatus, TaskStore},
    store::{FigureBackend, MAX_BATCH},
};
pub use types::{
    date::{Date, Lifespan},
    figure::{ExpireSummary, Figure, FigureImage, UpsertSummary},
    task::{ScrapeTask, TaskId, TaskPayload},
};

// Re-export extraction
pub use extract::{
    extract_deaths, extract_person, parse_date, DeathEntries, DeathEntry, PersonFacts,
};

// Re-export pipeline components
pub use pipeline::{
    FigureStore, PersonOutcome, ScanOutcome, ScanState, ScrapeOrchestrator,
};

// Re-export fetchers
pub use fetchers::{FetcherExt, HttpFetcher, PopularityFetcher, RateLimitedFetcher};

// Re-export queues
pub use queues::{
    LocalTaskQueue, ManagedTaskQueue, MemoryTaskStore, QueueWorker, QueueWorkerConfig,
};

#[cfg(feature = "sqlite")]
pub use queues::SqliteTaskStore;

// Re-export stores
pub use stores::MemoryFigureBackend;

#[cfg(feature = "sqlite")]
pub use stores::SqliteFigureBackend;
