//! The ingestion pipeline.
//!
//! - Orchestration (scan → day tasks → person tasks)
//! - Figure storage (stamped bulk upserts, queries, expiry)

pub mod figure_store;
pub mod orchestrator;

pub use figure_store::FigureStore;
pub use orchestrator::{PersonOutcome, ScanOutcome, ScanState, ScrapeOrchestrator};
