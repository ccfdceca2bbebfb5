//! Core trait abstractions for the ingestion pipeline.
//!
//! These traits are the seams between the pipeline and the outside world:
//! page fetching, task queues and figure storage.

pub mod fetcher;
pub mod queue;
pub mod store;
