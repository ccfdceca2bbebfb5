// Outlived - ingestion worker
//
// Long-running process that schedules scans of the calendar-day death lists,
// drains the resulting task queue and expires figures that stopped being
// refreshed.

pub mod config;
pub mod kernel;

pub use config::*;
