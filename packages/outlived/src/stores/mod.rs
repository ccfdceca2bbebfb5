//! Storage implementations for figure records.
//!
//! Available backends:
//! - `MemoryFigureBackend` - In-memory storage (always available)
//! - `SqliteFigureBackend` - SQLite file-based storage (requires `sqlite` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryFigureBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFigureBackend;
