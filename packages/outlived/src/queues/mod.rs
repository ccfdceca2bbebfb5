//! Task queue implementations.
//!
//! Available queues:
//! - `LocalTaskQueue` - In-process pending lists polled on a timer
//! - `ManagedTaskQueue` - Leased tasks in a `TaskStore`, drained by `QueueWorker`s
//!
//! Task stores for the managed queue:
//! - `MemoryTaskStore` - In-memory (always available)
//! - `SqliteTaskStore` - SQLite (requires `sqlite` feature)

pub mod local;
pub mod managed;
pub mod memory_store;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use local::LocalTaskQueue;
pub use managed::{ManagedTaskQueue, QueueWorker, QueueWorkerConfig};
pub use memory_store::MemoryTaskStore;

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteTaskStore;
