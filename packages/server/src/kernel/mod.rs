//! Kernel module - process wiring and background services.

pub mod deps;
pub mod scheduled_tasks;

pub use deps::ServerDeps;
pub use scheduled_tasks::start_scheduler;
