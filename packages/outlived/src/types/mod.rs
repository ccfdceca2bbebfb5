//! Data types shared across the pipeline.

pub mod date;
pub mod figure;
pub mod task;
