//! Typed errors for the ingestion pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell
//! a missing page anchor from a network failure from a broken store.

use thiserror::Error;

/// Errors raised while reading or validating a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    /// No supported date layout found in the text
    #[error("no date found in: {text:?}")]
    NoMatch { text: String },

    /// Month name not recognised
    #[error("unknown month: {name:?}")]
    UnknownMonth { name: String },

    /// Day or year is not a number
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("month out of range: {month}")]
    MonthOutOfRange { month: u32 },

    /// Day does not exist in that month of that year
    #[error("day out of range: {year}-{month:02}-{day:02}")]
    DayOutOfRange { year: i32, month: u32, day: u32 },

    /// There is no year zero between 1 BC and AD 1
    #[error("year zero does not exist")]
    YearZero,

    #[error("year out of range: {year}")]
    YearOutOfRange { year: i32 },

    /// Text is not a `YYYY-MM-DD` date
    #[error("invalid ISO date: {text:?}")]
    InvalidIso { text: String },
}

/// Errors raised by the HTML extractors.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A structural anchor (heading, table, section) is absent
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A date cell or parenthetical did not parse
    #[error("date error: {0}")]
    Date(#[from] DateError),

    /// Extracted facts are inconsistent
    #[error("invalid extraction: {reason}")]
    Invalid { reason: String },
}

impl ExtractError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

/// Errors raised while fetching pages or metrics.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success status code
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Response body could not be understood
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// Person link cannot be turned into a request
    #[error("invalid link: {link}")]
    InvalidLink { link: String },

    /// Fetch abandoned because the task was cancelled
    #[error("fetch cancelled")]
    Cancelled,
}

/// Errors raised by task queues and their stores.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backing store failed
    #[error("queue storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Task payload could not be (de)serialized
    #[error("task payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Dispatch URI does not describe a task
    #[error("invalid dispatch uri {uri:?}: {reason}")]
    InvalidDispatch { uri: String, reason: String },

    #[error("queue lock poisoned")]
    Poisoned,
}

/// Errors raised by figure storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors surfaced from task handlers.
///
/// Extraction and fetch failures are normally logged and swallowed by the
/// orchestrator; the variants exist so lower layers compose with `?`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Task was cancelled before it finished
    #[error("task cancelled")]
    Cancelled,
}

/// Result type alias for date parsing.
pub type DateResult<T> = std::result::Result<T, DateError>;

/// Result type alias for extraction.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Result type alias for fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for task handling.
pub type Result<T> = std::result::Result<T, ScrapeError>;
