//! The stored record for a historical figure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::date::{Date, Lifespan};

/// Portrait shown next to a figure.
///
/// Serialized as the `imageSrc`/`imageAlt` pair of the figure record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureImage {
    #[serde(rename = "imageSrc")]
    pub src: String,
    #[serde(rename = "imageAlt", default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// A historical figure as stored, keyed by `link`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Figure {
    /// Canonical page path, e.g. `Jerry_Garcia`
    pub link: String,
    pub name: String,
    pub description: String,
    pub born: Date,
    pub died: Date,
    /// Whole days from `born` to `died`
    pub days_alive: i64,
    /// Trailing 90-day page views
    pub pageviews: u64,
    #[serde(flatten)]
    pub image: Option<FigureImage>,
    pub updated_at: DateTime<Utc>,
    /// Millisecond stamp shared by every record of one upsert batch
    pub generation: i64,
}

impl Figure {
    /// Build a figure from extracted facts.
    ///
    /// Returns `None` when `died` precedes `born`. `updated_at` and
    /// `generation` are placeholders until the record is stamped on upsert.
    pub fn new(
        link: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        born: Date,
        died: Date,
    ) -> Option<Self> {
        let days_alive = born.days_until(&died);
        if days_alive < 0 {
            return None;
        }
        Some(Self {
            link: link.into(),
            name: name.into(),
            description: description.into(),
            born,
            died,
            days_alive,
            pageviews: 0,
            image: None,
            updated_at: DateTime::<Utc>::default(),
            generation: 0,
        })
    }

    pub fn with_pageviews(mut self, pageviews: u64) -> Self {
        self.pageviews = pageviews;
        self
    }

    pub fn with_image(mut self, image: Option<FigureImage>) -> Self {
        self.image = image;
        self
    }

    /// Set the write stamp (used by stores and tests).
    pub fn stamped(mut self, generation: i64, updated_at: DateTime<Utc>) -> Self {
        self.generation = generation;
        self.updated_at = updated_at;
        self
    }

    /// Years and days lived.
    pub fn lifespan(&self) -> Option<Lifespan> {
        Lifespan::between(&self.born, &self.died)
    }

    /// Whether the figure died on this month and day, in any year.
    pub fn died_on(&self, month: u32, day: u32) -> bool {
        self.died.month() == month && self.died.day() == day
    }
}

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    /// Stamp written to every record
    pub generation: i64,
    /// Records written after dedup
    pub written: usize,
    /// Records dropped because an earlier one had the same link
    pub duplicates: usize,
    /// Backend writes issued
    pub batches: usize,
}

/// Outcome of an expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireSummary {
    /// Stale records found
    pub candidates: usize,
    pub deleted: usize,
    /// True when a failure stopped the pass early
    pub abandoned: bool,
}
