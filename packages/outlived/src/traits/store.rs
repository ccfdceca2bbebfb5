//! Figure storage abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::figure::Figure;

/// Largest number of records written or deleted in one backend call.
pub const MAX_BATCH: usize = 500;

/// Storage backend for figures, keyed by `link`.
///
/// Backends do no deduplication or stamping; [`FigureStore`] does that
/// before calling them. Query results must already be ordered and limited.
///
/// [`FigureStore`]: crate::pipeline::figure_store::FigureStore
#[async_trait]
pub trait FigureBackend: Send + Sync {
    /// Per-call write ceiling of this backend.
    fn batch_limit(&self) -> usize {
        MAX_BATCH
    }

    /// Insert or overwrite every record, in one write.
    async fn put_figures(&self, figures: &[Figure]) -> StoreResult<()>;

    async fn get_figure(&self, link: &str) -> StoreResult<Option<Figure>>;

    /// Figures that died on this month and day, most viewed first.
    async fn figures_died_on(&self, month: u32, day: u32, limit: usize)
        -> StoreResult<Vec<Figure>>;

    /// Figures with `days_alive <= days`, longest lived first, then most
    /// viewed.
    async fn figures_alive_at_most(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>>;

    /// Figures with `days_alive == days`, most viewed first.
    async fn figures_alive_for(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>>;

    /// Links of records last updated before `cutoff`.
    async fn stale_links(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;

    /// Delete records by link, in one write. Returns how many existed.
    async fn delete_figures(&self, links: &[String]) -> StoreResult<usize>;

    async fn count(&self) -> StoreResult<usize>;

    /// Highest generation stored, `None` when empty.
    async fn latest_generation(&self) -> StoreResult<Option<i64>>;
}
