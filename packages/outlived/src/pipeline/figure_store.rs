//! Generation-stamped figure storage over any [`FigureBackend`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::traits::store::{FigureBackend, MAX_BATCH};
use crate::types::figure::{ExpireSummary, Figure, UpsertSummary};

/// Bulk upserts, ordered queries and staleness expiry for figures.
///
/// Holds no locks of its own; concurrent upserts of the same link are
/// resolved by the backend (last write wins).
#[derive(Clone)]
pub struct FigureStore {
    backend: Arc<dyn FigureBackend>,
}

impl FigureStore {
    pub fn new(backend: Arc<dyn FigureBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn FigureBackend> {
        &self.backend
    }

    /// Records per backend write.
    pub fn chunk_size(&self) -> usize {
        self.backend.batch_limit().clamp(1, MAX_BATCH)
    }

    /// Stamp, deduplicate and write `figures`.
    pub async fn upsert_batch(&self, figures: Vec<Figure>) -> StoreResult<UpsertSummary> {
        self.upsert_batch_at(figures, Utc::now()).await
    }

    /// [`upsert_batch`](Self::upsert_batch) with an explicit clock.
    ///
    /// Every record gets the same generation (`now` in epoch milliseconds)
    /// and `updated_at`. Of several records sharing a link only the first
    /// is kept.
    pub async fn upsert_batch_at(
        &self,
        figures: Vec<Figure>,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertSummary> {
        let generation = now.timestamp_millis();
        let total = figures.len();

        let mut seen = HashSet::with_capacity(total);
        let unique: Vec<Figure> = figures
            .into_iter()
            .filter(|f| seen.insert(f.link.clone()))
            .map(|f| f.stamped(generation, now))
            .collect();

        let mut summary = UpsertSummary {
            generation,
            written: 0,
            duplicates: total - unique.len(),
            batches: 0,
        };

        for chunk in unique.chunks(self.chunk_size()) {
            self.backend.put_figures(chunk).await?;
            summary.written += chunk.len();
            summary.batches += 1;
        }

        debug!(
            generation,
            written = summary.written,
            duplicates = summary.duplicates,
            batches = summary.batches,
            "upserted figures"
        );
        Ok(summary)
    }

    /// Figures that died on `month`/`day`, most viewed first.
    pub async fn died_on(&self, month: u32, day: u32, limit: usize) -> StoreResult<Vec<Figure>> {
        self.backend.figures_died_on(month, day, limit).await
    }

    /// Figures that lived at most `days` days, longest lived first.
    pub async fn alive_at_most(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        self.backend.figures_alive_at_most(days, limit).await
    }

    /// Figures that lived exactly `days` days, most viewed first.
    pub async fn alive_for(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        self.backend.figures_alive_for(days, limit).await
    }

    pub async fn get(&self, link: &str) -> StoreResult<Option<Figure>> {
        self.backend.get_figure(link).await
    }

    pub async fn count(&self) -> StoreResult<usize> {
        self.backend.count().await
    }

    pub async fn latest_generation(&self) -> StoreResult<Option<i64>> {
        self.backend.latest_generation().await
    }

    /// Delete figures not updated in the last `threshold_days` days.
    pub async fn expire_stale(&self, threshold_days: i64) -> ExpireSummary {
        self.expire_stale_at(Utc::now(), threshold_days).await
    }

    /// [`expire_stale`](Self::expire_stale) with an explicit clock.
    ///
    /// Failures are logged, never returned. A failed delete abandons the
    /// rest of the pass; the next pass picks the leftovers up.
    pub async fn expire_stale_at(&self, now: DateTime<Utc>, threshold_days: i64) -> ExpireSummary {
        let mut summary = ExpireSummary::default();
        let cutoff = now - Duration::days(threshold_days);

        let links = match self.backend.stale_links(cutoff).await {
            Ok(links) => links,
            Err(e) => {
                warn!(error = %e, "listing stale figures failed, expiry abandoned");
                summary.abandoned = true;
                return summary;
            }
        };
        summary.candidates = links.len();

        for chunk in links.chunks(self.chunk_size()) {
            match self.backend.delete_figures(chunk).await {
                Ok(deleted) => summary.deleted += deleted,
                Err(e) => {
                    warn!(
                        error = %e,
                        deleted = summary.deleted,
                        remaining = summary.candidates - summary.deleted,
                        "deleting stale figures failed, expiry abandoned"
                    );
                    summary.abandoned = true;
                    break;
                }
            }
        }

        info!(
            candidates = summary.candidates,
            deleted = summary.deleted,
            threshold_days,
            "expired stale figures"
        );
        summary
    }
}
