//! In-memory figure storage for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{FigureBackend, MAX_BATCH};
use crate::types::figure::Figure;

/// In-memory storage for figures.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart. Records the size of every write so tests can
/// check batching.
pub struct MemoryFigureBackend {
    figures: RwLock<HashMap<String, Figure>>,
    writes: RwLock<Vec<usize>>,
    batch_limit: usize,
}

impl Default for MemoryFigureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFigureBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self {
            figures: RwLock::new(HashMap::new()),
            writes: RwLock::new(Vec::new()),
            batch_limit: MAX_BATCH,
        }
    }

    /// Declare a lower per-write ceiling.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Sizes of every `put_figures` call so far.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.writes.read().map(|w| w.clone()).unwrap_or_default()
    }

    /// Insert records as-is, without stamping or recording a write.
    pub fn seed(&self, figures: impl IntoIterator<Item = Figure>) -> StoreResult<()> {
        let mut map = self.figures.write().map_err(|_| StoreError::Poisoned)?;
        for figure in figures {
            map.insert(figure.link.clone(), figure);
        }
        Ok(())
    }

    fn select(
        &self,
        filter: impl Fn(&Figure) -> bool,
        sort: impl Fn(&mut Vec<Figure>),
        limit: usize,
    ) -> StoreResult<Vec<Figure>> {
        let map = self.figures.read().map_err(|_| StoreError::Poisoned)?;
        let mut found: Vec<Figure> = map.values().filter(|f| filter(f)).cloned().collect();
        sort(&mut found);
        found.truncate(limit);
        Ok(found)
    }
}

fn by_popularity(figures: &mut Vec<Figure>) {
    figures.sort_by(|a, b| {
        b.pageviews
            .cmp(&a.pageviews)
            .then_with(|| a.link.cmp(&b.link))
    });
}

#[async_trait]
impl FigureBackend for MemoryFigureBackend {
    fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    async fn put_figures(&self, figures: &[Figure]) -> StoreResult<()> {
        let mut map = self.figures.write().map_err(|_| StoreError::Poisoned)?;
        for figure in figures {
            map.insert(figure.link.clone(), figure.clone());
        }
        self.writes
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(figures.len());
        Ok(())
    }

    async fn get_figure(&self, link: &str) -> StoreResult<Option<Figure>> {
        let map = self.figures.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(link).cloned())
    }

    async fn figures_died_on(&self, month: u32, day: u32, limit: usize) -> StoreResult<Vec<Figure>> {
        self.select(|f| f.died_on(month, day), by_popularity, limit)
    }

    async fn figures_alive_at_most(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        self.select(
            |f| f.days_alive <= days,
            |found| {
                found.sort_by_key(|f| (Reverse(f.days_alive), Reverse(f.pageviews), f.link.clone()))
            },
            limit,
        )
    }

    async fn figures_alive_for(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        self.select(|f| f.days_alive == days, by_popularity, limit)
    }

    async fn stale_links(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let map = self.figures.read().map_err(|_| StoreError::Poisoned)?;
        let mut links: Vec<String> = map
            .values()
            .filter(|f| f.updated_at < cutoff)
            .map(|f| f.link.clone())
            .collect();
        links.sort();
        Ok(links)
    }

    async fn delete_figures(&self, links: &[String]) -> StoreResult<usize> {
        let mut map = self.figures.write().map_err(|_| StoreError::Poisoned)?;
        Ok(links.iter().filter(|link| map.remove(*link).is_some()).count())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.figures.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    async fn latest_generation(&self) -> StoreResult<Option<i64>> {
        let map = self.figures.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.values().map(|f| f.generation).max())
    }
}
