//! SQLite figure storage.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Single-server deployments
//! - Local development with persistent data

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::FigureBackend;
use crate::types::date::Date;
use crate::types::figure::{Figure, FigureImage};

fn storage(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> StoreError {
    StoreError::Storage(e.into())
}

/// SQLite-based figure store.
pub struct SqliteFigureBackend {
    pool: SqlitePool,
}

impl SqliteFigureBackend {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite://outlived.db?mode=rwc` - File-based, created if missing
    /// - `sqlite::memory:` - Ephemeral (use [`Self::in_memory`])
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        // Each connection to an in-memory database sees a database of its own
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Self::with_pool(pool).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// holds exactly one.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed.
    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS figures (
                link TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                born_y INTEGER NOT NULL,
                born_m INTEGER NOT NULL,
                born_d INTEGER NOT NULL,
                died_y INTEGER NOT NULL,
                died_m INTEGER NOT NULL,
                died_d INTEGER NOT NULL,
                days_alive INTEGER NOT NULL,
                pageviews INTEGER NOT NULL,
                image_src TEXT,
                image_alt TEXT,
                updated_at INTEGER NOT NULL,
                generation INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_figures_died ON figures(died_m, died_d, pageviews);
            CREATE INDEX IF NOT EXISTS idx_figures_days_alive ON figures(days_alive, pageviews);
            CREATE INDEX IF NOT EXISTS idx_figures_updated_at ON figures(updated_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SELECT_FIGURE: &str = "SELECT link, name, description, born_y, born_m, born_d, died_y, died_m, died_d, days_alive, pageviews, image_src, image_alt, updated_at, generation FROM figures";

// Row type for sqlx queries
#[derive(Debug, FromRow)]
struct FigureRow {
    link: String,
    name: String,
    description: String,
    born_y: i64,
    born_m: i64,
    born_d: i64,
    died_y: i64,
    died_m: i64,
    died_d: i64,
    days_alive: i64,
    pageviews: i64,
    image_src: Option<String>,
    image_alt: Option<String>,
    updated_at: i64,
    generation: i64,
}

fn row_date(y: i64, m: i64, d: i64) -> StoreResult<Date> {
    let invalid = || storage(format!("invalid stored date {}-{}-{}", y, m, d));
    Date::new(
        i32::try_from(y).map_err(|_| invalid())?,
        u32::try_from(m).map_err(|_| invalid())?,
        u32::try_from(d).map_err(|_| invalid())?,
    )
    .map_err(storage)
}

impl FigureRow {
    fn into_figure(self) -> StoreResult<Figure> {
        let updated_at = DateTime::<Utc>::from_timestamp_millis(self.updated_at)
            .ok_or_else(|| storage(format!("invalid updated_at: {}", self.updated_at)))?;

        Ok(Figure {
            born: row_date(self.born_y, self.born_m, self.born_d)?,
            died: row_date(self.died_y, self.died_m, self.died_d)?,
            link: self.link,
            name: self.name,
            description: self.description,
            days_alive: self.days_alive,
            pageviews: self.pageviews.max(0) as u64,
            image: self.image_src.map(|src| FigureImage {
                src,
                alt: self.image_alt,
            }),
            updated_at,
            generation: self.generation,
        })
    }
}

fn into_figures(rows: Vec<FigureRow>) -> StoreResult<Vec<Figure>> {
    rows.into_iter().map(FigureRow::into_figure).collect()
}

#[async_trait]
impl FigureBackend for SqliteFigureBackend {
    async fn put_figures(&self, figures: &[Figure]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for figure in figures {
            sqlx::query(
                r#"
                INSERT INTO figures (link, name, description, born_y, born_m, born_d, died_y, died_m, died_d,
                                     days_alive, pageviews, image_src, image_alt, updated_at, generation)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(link) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    born_y = excluded.born_y,
                    born_m = excluded.born_m,
                    born_d = excluded.born_d,
                    died_y = excluded.died_y,
                    died_m = excluded.died_m,
                    died_d = excluded.died_d,
                    days_alive = excluded.days_alive,
                    pageviews = excluded.pageviews,
                    image_src = excluded.image_src,
                    image_alt = excluded.image_alt,
                    updated_at = excluded.updated_at,
                    generation = excluded.generation
                "#,
            )
            .bind(&figure.link)
            .bind(&figure.name)
            .bind(&figure.description)
            .bind(i64::from(figure.born.year()))
            .bind(i64::from(figure.born.month()))
            .bind(i64::from(figure.born.day()))
            .bind(i64::from(figure.died.year()))
            .bind(i64::from(figure.died.month()))
            .bind(i64::from(figure.died.day()))
            .bind(figure.days_alive)
            .bind(i64::try_from(figure.pageviews).unwrap_or(i64::MAX))
            .bind(figure.image.as_ref().map(|i| i.src.clone()))
            .bind(figure.image.as_ref().and_then(|i| i.alt.clone()))
            .bind(figure.updated_at.timestamp_millis())
            .bind(figure.generation)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn get_figure(&self, link: &str) -> StoreResult<Option<Figure>> {
        let row = sqlx::query_as::<_, FigureRow>(&format!("{} WHERE link = ?", SELECT_FIGURE))
            .bind(link)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.map(FigureRow::into_figure).transpose()
    }

    async fn figures_died_on(&self, month: u32, day: u32, limit: usize) -> StoreResult<Vec<Figure>> {
        let rows = sqlx::query_as::<_, FigureRow>(&format!(
            "{} WHERE died_m = ? AND died_d = ? ORDER BY pageviews DESC, link ASC LIMIT ?",
            SELECT_FIGURE
        ))
        .bind(i64::from(month))
        .bind(i64::from(day))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        into_figures(rows)
    }

    async fn figures_alive_at_most(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        let rows = sqlx::query_as::<_, FigureRow>(&format!(
            "{} WHERE days_alive <= ? ORDER BY days_alive DESC, pageviews DESC, link ASC LIMIT ?",
            SELECT_FIGURE
        ))
        .bind(days)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        into_figures(rows)
    }

    async fn figures_alive_for(&self, days: i64, limit: usize) -> StoreResult<Vec<Figure>> {
        let rows = sqlx::query_as::<_, FigureRow>(&format!(
            "{} WHERE days_alive = ? ORDER BY pageviews DESC, link ASC LIMIT ?",
            SELECT_FIGURE
        ))
        .bind(days)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        into_figures(rows)
    }

    async fn stale_links(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT link FROM figures WHERE updated_at < ? ORDER BY link")
                .bind(cutoff.timestamp_millis())
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;

        Ok(rows.into_iter().map(|(link,)| link).collect())
    }

    async fn delete_figures(&self, links: &[String]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut deleted = 0u64;
        for link in links {
            deleted += sqlx::query("DELETE FROM figures WHERE link = ?")
                .bind(link)
                .execute(&mut *tx)
                .await
                .map_err(storage)?
                .rows_affected();
        }
        tx.commit().await.map_err(storage)?;
        Ok(deleted as usize)
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM figures")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        Ok(count.0 as usize)
    }

    async fn latest_generation(&self) -> StoreResult<Option<i64>> {
        let max: (Option<i64>,) = sqlx::query_as("SELECT MAX(generation) FROM figures")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        Ok(max.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteFigureBackend {
        SqliteFigureBackend::in_memory().await.unwrap()
    }

    fn figure(link: &str, born: (i32, u32, u32), died: (i32, u32, u32), views: u64) -> Figure {
        Figure::new(
            link,
            link.replace('_', " "),
            "test figure",
            Date::new(born.0, born.1, born.2).unwrap(),
            Date::new(died.0, died.1, died.2).unwrap(),
        )
        .unwrap()
        .with_pageviews(views)
        .stamped(1_700_000_000_000, DateTime::from_timestamp_millis(1_700_000_000_000).unwrap())
    }

    #[tokio::test]
    async fn test_round_trip_bce_and_image() {
        let store = test_store().await;
        let caesar = figure("Julius_Caesar", (-100, 7, 12), (-44, 3, 15), 900).with_image(Some(
            FigureImage {
                src: "//upload.wikimedia.org/caesar.jpg".to_string(),
                alt: Some("Bust".to_string()),
            },
        ));
        store.put_figures(&[caesar.clone()]).await.unwrap();

        let got = store.get_figure("Julius_Caesar").await.unwrap().unwrap();
        assert_eq!(got, caesar);
        assert!(store.get_figure("Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = test_store().await;
        store
            .put_figures(&[figure("A", (1900, 1, 1), (1950, 1, 1), 1)])
            .await
            .unwrap();
        store
            .put_figures(&[figure("A", (1900, 1, 1), (1950, 1, 1), 7)])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get_figure("A").await.unwrap().unwrap().pageviews, 7);
    }

    #[tokio::test]
    async fn test_queries_are_ordered() {
        let store = test_store().await;
        store
            .put_figures(&[
                figure("A", (1990, 1, 1), (1990, 3, 1), 5),
                figure("B", (1990, 1, 1), (1990, 3, 1), 50),
                figure("C", (1990, 1, 1), (1990, 2, 1), 500),
                figure("D", (1800, 1, 1), (1900, 3, 1), 5000),
            ])
            .await
            .unwrap();

        let died: Vec<_> = store
            .figures_died_on(3, 1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.link)
            .collect();
        assert_eq!(died, vec!["D", "B", "A"]);

        let young: Vec<_> = store
            .figures_alive_at_most(100, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.link)
            .collect();
        assert_eq!(young, vec!["B", "A", "C"]);

        let exact = store.figures_alive_for(59, 10).await.unwrap();
        assert_eq!(exact.len(), 2);
        assert_eq!(exact[0].link, "B");
    }

    #[tokio::test]
    async fn test_stale_and_delete() {
        let store = test_store().await;
        let old = figure("Old", (1900, 1, 1), (1950, 1, 1), 1)
            .stamped(1, DateTime::from_timestamp_millis(1_000).unwrap());
        let new = figure("New", (1900, 1, 1), (1950, 1, 1), 1);
        store.put_figures(&[old, new]).await.unwrap();

        let cutoff = DateTime::from_timestamp_millis(1_600_000_000_000).unwrap();
        let stale = store.stale_links(cutoff).await.unwrap();
        assert_eq!(stale, vec!["Old".to_string()]);

        assert_eq!(store.delete_figures(&stale).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.latest_generation().await.unwrap(), Some(1_700_000_000_000));
    }
}
