//! SQLite task persistence for the managed queue.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{QueueError, QueueResult};
use crate::queues::memory_store::after;
use crate::traits::queue::{ClaimedTask, EnqueueResult, TaskStatus, TaskStore};
use crate::types::task::{ScrapeTask, TaskId, TaskPayload};

fn storage(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> QueueError {
    QueueError::Storage(e.into())
}

/// SQLite-based task store.
///
/// Several worker processes may share one database file; claims run in a
/// transaction so a task is handed to one worker at a time.
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Create a new SQLite task store with the given connection URL.
    pub async fn new(database_url: &str) -> QueueResult<Self> {
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
    pub async fn in_memory() -> QueueResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed.
    pub async fn with_pool(pool: SqlitePool) -> QueueResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> QueueResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scrape_tasks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                queue_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                run_at INTEGER NOT NULL,
                lease_expires_at INTEGER,
                worker_id TEXT,
                last_error TEXT,
                UNIQUE(queue_id, task_id)
            );

            CREATE INDEX IF NOT EXISTS idx_scrape_tasks_ready ON scrape_tasks(queue_id, status, run_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }
}

// Row type for sqlx queries
#[derive(Debug, FromRow)]
struct TaskRow {
    seq: i64,
    payload: String,
    attempts: i64,
}

impl TaskRow {
    fn into_task(self) -> QueueResult<ScrapeTask> {
        let payload: TaskPayload = serde_json::from_str(&self.payload)?;
        Ok(ScrapeTask::new(payload))
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert_if_absent(
        &self,
        queue_id: &str,
        task: &ScrapeTask,
    ) -> QueueResult<EnqueueResult> {
        let payload = serde_json::to_string(&task.payload)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scrape_tasks WHERE queue_id = ? AND task_id = ?")
                .bind(queue_id)
                .bind(task.id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;

        match existing.as_ref().and_then(|(s,)| TaskStatus::parse(s)) {
            Some(TaskStatus::Pending) | Some(TaskStatus::Running) => {
                return Ok(EnqueueResult::Duplicate(task.id.clone()));
            }
            _ if existing.is_some() => {
                sqlx::query("DELETE FROM scrape_tasks WHERE queue_id = ? AND task_id = ?")
                    .bind(queue_id)
                    .bind(task.id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(storage)?;
            }
            _ => {}
        }

        sqlx::query(
            r#"
            INSERT INTO scrape_tasks (queue_id, task_id, payload, status, attempts, run_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(queue_id)
        .bind(task.id.as_str())
        .bind(payload)
        .bind(TaskStatus::Pending.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(EnqueueResult::Created(task.id.clone()))
    }

    async fn has_pending(&self, queue_id: &str) -> QueueResult<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scrape_tasks WHERE queue_id = ? AND status IN ('pending', 'running')",
        )
        .bind(queue_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        Ok(count.0 > 0)
    }

    async fn claim(
        &self,
        queue_id: &str,
        worker_id: &str,
        limit: usize,
        lease: Duration,
    ) -> QueueResult<Vec<ClaimedTask>> {
        let now = Utc::now();
        let lease_expires_at = after(now, lease).timestamp_millis();
        let now = now.timestamp_millis();
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT seq, payload, attempts FROM scrape_tasks
            WHERE queue_id = ?
              AND ((status = 'pending' AND run_at <= ?)
                OR (status = 'running' AND lease_expires_at <= ?))
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(queue_id)
        .bind(now)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            sqlx::query(
                r#"
                UPDATE scrape_tasks
                SET status = 'running', attempts = attempts + 1, worker_id = ?, lease_expires_at = ?
                WHERE seq = ?
                "#,
            )
            .bind(worker_id)
            .bind(lease_expires_at)
            .bind(row.seq)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            let attempts = u32::try_from(row.attempts + 1).unwrap_or(u32::MAX);
            claimed.push(ClaimedTask {
                queue_id: queue_id.to_string(),
                task: row.into_task()?,
                attempts,
            });
        }

        tx.commit().await.map_err(storage)?;
        Ok(claimed)
    }

    async fn mark_succeeded(&self, queue_id: &str, id: &TaskId) -> QueueResult<()> {
        sqlx::query("DELETE FROM scrape_tasks WHERE queue_id = ? AND task_id = ?")
            .bind(queue_id)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        queue_id: &str,
        id: &TaskId,
        error: &str,
        retry_after: Option<Duration>,
    ) -> QueueResult<TaskStatus> {
        let (status, run_at) = match retry_after {
            Some(delay) => (TaskStatus::Pending, after(Utc::now(), delay)),
            None => (TaskStatus::Dead, DateTime::<Utc>::MAX_UTC),
        };

        let result = sqlx::query(
            r#"
            UPDATE scrape_tasks
            SET status = ?, run_at = ?, last_error = ?, worker_id = NULL, lease_expires_at = NULL
            WHERE queue_id = ? AND task_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(run_at.timestamp_millis())
        .bind(error)
        .bind(queue_id)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(storage(format!("unknown task {}", id)));
        }
        Ok(status)
    }

    async fn heartbeat(&self, queue_id: &str, id: &TaskId, lease: Duration) -> QueueResult<()> {
        sqlx::query(
            "UPDATE scrape_tasks SET lease_expires_at = ? WHERE queue_id = ? AND task_id = ? AND status = 'running'",
        )
        .bind(after(Utc::now(), lease).timestamp_millis())
        .bind(queue_id)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn status(&self, queue_id: &str, id: &TaskId) -> QueueResult<Option<TaskStatus>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scrape_tasks WHERE queue_id = ? AND task_id = ?")
                .bind(queue_id)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        row.map(|(s,)| {
            TaskStatus::parse(&s).ok_or_else(|| storage(format!("invalid task status: {}", s)))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(60);

    async fn test_store() -> SqliteTaskStore {
        SqliteTaskStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_dedupes_live_tasks() {
        let store = test_store().await;
        let task = ScrapeTask::person("Ada_Lovelace", "Ada Lovelace", "mathematician");

        assert!(store.insert_if_absent("q", &task).await.unwrap().is_created());
        assert!(!store.insert_if_absent("q", &task).await.unwrap().is_created());
        assert!(store.has_pending("q").await.unwrap());
        assert!(!store.has_pending("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_round_trips_payload() {
        let store = test_store().await;
        let task = ScrapeTask::person("Ada_Lovelace", "Ada Lovelace", "mathematician");
        store.insert_if_absent("q", &task).await.unwrap();
        store.insert_if_absent("q", &ScrapeTask::day(12, 10)).await.unwrap();

        let claimed = store.claim("q", "w", 1, LEASE).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].task, task);
        assert_eq!(claimed[0].attempts, 1);
        assert_eq!(
            store.status("q", &task.id).await.unwrap(),
            Some(TaskStatus::Running)
        );

        store.mark_succeeded("q", &task.id).await.unwrap();
        assert_eq!(store.status("q", &task.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_lease_and_dead_letter() {
        let store = test_store().await;
        let task = ScrapeTask::day(1, 31);
        store.insert_if_absent("q", &task).await.unwrap();

        store.claim("q", "crashed", 1, Duration::ZERO).await.unwrap();
        let again = store.claim("q", "w", 1, LEASE).await.unwrap();
        assert_eq!(again[0].attempts, 2);

        let status = store.mark_failed("q", &task.id, "boom", None).await.unwrap();
        assert_eq!(status, TaskStatus::Dead);
        assert!(!store.has_pending("q").await.unwrap());
        assert!(store.claim("q", "w", 1, LEASE).await.unwrap().is_empty());

        assert!(store.insert_if_absent("q", &task).await.unwrap().is_created());
    }
}
