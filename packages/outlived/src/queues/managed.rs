//! Managed task queue: persisted tasks drained by a worker pool.
//!
//! Producers enqueue through [`ManagedTaskQueue`]; any number of
//! [`QueueWorker`]s, in this or other processes, claim tasks from the same
//! [`TaskStore`] with a lease.
//!
//! ```text
//! QueueWorker
//!     │
//!     ├─► claim batch (TaskStore::claim, leased)
//!     ├─► run batch concurrently, one child token per task
//!     │       └─► TaskHandler::handle   (heartbeat extends the lease)
//!     └─► mark succeeded / failed (retry with backoff, then dead-letter)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{QueueResult, Result};
use crate::traits::queue::{ClaimedTask, EnqueueResult, TaskHandler, TaskQueue, TaskStatus, TaskStore};
use crate::types::task::{ScrapeTask, TaskId};

/// [`TaskQueue`] view of a [`TaskStore`].
pub struct ManagedTaskQueue<S: TaskStore + ?Sized> {
    store: Arc<S>,
}

impl<S: TaskStore + ?Sized> ManagedTaskQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<S: TaskStore + ?Sized> TaskQueue for ManagedTaskQueue<S> {
    async fn queue_empty(&self, queue_id: &str) -> QueueResult<bool> {
        Ok(!self.store.has_pending(queue_id).await?)
    }

    async fn enqueue_task(&self, queue_id: &str, task: ScrapeTask) -> QueueResult<EnqueueResult> {
        let result = self.store.insert_if_absent(queue_id, &task).await?;
        debug!(
            queue_id = %queue_id,
            task_id = %result.task_id(),
            kind = task.kind(),
            created = result.is_created(),
            "task enqueued"
        );
        Ok(result)
    }
}

/// Configuration for the queue worker.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Maximum number of tasks to claim at once
    pub batch_size: usize,
    /// How long to wait when no tasks are available
    pub poll_interval: Duration,
    /// How long a claim stays valid without a heartbeat
    pub lease: Duration,
    /// How often to extend the lease of running tasks
    pub heartbeat_interval: Duration,
    /// Claims after which a failing task is dead-lettered
    pub max_attempts: u32,
    /// Delay before the first retry; grows linearly with attempts
    pub retry_backoff: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            lease: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            max_attempts: 5,
            retry_backoff: Duration::from_secs(30),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl QueueWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    /// Delay before the retry that follows `attempts` failed claims, or
    /// `None` once the task is out of attempts.
    pub fn retry_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts < self.max_attempts).then(|| self.retry_backoff.saturating_mul(attempts.max(1)))
    }
}

/// A worker that drains one queue of a [`TaskStore`].
pub struct QueueWorker<S: TaskStore + ?Sized> {
    store: Arc<S>,
    handler: Arc<dyn TaskHandler>,
    queue_id: String,
    config: QueueWorkerConfig,
}

impl<S: TaskStore + ?Sized + 'static> QueueWorker<S> {
    pub fn new(store: Arc<S>, handler: Arc<dyn TaskHandler>, queue_id: impl Into<String>) -> Self {
        Self::with_config(store, handler, queue_id, QueueWorkerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        store: Arc<S>,
        handler: Arc<dyn TaskHandler>,
        queue_id: impl Into<String>,
        config: QueueWorkerConfig,
    ) -> Self {
        Self {
            store,
            handler,
            queue_id: queue_id.into(),
            config,
        }
    }

    pub fn config(&self) -> &QueueWorkerConfig {
        &self.config
    }

    /// Process a single claimed task.
    async fn process_task(&self, claimed: ClaimedTask, shutdown: &CancellationToken) {
        let task_id = claimed.task.id.clone();
        let kind = claimed.task.kind();

        // Create cancellation token for this task
        let task_cancel = shutdown.child_token();

        let result = self
            .execute_with_heartbeat(&claimed.task, task_cancel)
            .await;

        match result {
            Ok(()) => {
                debug!(task_id = %task_id, kind, "task succeeded");
                if let Err(e) = self.store.mark_succeeded(&self.queue_id, &task_id).await {
                    error!(task_id = %task_id, error = %e, "failed to mark task as succeeded");
                }
            }
            Err(e) => {
                let retry_after = if shutdown.is_cancelled() {
                    // Interrupted by shutdown, not the task's fault
                    Some(Duration::ZERO)
                } else {
                    self.config.retry_delay(claimed.attempts)
                };
                match self
                    .store
                    .mark_failed(&self.queue_id, &task_id, &e.to_string(), retry_after)
                    .await
                {
                    Ok(TaskStatus::Dead) => {
                        error!(task_id = %task_id, kind, attempts = claimed.attempts, error = %e, "task dead-lettered")
                    }
                    Ok(_) => {
                        warn!(task_id = %task_id, kind, attempts = claimed.attempts, error = %e, "task failed, will retry")
                    }
                    Err(mark_err) => {
                        error!(task_id = %task_id, error = %mark_err, "failed to mark task as failed")
                    }
                }
            }
        }
    }

    /// Execute a task with periodic heartbeats.
    async fn execute_with_heartbeat(
        &self,
        task: &ScrapeTask,
        cancel: CancellationToken,
    ) -> Result<()> {
        let store = self.store.clone();
        let queue_id = self.queue_id.clone();
        let task_id: TaskId = task.id.clone();
        let lease = self.config.lease;
        let heartbeat_interval = self.config.heartbeat_interval;

        // Stopped once the task finishes, independently of the task token
        let heartbeat_stop = CancellationToken::new();
        let stop = heartbeat_stop.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = store.heartbeat(&queue_id, &task_id, lease).await {
                            warn!(task_id = %task_id, error = %e, "heartbeat failed");
                        }
                    }
                }
            }
        });

        let result = self.handler.handle(task, &cancel).await;

        heartbeat_stop.cancel();
        let _ = heartbeat_handle.await;

        result
    }

    /// Claim one batch and run it to completion. Returns the batch size.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> QueueResult<usize> {
        let tasks = self
            .store
            .claim(
                &self.queue_id,
                &self.config.worker_id,
                self.config.batch_size,
                self.config.lease,
            )
            .await?;

        let count = tasks.len();
        if count > 0 {
            debug!(count, "claimed tasks");
            join_all(tasks.into_iter().map(|task| self.process_task(task, shutdown))).await;
        }
        Ok(count)
    }

    /// Poll and process until `shutdown` is cancelled.
    ///
    /// Tasks already running when shutdown begins see their child token
    /// cancelled and are released for retry.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            worker_id = %self.config.worker_id,
            queue_id = %self.queue_id,
            batch_size = self.config.batch_size,
            "queue worker starting"
        );

        loop {
            // Check for shutdown
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once(&shutdown).await {
                Ok(0) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to claim tasks");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "queue worker stopped");
    }
}
