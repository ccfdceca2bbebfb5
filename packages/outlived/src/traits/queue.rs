//! Task queue abstractions.
//!
//! The orchestrator only needs two things from a queue: "is it empty?" and
//! "enqueue this task". [`TaskQueue`] is that capability. The managed queue
//! additionally persists tasks through a [`TaskStore`] so that several
//! workers can claim them with leases.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{QueueResult, Result};
use crate::types::task::{ScrapeTask, TaskId};

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Task was enqueued
    Created(TaskId),
    /// A pending or running task with the same id already exists
    Duplicate(TaskId),
}

impl EnqueueResult {
    /// Get the task ID regardless of whether it was created or duplicate
    pub fn task_id(&self) -> &TaskId {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => id,
        }
    }

    /// Returns true if this was a newly created task
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// A named queue of pending scrape tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// True when no task in `queue_id` is pending or running.
    async fn queue_empty(&self, queue_id: &str) -> QueueResult<bool>;

    /// Enqueue a task. A task whose id is already pending or running is not
    /// added again.
    async fn enqueue_task(&self, queue_id: &str, task: ScrapeTask) -> QueueResult<EnqueueResult>;
}

/// Executes one task delivered by a queue.
///
/// An `Err` asks the queue to deliver the task again later.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &ScrapeTask, cancel: &CancellationToken) -> Result<()>;
}

/// Lifecycle of a persisted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    /// Out of attempts; kept for inspection, never claimed again
    Dead,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "dead" => Some(TaskStatus::Dead),
            _ => None,
        }
    }
}

/// A task claimed by a worker.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub queue_id: String,
    pub task: ScrapeTask,
    /// Number of claims so far, including this one
    pub attempts: u32,
}

/// Persistence for the managed queue.
///
/// Completed tasks are deleted. Failed tasks are rescheduled or moved to
/// [`TaskStatus::Dead`] by the caller's retry policy.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a pending task unless one with the same id is pending or
    /// running. A dead task with the same id is replaced.
    async fn insert_if_absent(&self, queue_id: &str, task: &ScrapeTask)
        -> QueueResult<EnqueueResult>;

    /// True when any task in the queue is pending or running.
    async fn has_pending(&self, queue_id: &str) -> QueueResult<bool>;

    /// Claim up to `limit` ready tasks, oldest first.
    ///
    /// Ready means pending and due, or running with an expired lease (the
    /// previous worker died). Claiming increments the attempt count.
    async fn claim(
        &self,
        queue_id: &str,
        worker_id: &str,
        limit: usize,
        lease: Duration,
    ) -> QueueResult<Vec<ClaimedTask>>;

    /// Remove a completed task.
    async fn mark_succeeded(&self, queue_id: &str, id: &TaskId) -> QueueResult<()>;

    /// Record a failure. With `retry_after` the task becomes pending again
    /// after that delay, without it the task is dead-lettered.
    async fn mark_failed(
        &self,
        queue_id: &str,
        id: &TaskId,
        error: &str,
        retry_after: Option<Duration>,
    ) -> QueueResult<TaskStatus>;

    /// Extend the lease of a running task.
    async fn heartbeat(&self, queue_id: &str, id: &TaskId, lease: Duration) -> QueueResult<()>;

    /// Status of a task, `None` once it has succeeded.
    async fn status(&self, queue_id: &str, id: &TaskId) -> QueueResult<Option<TaskStatus>>;
}
