//! In-memory task persistence for the managed queue.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{QueueError, QueueResult};
use crate::traits::queue::{ClaimedTask, EnqueueResult, TaskStatus, TaskStore};
use crate::types::task::{ScrapeTask, TaskId};

/// `now + delay`, saturating at the end of time.
pub(crate) fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone)]
struct StoredTask {
    task: ScrapeTask,
    status: TaskStatus,
    attempts: u32,
    run_at: DateTime<Utc>,
    lease_expires_at: Option<DateTime<Utc>>,
    worker_id: Option<String>,
    last_error: Option<String>,
    seq: u64,
}

impl StoredTask {
    fn ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TaskStatus::Pending => self.run_at <= now,
            TaskStatus::Running => self.lease_expires_at.is_some_and(|lease| lease <= now),
            TaskStatus::Dead => false,
        }
    }
}

#[derive(Default)]
struct Tasks {
    by_key: HashMap<(String, TaskId), StoredTask>,
    next_seq: u64,
}

/// Task store kept in process memory.
///
/// Useful for tests and single-process deployments that want the managed
/// queue's retry semantics without a database.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Tasks>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded failure message of a task.
    pub fn last_error(&self, queue_id: &str, id: &TaskId) -> QueueResult<Option<String>> {
        let tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(tasks
            .by_key
            .get(&(queue_id.to_string(), id.clone()))
            .and_then(|t| t.last_error.clone()))
    }
}

fn unknown(id: &TaskId) -> QueueError {
    QueueError::Storage(format!("unknown task {}", id).into())
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert_if_absent(
        &self,
        queue_id: &str,
        task: &ScrapeTask,
    ) -> QueueResult<EnqueueResult> {
        let mut tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        let key = (queue_id.to_string(), task.id.clone());

        if let Some(existing) = tasks.by_key.get(&key) {
            if existing.status != TaskStatus::Dead {
                return Ok(EnqueueResult::Duplicate(task.id.clone()));
            }
        }

        let seq = tasks.next_seq;
        tasks.next_seq += 1;
        tasks.by_key.insert(
            key,
            StoredTask {
                task: task.clone(),
                status: TaskStatus::Pending,
                attempts: 0,
                run_at: Utc::now(),
                lease_expires_at: None,
                worker_id: None,
                last_error: None,
                seq,
            },
        );
        Ok(EnqueueResult::Created(task.id.clone()))
    }

    async fn has_pending(&self, queue_id: &str) -> QueueResult<bool> {
        let tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(tasks
            .by_key
            .iter()
            .any(|((queue, _), t)| queue == queue_id && t.status != TaskStatus::Dead))
    }

    async fn claim(
        &self,
        queue_id: &str,
        worker_id: &str,
        limit: usize,
        lease: Duration,
    ) -> QueueResult<Vec<ClaimedTask>> {
        let mut tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        let now = Utc::now();

        let mut ready: Vec<_> = tasks
            .by_key
            .iter()
            .filter(|((queue, _), t)| queue == queue_id && t.ready(now))
            .map(|(key, t)| (t.seq, key.clone()))
            .collect();
        ready.sort();
        ready.truncate(limit);

        let mut claimed = Vec::with_capacity(ready.len());
        for (_, key) in ready {
            if let Some(t) = tasks.by_key.get_mut(&key) {
                t.status = TaskStatus::Running;
                t.attempts += 1;
                t.worker_id = Some(worker_id.to_string());
                t.lease_expires_at = Some(after(now, lease));
                claimed.push(ClaimedTask {
                    queue_id: queue_id.to_string(),
                    task: t.task.clone(),
                    attempts: t.attempts,
                });
            }
        }
        Ok(claimed)
    }

    async fn mark_succeeded(&self, queue_id: &str, id: &TaskId) -> QueueResult<()> {
        let mut tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        tasks.by_key.remove(&(queue_id.to_string(), id.clone()));
        Ok(())
    }

    async fn mark_failed(
        &self,
        queue_id: &str,
        id: &TaskId,
        error: &str,
        retry_after: Option<Duration>,
    ) -> QueueResult<TaskStatus> {
        let mut tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        let t = tasks
            .by_key
            .get_mut(&(queue_id.to_string(), id.clone()))
            .ok_or_else(|| unknown(id))?;

        t.last_error = Some(error.to_string());
        t.worker_id = None;
        t.lease_expires_at = None;
        t.status = match retry_after {
            Some(delay) => {
                t.run_at = after(Utc::now(), delay);
                TaskStatus::Pending
            }
            None => TaskStatus::Dead,
        };
        Ok(t.status)
    }

    async fn heartbeat(&self, queue_id: &str, id: &TaskId, lease: Duration) -> QueueResult<()> {
        let mut tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        if let Some(t) = tasks.by_key.get_mut(&(queue_id.to_string(), id.clone())) {
            if t.status == TaskStatus::Running {
                t.lease_expires_at = Some(after(Utc::now(), lease));
            }
        }
        Ok(())
    }

    async fn status(&self, queue_id: &str, id: &TaskId) -> QueueResult<Option<TaskStatus>> {
        let tasks = self.tasks.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(tasks
            .by_key
            .get(&(queue_id.to_string(), id.clone()))
            .map(|t| t.status))
    }
}
