//! In-process task queue.
//!
//! Keeps pending tasks in memory and runs them one at a time on a polling
//! timer, calling the handler directly. Suited to a single process; tasks
//! are lost on restart.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::traits::queue::{EnqueueResult, TaskHandler, TaskQueue};
use crate::types::task::{ScrapeTask, TaskId};

/// A zero interval would make the timer panic
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ScrapeTask>,
    /// Ids of pending tasks and of the task being run
    live: HashSet<TaskId>,
    running: Option<TaskId>,
}

/// A named set of in-memory FIFO queues.
#[derive(Default)]
pub struct LocalTaskQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl LocalTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, queue_id: &str, f: impl FnOnce(&mut QueueState) -> T) -> QueueResult<T> {
        let mut queues = self.queues.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(f(queues.entry(queue_id.to_string()).or_default()))
    }

    /// Snapshot of the pending tasks, in delivery order.
    pub fn pending(&self, queue_id: &str) -> QueueResult<Vec<ScrapeTask>> {
        self.with_state(queue_id, |state| state.pending.iter().cloned().collect())
    }

    /// Run the oldest pending task, if any.
    ///
    /// A task whose handler fails goes to the back of the queue. Returns
    /// the id of the task that ran and whether it succeeded.
    pub async fn process_next(
        &self,
        queue_id: &str,
        handler: &dyn TaskHandler,
        cancel: &CancellationToken,
    ) -> QueueResult<Option<(TaskId, bool)>> {
        let next = self.with_state(queue_id, |state| {
            let task = state.pending.pop_front()?;
            state.running = Some(task.id.clone());
            Some(task)
        })?;
        let Some(task) = next else {
            return Ok(None);
        };

        let result = handler.handle(&task, cancel).await;
        let id = task.id.clone();
        let succeeded = result.is_ok();

        self.with_state(queue_id, |state| {
            state.running = None;
            match &result {
                Ok(()) => {
                    state.live.remove(&task.id);
                }
                Err(_) => state.pending.push_back(task),
            }
        })?;

        match result {
            Ok(()) => debug!(queue_id = %queue_id, task_id = %id, "task done"),
            Err(e) => warn!(queue_id = %queue_id, task_id = %id, error = %e, "task failed, requeued"),
        }
        Ok(Some((id, succeeded)))
    }

    /// Poll `queue_id` every `poll_interval` until cancelled.
    ///
    /// Each tick drains the queue, stopping early at the first failed task
    /// so a persistent failure waits for the next tick.
    pub async fn run(
        &self,
        queue_id: &str,
        handler: &dyn TaskHandler,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> QueueResult<()> {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        info!(queue_id = %queue_id, ?poll_interval, "local queue starting");
        let mut interval = tokio::time::interval(poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            while !cancel.is_cancelled() {
                match self.process_next(queue_id, handler, &cancel).await? {
                    Some((_, true)) => continue,
                    Some((_, false)) | None => break,
                }
            }
        }

        info!(queue_id = %queue_id, "local queue stopped");
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn queue_empty(&self, queue_id: &str) -> QueueResult<bool> {
        self.with_state(queue_id, |state| {
            state.pending.is_empty() && state.running.is_none()
        })
    }

    async fn enqueue_task(&self, queue_id: &str, task: ScrapeTask) -> QueueResult<EnqueueResult> {
        self.with_state(queue_id, |state| {
            if !state.live.insert(task.id.clone()) {
                return EnqueueResult::Duplicate(task.id);
            }
            let id = task.id.clone();
            state.pending.push_back(task);
            EnqueueResult::Created(id)
        })
    }
}
