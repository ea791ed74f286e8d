//! Task Queue
//!
//! Bounded queue plus a fixed worker pool for background work that must not
//! block the trading path. Task failures are logged and isolated so one bad
//! task cannot stall the pool.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

type Task = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// What `add_task` does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Wait for capacity
    Block,
    /// Fail immediately with `TaskQueueError::Full`
    Reject,
}

#[derive(Debug, Error)]
pub enum TaskQueueError {
    #[error("task queue is full")]
    Full,

    #[error("task queue is stopped")]
    Stopped,
}

/// Fixed-size worker pool over a bounded mpsc queue.
///
/// Each worker dequeues and runs tasks to completion. Errors and panics from
/// individual tasks are logged, never propagated.
pub struct TaskQueue {
    tx: std::sync::Mutex<Option<mpsc::Sender<Task>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    tasks_completed: Arc<AtomicU64>,
    tasks_failed: Arc<AtomicU64>,
    policy: QueuePolicy,
    grace_period: Duration,
    stopped: AtomicBool,
}

impl TaskQueue {
    pub fn new(worker_count: usize, queue_depth: usize, policy: QueuePolicy) -> Self {
        Self::with_grace_period(worker_count, queue_depth, policy, Duration::from_secs(5))
    }

    pub fn with_grace_period(
        worker_count: usize,
        queue_depth: usize,
        policy: QueuePolicy,
        grace_period: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let tasks_completed = Arc::new(AtomicU64::new(0));
        let tasks_failed = Arc::new(AtomicU64::new(0));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let completed = Arc::clone(&tasks_completed);
                let failed = Arc::clone(&tasks_failed);
                tokio::spawn(async move {
                    loop {
                        let task = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        let Some(task) = task else { break };

                        // Run each task on its own spawn so a panic is
                        // contained to the task, not the worker.
                        match tokio::spawn(task).await {
                            Ok(Ok(())) => {
                                completed.fetch_add(1, Ordering::SeqCst);
                            }
                            Ok(Err(e)) => {
                                failed.fetch_add(1, Ordering::SeqCst);
                                tracing::warn!("Worker {}: task failed: {:#}", worker_id, e);
                            }
                            Err(e) => {
                                failed.fetch_add(1, Ordering::SeqCst);
                                tracing::warn!("Worker {}: task panicked: {}", worker_id, e);
                            }
                        }
                    }
                    tracing::debug!("Worker {} draining complete", worker_id);
                })
            })
            .collect();

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: std::sync::Mutex::new(workers),
            tasks_completed,
            tasks_failed,
            policy,
            grace_period,
            stopped: AtomicBool::new(false),
        }
    }

    /// Enqueue a background task. Blocks or rejects on a full queue per the
    /// configured policy.
    pub async fn add_task<F>(&self, task: F) -> Result<(), TaskQueueError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let tx = {
            let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone().ok_or(TaskQueueError::Stopped)?
        };

        let task: Task = Box::pin(task);
        match self.policy {
            QueuePolicy::Block => tx.send(task).await.map_err(|_| TaskQueueError::Stopped),
            QueuePolicy::Reject => tx.try_send(task).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TaskQueueError::Full,
                mpsc::error::TrySendError::Closed(_) => TaskQueueError::Stopped,
            }),
        }
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::SeqCst)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::SeqCst)
    }

    /// Stop accepting work, let in-flight tasks finish within the grace
    /// period, then abort whatever is left. Safe to call more than once.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Dropping the sender closes the channel; workers drain and exit
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let workers = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        for mut worker in workers {
            if tokio::time::timeout(self.grace_period, &mut worker)
                .await
                .is_err()
            {
                tracing::warn!("Worker did not drain within grace period, aborting");
                worker.abort();
            }
        }

        tracing::info!(
            "Task queue stopped ({} completed, {} failed)",
            self.tasks_completed(),
            self.tasks_failed()
        );
    }
}
