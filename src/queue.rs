//! # Async Task Queue
//!
//! A fixed pool of background workers draining a FIFO queue of submitted
//! futures. Outcomes are kept per task id in separate completed and failed
//! maps.
//!
//! Shutdown is cooperative: [`AsyncTaskQueue::stop_workers`] raises a flag
//! that workers check between tasks, then waits for every worker to exit. A
//! task already running is finished and recorded first; tasks still queued
//! stay pending.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Job<T> = (String, BoxFuture<'static, anyhow::Result<T>>);
type SharedReceiver<T> = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job<T>>>>;

/// Where a task is. Lookup priority: completed, failed, running, pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, or never seen.
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

struct QueueState<T> {
    queued: HashSet<String>,
    running: HashSet<String>,
    completed: HashMap<String, T>,
    failed: HashMap<String, String>,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            queued: HashSet::new(),
            running: HashSet::new(),
            completed: HashMap::new(),
            failed: HashMap::new(),
        }
    }
}

type SharedState<T> = Arc<Mutex<QueueState<T>>>;

fn lock<T>(state: &SharedState<T>) -> MutexGuard<'_, QueueState<T>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bounded-concurrency background executor.
pub struct AsyncTaskQueue<T> {
    max_concurrent_tasks: usize,
    sender: mpsc::UnboundedSender<Job<T>>,
    receiver: SharedReceiver<T>,
    state: SharedState<T>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> AsyncTaskQueue<T> {
    pub fn new(max_concurrent_tasks: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            max_concurrent_tasks: max_concurrent_tasks.max(1),
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            state: Arc::new(Mutex::new(QueueState::default())),
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks
    }

    /// Spawn the worker pool. Does nothing if workers are already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_workers(&self) {
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !workers.is_empty() {
            return;
        }

        self.shutdown.send_replace(false);
        for index in 0..self.max_concurrent_tasks {
            let worker = format!("worker_{index}");
            workers.push(tokio::spawn(run_worker(
                worker,
                Arc::clone(&self.receiver),
                Arc::clone(&self.state),
                self.shutdown.subscribe(),
            )));
        }
        info!(workers = self.max_concurrent_tasks, "Task queue workers started");
    }

    /// Signal the workers to stop and wait until each has exited.
    pub async fn stop_workers(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            workers.drain(..).collect()
        };

        for handle in futures::future::join_all(handles).await {
            if let Err(e) = handle {
                warn!(error = %e, "Task queue worker ended abnormally");
            }
        }
        info!("Task queue workers stopped");
    }

    /// Queue a task. Returns its id.
    pub fn submit_task<F>(&self, task_id: impl Into<String>, task: F) -> anyhow::Result<String>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let task_id = task_id.into();
        lock(&self.state).queued.insert(task_id.clone());

        if self.sender.send((task_id.clone(), task.boxed())).is_err() {
            lock(&self.state).queued.remove(&task_id);
            anyhow::bail!("task queue is closed");
        }
        debug!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    pub fn get_task_status(&self, task_id: &str) -> TaskStatus {
        let state = lock(&self.state);
        if state.completed.contains_key(task_id) {
            TaskStatus::Completed
        } else if state.failed.contains_key(task_id) {
            TaskStatus::Failed
        } else if state.running.contains(task_id) {
            TaskStatus::Running
        } else {
            TaskStatus::Pending
        }
    }

    pub fn get_task_result(&self, task_id: &str) -> Option<T>
    where
        T: Clone,
    {
        lock(&self.state).completed.get(task_id).cloned()
    }

    pub fn get_task_error(&self, task_id: &str) -> Option<String> {
        lock(&self.state).failed.get(task_id).cloned()
    }

    /// Tasks submitted but not yet picked up by a worker.
    pub fn pending_count(&self) -> usize {
        lock(&self.state).queued.len()
    }

    pub fn running_count(&self) -> usize {
        lock(&self.state).running.len()
    }
}

async fn next_job<T>(receiver: &tokio::sync::Mutex<mpsc::UnboundedReceiver<Job<T>>>) -> Option<Job<T>> {
    receiver.lock().await.recv().await
}

async fn run_worker<T: Send + 'static>(
    worker: String,
    receiver: SharedReceiver<T>,
    state: SharedState<T>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker = %worker, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            job = next_job(&receiver) => job,
        };
        let Some((task_id, task)) = job else {
            break;
        };

        {
            let mut state = lock(&state);
            state.queued.remove(&task_id);
            state.running.insert(task_id.clone());
        }
        debug!(worker = %worker, task_id = %task_id, "Task started");

        let outcome = AssertUnwindSafe(task).catch_unwind().await;

        let mut state = lock(&state);
        state.running.remove(&task_id);
        match outcome {
            Ok(Ok(value)) => {
                debug!(worker = %worker, task_id = %task_id, "Task completed");
                state.completed.insert(task_id, value);
            }
            Ok(Err(e)) => {
                warn!(worker = %worker, task_id = %task_id, error = %e, "Task failed");
                state.failed.insert(task_id, e.to_string());
            }
            Err(_) => {
                warn!(worker = %worker, task_id = %task_id, "Task panicked");
                state.failed.insert(task_id, "task panicked".to_string());
            }
        }
    }
    debug!(worker = %worker, "Worker stopped");
}
