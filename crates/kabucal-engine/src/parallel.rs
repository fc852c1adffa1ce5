//! Bounded worker pool with per-task timeouts and failure isolation.
//!
//! `width` workers drain a shared queue. Each worker owns a context value
//! built once by `make_context(worker_index)` and hands a shared reference
//! to every task it runs, so per-worker resources such as HTTP clients are
//! never shared across workers. Every task runs on its own tokio task: a
//! panic or a timeout is confined to that task's [`TaskOutcome`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;

/// What happened to one submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// The task panicked or was cancelled.
    Failed(String),
    TimedOut,
}

impl<T> TaskOutcome<T> {
    /// The completed value, or `None` for a failed or timed-out task.
    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(v) => Some(v),
            TaskOutcome::Failed(_) | TaskOutcome::TimedOut => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    width: usize,
    timeout: Duration,
}

impl ParallelExecutor {
    /// A `width` of zero is treated as one.
    #[must_use]
    pub fn new(width: usize, timeout: Duration) -> Self {
        Self {
            width: width.max(1),
            timeout,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Runs `task` over every job and returns one outcome per job, in the
    /// order the jobs were given.
    pub async fn run<J, C, T, M, F, Fut>(&self, jobs: Vec<J>, make_context: M, task: F) -> Vec<TaskOutcome<T>>
    where
        J: Send + 'static,
        C: Send + Sync + 'static,
        T: Send + 'static,
        M: Fn(usize) -> C,
        F: Fn(Arc<C>, J) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let queue: Mutex<VecDeque<(usize, J)>> = Mutex::new(jobs.into_iter().enumerate().collect());
        let workers = self.width.min(total);
        let task = &task;
        let queue = &queue;

        let per_worker = join_all((0..workers).map(|worker| {
            let context = Arc::new(make_context(worker));
            async move {
                let mut done = Vec::new();
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((index, job)) = next else {
                        break;
                    };
                    let outcome = self.run_one(task(Arc::clone(&context), job)).await;
                    done.push((index, outcome));
                }
                done
            }
        }))
        .await;

        let mut outcomes: Vec<(usize, TaskOutcome<T>)> = per_worker.into_iter().flatten().collect();
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn run_one<T, Fut>(&self, fut: Fut) -> TaskOutcome<T>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut handle = tokio::spawn(fut);
        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
            Err(_) => {
                handle.abort();
                TaskOutcome::TimedOut
            }
        }
    }
}
