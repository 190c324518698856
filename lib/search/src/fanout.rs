// Bounded concurrent sub-search runner
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use panelx_core::{Error, Result};

/// One unit of work handed to [`Fanout::run`]
pub struct SubSearch<T> {
    pub label: String,
    pub fut: BoxFuture<'static, Result<T>>,
}

impl<T> SubSearch<T> {
    pub fn new(label: impl Into<String>, fut: BoxFuture<'static, Result<T>>) -> Self {
        Self {
            label: label.into(),
            fut,
        }
    }
}

#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(Error),
    TimedOut,
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs sub-searches concurrently under a worker cap and a per-task
/// timeout. A failed or timed-out task never cancels its siblings.
#[derive(Debug, Clone, Copy)]
pub struct Fanout {
    timeout: Duration,
    max_workers: usize,
}

impl Fanout {
    pub fn new(timeout: Duration, max_workers: usize) -> Self {
        Self {
            timeout,
            max_workers: max_workers.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Outcomes in the order the tasks were given
    pub async fn run<T: Send + 'static>(&self, tasks: Vec<SubSearch<T>>) -> Vec<TaskOutcome<T>> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = total.min(self.max_workers);
        let permits = Arc::new(Semaphore::new(workers));
        let mut labels = Vec::with_capacity(total);
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            labels.push(task.label.clone());
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;
            set.spawn(async move {
                // the timeout covers execution, not queueing behind the cap
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, TaskOutcome::Failed(Error::unavailable(task.label, e))),
                };
                let started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, task.fut).await {
                    Ok(Ok(value)) => TaskOutcome::Completed(value),
                    Ok(Err(e)) => TaskOutcome::Failed(e),
                    Err(_) => TaskOutcome::TimedOut,
                };
                debug!(task = %task.label, elapsed_ms = started.elapsed().as_millis() as u64, "Sub-search finished");
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<TaskOutcome<T>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Sub-search task aborted"),
            }
        }

        outcomes
            .into_iter()
            .zip(labels)
            .map(|(outcome, label)| {
                let outcome = outcome.unwrap_or_else(|| TaskOutcome::Failed(Error::unavailable(&label, "task aborted")));
                match &outcome {
                    TaskOutcome::Failed(e) => warn!(task = %label, error = %e, "Sub-search failed; contributing nothing"),
                    TaskOutcome::TimedOut => {
                        warn!(task = %label, timeout_ms = self.timeout.as_millis() as u64, "Sub-search timed out; contributing nothing")
                    }
                    TaskOutcome::Completed(_) => {}
                }
                outcome
            })
            .collect()
    }
}
