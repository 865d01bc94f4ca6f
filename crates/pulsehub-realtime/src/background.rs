//! Bounded pool for fire-and-forget side effects.
//!
//! Presence fan-out, delivery acknowledgments, pending drains and feed
//! classification run here so the router never waits on a collaborator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use pulsehub_core::result::AppResult;

use crate::metrics::HubMetrics;

/// Runs detached tasks with a concurrency cap and a per-task deadline.
#[derive(Debug)]
pub struct BackgroundPool {
    /// One permit per running task
    semaphore: Arc<Semaphore>,
    /// Deadline applied by [`BackgroundPool::spawn`]
    deadline: Duration,
    /// Hub metrics
    metrics: Arc<HubMetrics>,
}

impl BackgroundPool {
    /// Create a pool allowing `concurrency` tasks at once.
    pub fn new(concurrency: usize, deadline: Duration, metrics: Arc<HubMetrics>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            deadline,
            metrics,
        }
    }

    /// Spawn `task` under the default deadline.
    ///
    /// Returns `false` when every slot is busy; the task is dropped.
    pub fn spawn<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.spawn_with_deadline(label, self.deadline, task)
    }

    /// Spawn `task` under an explicit deadline.
    pub fn spawn_with_deadline<F>(&self, label: &'static str, deadline: Duration, task: F) -> bool
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                warn!(task = label, "All background slots occupied, dropping task");
                self.metrics.background_dropped();
                return false;
            }
        };

        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(deadline, task).await {
                Ok(Ok(())) => debug!(task = label, "Background task finished"),
                Ok(Err(e)) => {
                    warn!(task = label, error = %e, "Background task failed");
                    metrics.background_failed();
                }
                Err(_) => {
                    warn!(task = label, ?deadline, "Background task timed out");
                    metrics.background_failed();
                }
            }
        });
        true
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Await a collaborator call under `deadline`.
pub async fn bounded<T, F>(deadline: Duration, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(deadline, call).await?
}
