//! Scheduler for running fetch branches on a bounded worker pool
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - A work queue of branches that start only when a permit is free
//! - Skipping queued branches once shutdown is requested

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Crawl-wide abort signal
///
/// Cloning shares the flag. Once requested it stays requested.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Results of one batch of branches
#[derive(Debug)]
pub struct BatchResult<T> {
    /// Outputs of branches that ran to completion, in completion order
    pub completed: Vec<T>,
    /// Branches never started because shutdown was requested
    pub skipped: usize,
    /// Branches whose task panicked
    pub panicked: usize,
}

/// Scheduler runs independent branches with at most `workers` in flight
///
/// A permit is acquired before a branch is spawned, so the queue of pending
/// branches never turns into an unbounded set of live tasks.
pub struct Scheduler {
    permits: Arc<Semaphore>,
    workers: usize,
    shutdown: Shutdown,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `workers` - Maximum number of branches running at once (at least 1)
    /// * `shutdown` - Signal that stops queued branches from starting
    pub fn new(workers: usize, shutdown: Shutdown) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            shutdown,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Runs `task` for every job and waits for all started branches to finish
    pub async fn run_all<J, F, Fut, T>(&self, jobs: Vec<J>, task: F) -> BatchResult<T>
    where
        F: Fn(J) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = jobs.len();
        let mut set = JoinSet::new();
        let mut completed = Vec::with_capacity(total);
        let mut panicked = 0;
        let mut started = 0;

        for job in jobs {
            if self.shutdown.is_requested() {
                break;
            }

            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            // Shutdown may have been requested while waiting for a permit
            if self.shutdown.is_requested() {
                break;
            }

            let branch = task(job);
            set.spawn(async move {
                let _permit = permit;
                branch.await
            });
            started += 1;

            // Collect finished branches as we go
            while let Some(result) = set.try_join_next() {
                collect(result, &mut completed, &mut panicked);
            }
        }

        while let Some(result) = set.join_next().await {
            collect(result, &mut completed, &mut panicked);
        }

        let skipped = total - started;
        if skipped > 0 {
            tracing::warn!("Shutdown requested: {} queued branch(es) not started", skipped);
        }

        BatchResult {
            completed,
            skipped,
            panicked,
        }
    }
}

fn collect<T>(
    result: Result<T, tokio::task::JoinError>,
    completed: &mut Vec<T>,
    panicked: &mut usize,
) {
    match result {
        Ok(value) => completed.push(value),
        Err(e) => {
            tracing::error!("Branch task failed: {}", e);
            *panicked += 1;
        }
    }
}
