//! Crawl counters and progress reporting

use crate::state::CrawlStage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Store mutations made during one crawl
///
/// Updated by the reconciler under the same lock that serializes writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub categories_inserted: u64,
    pub categories_updated: u64,
    pub maps_inserted: u64,
    pub maps_updated: u64,
    pub maps_unchanged: u64,
    pub maps_deleted: u64,
    pub downloads_updated: u64,
}

impl CrawlStats {
    /// Total rows changed
    pub fn mutations(&self) -> u64 {
        self.categories_inserted
            + self.categories_updated
            + self.maps_inserted
            + self.maps_updated
            + self.maps_deleted
            + self.downloads_updated
    }
}

/// Snapshot passed to observers after each finished unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlProgress {
    /// Stage of the unit that just finished
    pub stage: CrawlStage,
    pub processed: u64,
    pub remaining: u64,
}

/// One-way progress callback
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &CrawlProgress);
}

/// Default observer that writes progress to the log
#[derive(Debug, Clone, Copy)]
pub struct TracingProgress {
    every: u64,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self { every: 25 }
    }
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for TracingProgress {
    fn on_progress(&self, progress: &CrawlProgress) {
        tracing::debug!(
            "Finished {} ({} done, {} remaining)",
            progress.stage,
            progress.processed,
            progress.remaining
        );

        if progress.processed % self.every == 0 {
            tracing::info!(
                "Progress: {} units done, {} remaining",
                progress.processed,
                progress.remaining
            );
        }
    }
}

/// Tracks scheduled and finished units, shared by every branch
#[derive(Clone)]
pub(crate) struct ProgressTracker {
    scheduled: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressTracker {
    pub(crate) fn new(observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            scheduled: Arc::new(AtomicU64::new(0)),
            processed: Arc::new(AtomicU64::new(0)),
            observer,
        }
    }

    pub(crate) fn schedule(&self, units: u64) {
        self.scheduled.fetch_add(units, Ordering::Relaxed);
    }

    /// Withdraws units that were scheduled but will never run
    pub(crate) fn cancel(&self, units: u64) {
        if units > 0 {
            self.scheduled.fetch_sub(units, Ordering::Relaxed);
        }
    }

    /// Marks one unit finished, successful or not, and notifies the observer
    pub(crate) fn finish(&self, stage: CrawlStage) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let scheduled = self.scheduled.load(Ordering::Relaxed);

        self.observer.on_progress(&CrawlProgress {
            stage,
            processed,
            remaining: scheduled.saturating_sub(processed),
        });
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Observer that keeps every snapshot
    #[derive(Default)]
    pub struct RecordingProgress {
        pub seen: Mutex<Vec<CrawlProgress>>,
    }

    impl ProgressObserver for RecordingProgress {
        fn on_progress(&self, progress: &CrawlProgress) {
            self.seen.lock().unwrap().push(progress.clone());
        }
    }
}
