//! Progress tracking for batch runs.
//!
//! Workers report through a [`BatchProgress`], which keeps the counters and
//! forwards [`BatchEvent`]s to an optional observer channel. Sending never
//! blocks a worker: the channel is unbounded and a dropped receiver is
//! ignored.

use crossbeam::channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// The batch has started.
    Started {
        total: usize,
    },
    /// A photo has started processing.
    ItemStarted {
        index: usize,
        source: PathBuf,
    },
    /// A photo was processed successfully.
    ItemCompleted {
        index: usize,
        source: PathBuf,
        duration_ms: u64,
    },
    /// A photo was skipped because its output already exists.
    ItemSkipped {
        index: usize,
        source: PathBuf,
    },
    /// A photo failed.
    ItemFailed {
        index: usize,
        source: PathBuf,
        message: String,
    },
    /// Overall progress percentage.
    Progress {
        percent: f32,
        elapsed_ms: u64,
        estimated_remaining_ms: Option<u64>,
    },
    /// The batch has finished.
    Completed {
        total_duration_ms: u64,
        success: usize,
        failure: usize,
        skipped: usize,
    },
}

/// Counts batch outcomes and forwards events.
pub struct BatchProgress {
    /// Total number of items.
    total: usize,
    success: AtomicUsize,
    failure: AtomicUsize,
    skipped: AtomicUsize,
    /// Start time.
    start_time: Instant,
    /// Event sink.
    observer: Option<Sender<BatchEvent>>,
    /// Item durations for estimation.
    item_times: parking_lot::Mutex<Vec<u64>>,
}

impl BatchProgress {
    /// Create a tracker and announce the batch.
    pub fn start(total: usize, observer: Option<Sender<BatchEvent>>) -> Self {
        let progress = Self {
            total,
            success: AtomicUsize::new(0),
            failure: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            start_time: Instant::now(),
            observer,
            item_times: parking_lot::Mutex::new(Vec::new()),
        };
        progress.send(BatchEvent::Started { total });
        progress
    }

    /// Report that an item has started.
    pub fn item_started(&self, index: usize, source: PathBuf) {
        self.send(BatchEvent::ItemStarted { index, source });
    }

    /// Report a success.
    pub fn item_completed(&self, index: usize, source: PathBuf, duration_ms: u64) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.item_times.lock().push(duration_ms);
        self.send(BatchEvent::ItemCompleted {
            index,
            source,
            duration_ms,
        });
        self.send_progress_update();
    }

    /// Report a skip.
    pub fn item_skipped(&self, index: usize, source: PathBuf) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.send(BatchEvent::ItemSkipped { index, source });
        self.send_progress_update();
    }

    /// Report a failure.
    pub fn item_failed(&self, index: usize, source: PathBuf, message: String) {
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.send(BatchEvent::ItemFailed {
            index,
            source,
            message,
        });
        self.send_progress_update();
    }

    /// Items finished so far, whatever the outcome.
    pub fn processed(&self) -> usize {
        self.success() + self.failure() + self.skipped()
    }

    /// Successful items.
    pub fn success(&self) -> usize {
        self.success.load(Ordering::Relaxed)
    }

    /// Failed items.
    pub fn failure(&self) -> usize {
        self.failure.load(Ordering::Relaxed)
    }

    /// Skipped items.
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed() as f32 / self.total as f32) * 100.0
    }

    /// Estimate remaining time in milliseconds.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let times = self.item_times.lock();
        if times.is_empty() {
            return None;
        }

        let avg_time: u64 = times.iter().sum::<u64>() / times.len() as u64;
        let remaining = self.total.saturating_sub(self.processed());
        Some(avg_time * remaining as u64)
    }

    /// Announce completion.
    pub fn complete(&self) {
        self.send(BatchEvent::Completed {
            total_duration_ms: self.start_time.elapsed().as_millis() as u64,
            success: self.success(),
            failure: self.failure(),
            skipped: self.skipped(),
        });
    }

    fn send(&self, event: BatchEvent) {
        if let Some(ref observer) = self.observer {
            // a gone observer only loses notifications
            let _ = observer.send(event);
        }
    }

    fn send_progress_update(&self) {
        self.send(BatchEvent::Progress {
            percent: self.progress_percent(),
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
            estimated_remaining_ms: self.estimated_remaining_ms(),
        });
    }
}
