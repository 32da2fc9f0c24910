//! Context statistics and cleanup telemetry.
//!
//! All counters are atomic and can be read while operations are in
//! progress. [`ContextStats`] is the point-in-time snapshot produced
//! by the repository context on demand.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters maintained across cache cleanups.
#[derive(Debug, Default)]
pub struct CleanupCounters {
    /// Number of full cleanups performed.
    full_cleanups: AtomicU64,
    /// Number of partial cleanups performed.
    partial_cleanups: AtomicU64,
    /// Total dead entries reclaimed across all cleanups.
    reclaimed_total: AtomicU64,
    /// Total time spent cleaning, in microseconds.
    cleanup_micros_total: AtomicU64,
    /// When the most recent cleanup finished.
    last_cleanup: Mutex<Option<Instant>>,
}

impl CleanupCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed cleanup.
    pub(crate) fn record(&self, full: bool, reclaimed: usize, elapsed: Duration) {
        if full {
            self.full_cleanups.fetch_add(1, Ordering::Relaxed);
        } else {
            self.partial_cleanups.fetch_add(1, Ordering::Relaxed);
        }
        self.reclaimed_total
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
        self.cleanup_micros_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        *self.last_cleanup.lock() = Some(Instant::now());
    }

    /// Returns the number of full cleanups performed.
    pub fn full_cleanups(&self) -> u64 {
        self.full_cleanups.load(Ordering::Relaxed)
    }

    /// Returns the number of partial cleanups performed.
    pub fn partial_cleanups(&self) -> u64 {
        self.partial_cleanups.load(Ordering::Relaxed)
    }

    /// Returns the total number of dead entries reclaimed.
    pub fn reclaimed_total(&self) -> u64 {
        self.reclaimed_total.load(Ordering::Relaxed)
    }

    /// Returns the total time spent cleaning.
    pub fn cleanup_time_total(&self) -> Duration {
        Duration::from_micros(self.cleanup_micros_total.load(Ordering::Relaxed))
    }

    /// Returns the time since the most recent cleanup, if any ran.
    pub fn last_cleanup_age(&self) -> Option<Duration> {
        self.last_cleanup.lock().map(|at| at.elapsed())
    }
}

/// A point-in-time snapshot of context statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextStats {
    /// Entries currently in state Added.
    pub added: usize,
    /// Entries currently in state Modified.
    pub modified: usize,
    /// Entries currently in state Deleted.
    pub deleted: usize,
    /// Live Unchanged entries (approximate).
    pub unchanged_live: usize,
    /// Total cache slots, dead entries included.
    pub cache_capacity: usize,
    /// Number of full cleanups performed.
    pub full_cleanups: u64,
    /// Number of partial cleanups performed.
    pub partial_cleanups: u64,
    /// Total dead entries reclaimed across all cleanups.
    pub reclaimed_total: u64,
    /// Total time spent cleaning.
    pub cleanup_time_total: Duration,
    /// Time since the most recent cleanup, if any ran.
    pub last_cleanup_age: Option<Duration>,
}
