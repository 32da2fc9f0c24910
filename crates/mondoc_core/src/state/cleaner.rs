//! Background cache cleaner.

use crate::state::{reclamation_events, StateManager};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct CleanerShared {
    shutdown: AtomicBool,
    poked: Mutex<bool>,
    signal: Condvar,
}

/// A long-running worker reclaiming dead cache entries.
///
/// The cleaner watches the process-wide reclamation generation. On
/// each wake-up - a poke, an observed reclamation, or the upper-bound
/// timeout - it runs a cleanup if at least the lower bound has elapsed
/// since the last one. A wake-up that observed reclamation activity
/// runs a full cleanup; a plain timeout runs a partial, best-effort
/// one.
///
/// Shutdown is cooperative: the polling wait is the only exit point.
/// Dropping the cleaner shuts it down and joins the worker.
pub struct CacheCleaner {
    shared: Arc<CleanerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CacheCleaner {
    /// Spawns a cleaner for a state manager.
    ///
    /// `lower_bound` is the minimum spacing between cleanups;
    /// `upper_bound` caps the polling wait so a best-effort cleanup
    /// eventually runs even without reclamation signals.
    #[must_use]
    pub fn spawn(state: Arc<StateManager>, lower_bound: Duration, upper_bound: Duration) -> Self {
        let shared = Arc::new(CleanerShared {
            shutdown: AtomicBool::new(false),
            poked: Mutex::new(false),
            signal: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("mondoc-cache-cleaner".into())
            .spawn(move || run(state, &worker_shared, lower_bound, upper_bound))
            .ok();
        if handle.is_none() {
            tracing::warn!("failed to spawn cache cleaner thread");
        }
        Self {
            shared,
            handle: Mutex::new(handle),
        }
    }

    /// Wakes the cleaner immediately, as a reclamation signal would.
    pub fn poke(&self) {
        *self.shared.poked.lock() = true;
        self.shared.signal.notify_all();
    }

    /// Signals shutdown and joins the worker.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Returns true if the worker is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn run(
    state: Arc<StateManager>,
    shared: &CleanerShared,
    lower_bound: Duration,
    upper_bound: Duration,
) {
    let mut last_generation = reclamation_events();
    let mut last_cleanup: Option<Instant> = None;

    loop {
        let poked = {
            let mut poked = shared.poked.lock();
            if !*poked && !shared.shutdown.load(Ordering::Acquire) {
                let _ = shared.signal.wait_for(&mut poked, upper_bound);
            }
            std::mem::take(&mut *poked)
        };
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let generation = reclamation_events();
        let reclaimed_since = generation != last_generation;
        let due = last_cleanup.map_or(true, |at| at.elapsed() >= lower_bound);
        if !due {
            continue;
        }

        let full = reclaimed_since || poked;
        let removed = state.clean_up(full);
        if removed > 0 {
            tracing::debug!(full, removed, "cache cleanup reclaimed dead entries");
        }
        last_cleanup = Some(Instant::now());
        last_generation = generation;
    }
}

impl Drop for CacheCleaner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for CacheCleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCleaner")
            .field("running", &self.is_running())
            .finish()
    }
}
