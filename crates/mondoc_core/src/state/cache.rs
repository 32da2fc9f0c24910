//! Liveness-aware cache of Unchanged state entries.

use crate::state::StateEntry;
use mondoc_record::DocumentId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of reclamation events after which a cached approximate
/// count is considered stale and a recount is forced.
pub const RECOUNT_RECLAIM_THRESHOLD: u64 = 10;

/// Process-wide count of document reclamations.
static RECLAIM_EVENTS: AtomicU64 = AtomicU64::new(0);

/// Records one reclamation event. Called by the drop of every tracked
/// document.
pub(crate) fn note_reclamation() {
    RECLAIM_EVENTS.fetch_add(1, Ordering::Relaxed);
}

/// Returns the process-wide reclamation generation: the total number
/// of tracked documents dropped so far.
#[must_use]
pub fn reclamation_events() -> u64 {
    RECLAIM_EVENTS.load(Ordering::Relaxed)
}

/// The liveness predicate: returns true if the entry is dead.
pub type LivenessCheck = Box<dyn Fn(&DocumentId, &StateEntry) -> bool + Send + Sync>;

struct CountSample {
    live: usize,
    generation: u64,
}

/// A mapping from identity to Unchanged state entry, parameterized by
/// a liveness predicate.
///
/// Dead entries - those whose weakly held document has been reclaimed -
/// stay in the map as slots until a flush removes them. Reads skip
/// them; [`capacity`](Self::capacity) counts them.
///
/// # Concurrency
///
/// Mutating operations serialize against one another and against
/// `flush`; `try_get` and `contains` run concurrently with other
/// readers but never with a writer.
pub struct DocumentCache {
    entries: RwLock<HashMap<DocumentId, Arc<StateEntry>>>,
    is_dead: LivenessCheck,
    sample: Mutex<Option<CountSample>>,
}

impl DocumentCache {
    /// Creates a cache with the default liveness predicate
    /// ([`StateEntry::is_dead`]).
    #[must_use]
    pub fn new() -> Self {
        Self::with_liveness(Box::new(|_, entry| entry.is_dead()))
    }

    /// Creates a cache with a custom liveness predicate.
    #[must_use]
    pub fn with_liveness(is_dead: LivenessCheck) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            is_dead,
            sample: Mutex::new(None),
        }
    }

    /// Inserts or overwrites an entry. The overwrite is unconditional
    /// even if the current entry is live.
    pub fn set(&self, key: DocumentId, entry: Arc<StateEntry>) {
        self.entries.write().insert(key, entry);
        self.invalidate_sample();
    }

    /// Inserts via `make` if the key is absent, returns the existing
    /// entry if it is live, or replaces a dead entry via `revive`.
    pub fn add_or_get(
        &self,
        key: DocumentId,
        make: impl FnOnce(DocumentId) -> Arc<StateEntry>,
        revive: impl FnOnce(DocumentId, &Arc<StateEntry>) -> Arc<StateEntry>,
    ) -> Arc<StateEntry> {
        let mut entries = self.entries.write();
        let entry = match entries.get(&key) {
            None => {
                let made = make(key);
                entries.insert(key, Arc::clone(&made));
                made
            }
            Some(existing) if !(self.is_dead)(&key, existing) => Arc::clone(existing),
            Some(existing) => {
                let revived = revive(key, existing);
                entries.insert(key, Arc::clone(&revived));
                revived
            }
        };
        drop(entries);
        self.invalidate_sample();
        entry
    }

    /// Returns the entry for a key only if it is live.
    #[must_use]
    pub fn try_get(&self, key: DocumentId) -> Option<Arc<StateEntry>> {
        let entries = self.entries.read();
        let entry = entries.get(&key)?;
        if (self.is_dead)(&key, entry) {
            None
        } else {
            Some(Arc::clone(entry))
        }
    }

    /// Returns the entry for a key regardless of liveness.
    ///
    /// Used for dead-entry revival: a write to the same identity
    /// replaces the dead entry's wrapper rather than the entry.
    #[must_use]
    pub fn get_any(&self, key: DocumentId) -> Option<Arc<StateEntry>> {
        self.entries.read().get(&key).map(Arc::clone)
    }

    /// Returns true if a live entry exists for the key.
    #[must_use]
    pub fn contains(&self, key: DocumentId) -> bool {
        self.try_get(key).is_some()
    }

    /// Removes an entry unconditionally, returning the previous entry
    /// if any.
    pub fn remove(&self, key: DocumentId) -> Option<Arc<StateEntry>> {
        let removed = self.entries.write().remove(&key);
        if removed.is_some() {
            self.invalidate_sample();
        }
        removed
    }

    /// Scans the cache and removes at most `max_to_remove` dead
    /// entries, returning the count actually removed.
    pub fn flush(&self, max_to_remove: usize) -> usize {
        let mut removed = 0;
        if max_to_remove > 0 {
            let mut entries = self.entries.write();
            let dead: Vec<DocumentId> = entries
                .iter()
                .filter(|(key, entry)| (self.is_dead)(key, entry))
                .map(|(key, _)| *key)
                .take(max_to_remove)
                .collect();
            for key in dead {
                entries.remove(&key);
                removed += 1;
            }
        }
        // The cached count is stale after every flush, even one that
        // removed nothing.
        self.invalidate_sample();
        removed
    }

    /// Returns a possibly cached count of live entries.
    ///
    /// The cached value is invalidated after every mutation and
    /// whenever the process-wide reclamation generation has advanced
    /// by at least [`RECOUNT_RECLAIM_THRESHOLD`] events since it was
    /// sampled.
    #[must_use]
    pub fn approximate_count(&self) -> usize {
        let generation = reclamation_events();
        let mut sample = self.sample.lock();
        if let Some(current) = sample.as_ref() {
            if generation.saturating_sub(current.generation) < RECOUNT_RECLAIM_THRESHOLD {
                return current.live;
            }
        }
        let live = self.count_live();
        *sample = Some(CountSample { live, generation });
        live
    }

    /// Forces a full live-scan count.
    #[must_use]
    pub fn exact_count(&self) -> usize {
        let live = self.count_live();
        *self.sample.lock() = Some(CountSample {
            live,
            generation: reclamation_events(),
        });
        live
    }

    /// Returns the total number of slots, dead entries included.
    ///
    /// This is the quantity incremental flush sizes are computed from.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns a snapshot of the live entries.
    #[must_use]
    pub fn live_entries(&self) -> Vec<Arc<StateEntry>> {
        self.entries
            .read()
            .iter()
            .filter(|(key, entry)| !(self.is_dead)(key, entry))
            .map(|(_, entry)| Arc::clone(entry))
            .collect()
    }

    fn count_live(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|(key, entry)| !(self.is_dead)(key, entry))
            .count()
    }

    fn invalidate_sample(&self) {
        *self.sample.lock() = None;
    }
}

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCache")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentBase, PropertySpec};
    use crate::state::DocumentState;
    use std::any::Any;

    const LAYOUT: &[PropertySpec] = &[PropertySpec::scalar("name")];

    struct Note {
        base: DocumentBase,
    }

    impl Note {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                base: DocumentBase::new("notes", LAYOUT),
            })
        }
    }

    impl Document for Note {
        fn base(&self) -> &DocumentBase {
            &self.base
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    /// A live entry plus the strong document reference keeping it so.
    fn live_entry() -> (Arc<dyn Document>, Arc<StateEntry>) {
        let note: Arc<dyn Document> = Note::new();
        let entry = Arc::new(StateEntry::new(Arc::clone(&note), DocumentState::Unchanged));
        (note, entry)
    }

    fn dead_entry() -> Arc<StateEntry> {
        let note = Note::new();
        Arc::new(StateEntry::new(note, DocumentState::Unchanged))
    }

    #[test]
    fn set_and_try_get_live() {
        let cache = DocumentCache::new();
        let (_doc, entry) = live_entry();
        let key = entry.id();

        cache.set(key, Arc::clone(&entry));
        assert!(cache.contains(key));
        assert!(Arc::ptr_eq(&cache.try_get(key).unwrap(), &entry));
    }

    #[test]
    fn try_get_skips_dead() {
        let cache = DocumentCache::new();
        let entry = dead_entry();
        let key = entry.id();

        cache.set(key, entry);
        assert!(cache.try_get(key).is_none());
        assert!(!cache.contains(key));
        // The slot is still there.
        assert!(cache.get_any(key).is_some());
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn set_overwrites_live_entry() {
        let cache = DocumentCache::new();
        let (_doc1, first) = live_entry();
        let (_doc2, second) = live_entry();
        let key = first.id();

        cache.set(key, first);
        cache.set(key, Arc::clone(&second));
        assert!(Arc::ptr_eq(&cache.get_any(key).unwrap(), &second));
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn add_or_get_makes_when_absent() {
        let cache = DocumentCache::new();
        let (_doc, entry) = live_entry();
        let key = entry.id();

        let returned = cache.add_or_get(key, |_| Arc::clone(&entry), |_, _| unreachable!());
        assert!(Arc::ptr_eq(&returned, &entry));
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn add_or_get_returns_live_existing() {
        let cache = DocumentCache::new();
        let (_doc, entry) = live_entry();
        let key = entry.id();
        cache.set(key, Arc::clone(&entry));

        let returned = cache.add_or_get(key, |_| unreachable!(), |_, _| unreachable!());
        assert!(Arc::ptr_eq(&returned, &entry));
    }

    #[test]
    fn add_or_get_revives_dead() {
        let cache = DocumentCache::new();
        let dead = dead_entry();
        let key = dead.id();
        cache.set(key, Arc::clone(&dead));

        let (_doc, fresh) = live_entry();
        let returned = cache.add_or_get(
            key,
            |_| unreachable!(),
            |_, current| {
                assert!(Arc::ptr_eq(current, &dead));
                Arc::clone(&fresh)
            },
        );
        assert!(Arc::ptr_eq(&returned, &fresh));
        assert!(Arc::ptr_eq(&cache.get_any(key).unwrap(), &fresh));
    }

    #[test]
    fn remove_is_unconditional() {
        let cache = DocumentCache::new();
        let (_doc, entry) = live_entry();
        let key = entry.id();
        cache.set(key, Arc::clone(&entry));

        let removed = cache.remove(key).unwrap();
        assert!(Arc::ptr_eq(&removed, &entry));
        assert!(cache.remove(key).is_none());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn flush_removes_only_dead() {
        let cache = DocumentCache::new();
        let (_doc, live) = live_entry();
        cache.set(live.id(), Arc::clone(&live));
        for _ in 0..3 {
            let dead = dead_entry();
            cache.set(dead.id(), dead);
        }
        assert_eq!(cache.capacity(), 4);

        let removed = cache.flush(usize::MAX);
        assert_eq!(removed, 3);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.contains(live.id()));
    }

    #[test]
    fn flush_respects_limit() {
        let cache = DocumentCache::new();
        for _ in 0..5 {
            let dead = dead_entry();
            cache.set(dead.id(), dead);
        }

        assert_eq!(cache.flush(2), 2);
        assert_eq!(cache.capacity(), 3);
        assert_eq!(cache.flush(usize::MAX), 3);
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn flush_zero_removes_nothing() {
        let cache = DocumentCache::new();
        let dead = dead_entry();
        cache.set(dead.id(), dead);

        assert_eq!(cache.flush(0), 0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn exact_count_ignores_dead() {
        let cache = DocumentCache::new();
        let (_doc, live) = live_entry();
        cache.set(live.id(), live);
        let dead = dead_entry();
        cache.set(dead.id(), dead);

        assert_eq!(cache.exact_count(), 1);
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn approximate_count_resamples_after_mutation() {
        let cache = DocumentCache::new();
        let (_doc, live) = live_entry();
        cache.set(live.id(), Arc::clone(&live));
        assert_eq!(cache.approximate_count(), 1);

        let (_doc2, other) = live_entry();
        cache.set(other.id(), other);
        // Mutation invalidated the sample.
        assert_eq!(cache.approximate_count(), 2);
    }

    #[test]
    fn approximate_count_resamples_after_reclamation_burst() {
        let cache = DocumentCache::new();
        let (doc, live) = live_entry();
        cache.set(live.id(), live);
        assert_eq!(cache.approximate_count(), 1);

        // Drop the only strong reference, then push the process-wide
        // reclamation generation past the threshold.
        drop(doc);
        for _ in 0..RECOUNT_RECLAIM_THRESHOLD {
            let tracked = Note::new();
            tracked.base().mark_tracked();
            drop(tracked);
        }

        assert_eq!(cache.approximate_count(), 0);
    }

    #[test]
    fn live_entries_snapshot() {
        let cache = DocumentCache::new();
        let (_doc, live) = live_entry();
        cache.set(live.id(), Arc::clone(&live));
        let dead = dead_entry();
        cache.set(dead.id(), dead);

        let snapshot = cache.live_entries();
        assert_eq!(snapshot.len(), 1);
        assert!(Arc::ptr_eq(&snapshot[0], &live));
    }

    #[test]
    fn custom_liveness_predicate() {
        // A predicate that declares everything dead.
        let cache = DocumentCache::with_liveness(Box::new(|_, _| true));
        let (_doc, entry) = live_entry();
        cache.set(entry.id(), Arc::clone(&entry));

        assert!(cache.try_get(entry.id()).is_none());
        assert_eq!(cache.flush(usize::MAX), 1);
    }
}
