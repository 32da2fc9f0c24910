//! State manager: the four per-state stores and their transitions.

use crate::document::{ChangeHook, Document};
use crate::error::{MondocError, MondocResult};
use crate::state::{DocumentCache, DocumentState, StateEntry, StateMask};
use crate::stats::CleanupCounters;
use mondoc_record::DocumentId;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The three dirty stores. Keyed by identity; `BTreeMap` so
/// enumeration follows the identities' chronological order.
#[derive(Default)]
struct DirtyStores {
    added: BTreeMap<DocumentId, Arc<StateEntry>>,
    modified: BTreeMap<DocumentId, Arc<StateEntry>>,
    deleted: BTreeMap<DocumentId, Arc<StateEntry>>,
}

impl DirtyStores {
    fn store_mut(&mut self, state: DocumentState) -> Option<&mut BTreeMap<DocumentId, Arc<StateEntry>>> {
        match state {
            DocumentState::Added => Some(&mut self.added),
            DocumentState::Modified => Some(&mut self.modified),
            DocumentState::Deleted => Some(&mut self.deleted),
            _ => None,
        }
    }

    fn find(&self, id: DocumentId) -> Option<&Arc<StateEntry>> {
        self.added
            .get(&id)
            .or_else(|| self.modified.get(&id))
            .or_else(|| self.deleted.get(&id))
    }
}

/// Tracks every document's lifecycle state and routes property-change
/// events into state transitions.
///
/// The manager maintains four stores: `added`, `modified`, and
/// `deleted` as plain identity-to-entry maps, and `unchanged` as a
/// [`DocumentCache`]. At most one entry exists per identity; an
/// identity moves between exactly the state-specific stores on every
/// transition.
///
/// # Concurrency
///
/// A single reader-writer lock with upgradable-read support protects
/// the dirty stores collectively; the cache embeds its own lock. The
/// nesting order is always manager lock, then cache lock - the cache
/// never calls back into the manager.
pub struct StateManager {
    dirty: RwLock<DirtyStores>,
    unchanged: DocumentCache,
    suppressed: Mutex<HashSet<DocumentId>>,
    partial_cleanup_percent: u32,
    cleanup: CleanupCounters,
}

impl StateManager {
    /// Creates a state manager.
    ///
    /// `partial_cleanup_percent` bounds how much of the cache's
    /// capacity a partial cleanup may remove.
    #[must_use]
    pub fn new(partial_cleanup_percent: u32) -> Arc<Self> {
        Arc::new(Self {
            dirty: RwLock::new(DirtyStores::default()),
            unchanged: DocumentCache::new(),
            suppressed: Mutex::new(HashSet::new()),
            partial_cleanup_percent,
            cleanup: CleanupCounters::new(),
        })
    }

    /// Returns the Unchanged-entry cache.
    #[must_use]
    pub fn unchanged(&self) -> &DocumentCache {
        &self.unchanged
    }

    /// Returns the cleanup counters.
    #[must_use]
    pub fn cleanup_counters(&self) -> &CleanupCounters {
        &self.cleanup
    }

    /// The property-changed handler subscribed to every tracked
    /// document.
    fn change_hook(self: &Arc<Self>) -> ChangeHook {
        let manager = Arc::downgrade(self);
        Arc::new(move |id, property| {
            if let Some(manager) = manager.upgrade() {
                manager.on_controlled_property_changed(id, property);
            }
        })
    }

    fn subscribe(self: &Arc<Self>, document: &Arc<dyn Document>) {
        document.base().install_change_hook(self.change_hook());
        document.base().mark_tracked();
    }

    /// Atomic upsert of a tracking entry for a document.
    ///
    /// Under an upgradable read lock:
    /// - a live entry holding the same instance is returned unchanged;
    /// - a live entry holding a different instance, or a dead
    ///   Unchanged entry, gets a fresh wrapper around the supplied
    ///   document, preserving the entry's state, identity, and
    ///   collection name;
    /// - otherwise a new entry is created in the requested initial
    ///   state.
    ///
    /// The manager's property-changed handler is subscribed to the
    /// document in every case. An entry created with initial state
    /// Detached is returned but not stored.
    pub fn add_or_get_existing(
        self: &Arc<Self>,
        document: Arc<dyn Document>,
        initial: DocumentState,
    ) -> MondocResult<Arc<StateEntry>> {
        let id = document.base().id();
        let dirty = self.dirty.upgradable_read();

        if let Some(entry) = dirty.find(id).map(Arc::clone) {
            if !holds_same_instance(&entry, &document) {
                entry.replace_document(Arc::clone(&document));
            }
            self.subscribe(&document);
            return Ok(entry);
        }

        if initial == DocumentState::Unchanged {
            // The cache resolves absent/live/dead in one step.
            let entry = self.unchanged.add_or_get(
                id,
                |_| {
                    Arc::new(StateEntry::new(
                        Arc::clone(&document),
                        DocumentState::Unchanged,
                    ))
                },
                |_, current| {
                    current.replace_document(Arc::clone(&document));
                    Arc::clone(current)
                },
            );
            if !holds_same_instance(&entry, &document) {
                entry.replace_document(Arc::clone(&document));
            }
            self.subscribe(&document);
            return Ok(entry);
        }

        if let Some(entry) = self.unchanged.get_any(id) {
            if !holds_same_instance(&entry, &document) {
                entry.replace_document(Arc::clone(&document));
                self.unchanged.set(id, Arc::clone(&entry));
            }
            self.subscribe(&document);
            return Ok(entry);
        }

        let entry = Arc::new(StateEntry::new(Arc::clone(&document), initial));
        if initial.is_dirty() {
            let mut dirty = RwLockUpgradableReadGuard::upgrade(dirty);
            if let Some(store) = dirty.store_mut(initial) {
                store.insert(id, Arc::clone(&entry));
            }
        }
        // Detached entries are never stored.
        self.subscribe(&document);
        Ok(entry)
    }

    /// Moves an entry between state stores.
    ///
    /// Under the write lock: removes the entry from its source store,
    /// applies [`StateEntry::change_state`], and inserts it into the
    /// destination store. Transitioning to the current state is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the entry's document has been
    /// reclaimed or the entry is Detached.
    pub fn change_document_state(
        &self,
        entry: &Arc<StateEntry>,
        target: DocumentState,
    ) -> MondocResult<()> {
        let mut dirty = self.dirty.write();
        let source = entry.state();
        if source == target {
            return Ok(());
        }

        if !entry.change_state(target)? {
            return Err(MondocError::invalid_state(format!(
                "document {} has been reclaimed",
                entry.id()
            )));
        }

        let id = entry.id();
        match source {
            DocumentState::Unchanged => {
                self.unchanged.remove(id);
            }
            DocumentState::Detached => {}
            dirty_state => {
                if let Some(store) = dirty.store_mut(dirty_state) {
                    store.remove(&id);
                }
            }
        }
        match target {
            DocumentState::Unchanged => {
                self.unchanged.set(id, Arc::clone(entry));
            }
            DocumentState::Detached => {}
            dirty_state => {
                if let Some(store) = dirty.store_mut(dirty_state) {
                    store.insert(id, Arc::clone(entry));
                }
            }
        }
        Ok(())
    }

    /// Toggles whether property-change events mutate state for an
    /// identity. Used during deserialization to silence hydration
    /// writes.
    pub fn set_property_tracking(&self, id: DocumentId, enabled: bool) {
        let mut suppressed = self.suppressed.lock();
        if enabled {
            suppressed.remove(&id);
        } else {
            suppressed.insert(id);
        }
    }

    /// Returns true if property-change tracking is suppressed for an
    /// identity.
    #[must_use]
    pub fn is_property_tracking_suppressed(&self, id: DocumentId) -> bool {
        self.suppressed.lock().contains(&id)
    }

    /// Routes a controlled-property change into a state transition.
    ///
    /// Ignored while tracking is suppressed for the identity and for
    /// untracked identities. An Unchanged entry transitions to
    /// Modified; Added and Deleted entries are left as they are.
    pub fn on_controlled_property_changed(&self, id: DocumentId, property: &str) {
        if self.is_property_tracking_suppressed(id) {
            return;
        }
        let Some(entry) = self.find(id) else {
            return;
        };
        match entry.state() {
            DocumentState::Unchanged => {
                entry.note_property_changed(property);
                if let Err(error) = self.change_document_state(&entry, DocumentState::Modified) {
                    tracing::debug!(%id, property, %error, "property change lost");
                }
            }
            DocumentState::Modified => entry.note_property_changed(property),
            _ => {}
        }
    }

    /// Finds the entry for an identity.
    ///
    /// Consults the stores in the order Added, Unchanged, Modified,
    /// Deleted; at most one store holds the key. Dead Unchanged
    /// entries are invisible here.
    #[must_use]
    pub fn find(&self, id: DocumentId) -> Option<Arc<StateEntry>> {
        let dirty = self.dirty.read();
        if let Some(entry) = dirty.added.get(&id) {
            return Some(Arc::clone(entry));
        }
        if let Some(entry) = self.unchanged.try_get(id) {
            return Some(entry);
        }
        if let Some(entry) = dirty.modified.get(&id) {
            return Some(Arc::clone(entry));
        }
        dirty.deleted.get(&id).map(Arc::clone)
    }

    /// Returns a snapshot of the entries in the states selected by the
    /// mask. Dead Unchanged entries are skipped.
    #[must_use]
    pub fn entries(&self, mask: StateMask) -> Vec<Arc<StateEntry>> {
        let mut result = Vec::new();
        {
            let dirty = self.dirty.read();
            if mask.contains(DocumentState::Added) {
                result.extend(dirty.added.values().cloned());
            }
            if mask.contains(DocumentState::Modified) {
                result.extend(dirty.modified.values().cloned());
            }
            if mask.contains(DocumentState::Deleted) {
                result.extend(dirty.deleted.values().cloned());
            }
        }
        if mask.contains(DocumentState::Unchanged) {
            result.extend(self.unchanged.live_entries());
        }
        result
    }

    /// Returns the number of entries in the states selected by the
    /// mask. The Unchanged term uses the cache's approximate count.
    #[must_use]
    pub fn count(&self, mask: StateMask) -> usize {
        let mut total = 0;
        {
            let dirty = self.dirty.read();
            if mask.contains(DocumentState::Added) {
                total += dirty.added.len();
            }
            if mask.contains(DocumentState::Modified) {
                total += dirty.modified.len();
            }
            if mask.contains(DocumentState::Deleted) {
                total += dirty.deleted.len();
            }
        }
        if mask.contains(DocumentState::Unchanged) {
            total += self.unchanged.approximate_count();
        }
        total
    }

    /// Flushes dead entries from the cache.
    ///
    /// A full cleanup removes every dead entry; a partial cleanup
    /// removes at most the configured share of the cache's capacity.
    /// Updates the cleanup counters. Returns the number of entries
    /// reclaimed.
    pub fn clean_up(&self, full: bool) -> usize {
        let max_to_remove = if full {
            usize::MAX
        } else {
            self.unchanged.capacity() * self.partial_cleanup_percent as usize / 100
        };
        let started = Instant::now();
        let removed = self.unchanged.flush(max_to_remove);
        self.cleanup.record(full, removed, started.elapsed());
        removed
    }
}

fn holds_same_instance(entry: &StateEntry, document: &Arc<dyn Document>) -> bool {
    entry
        .document()
        .is_some_and(|held| Arc::ptr_eq(&held, document))
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirty = self.dirty.read();
        f.debug_struct("StateManager")
            .field("added", &dirty.added.len())
            .field("modified", &dirty.modified.len())
            .field("deleted", &dirty.deleted.len())
            .field("unchanged_capacity", &self.unchanged.capacity())
            .finish_non_exhaustive()
    }
}
