//! Repository context: the top-level facade.

use crate::config::Config;
use crate::document::{Document, DocumentType};
use crate::error::{MondocError, MondocResult};
use crate::handles::DocumentEntry;
use crate::serializer::{DocumentSerializer, SerializerRegistry};
use crate::set::DocumentSet;
use crate::state::{CacheCleaner, DocumentState, StateEntry, StateManager, StateMask};
use crate::stats::ContextStats;
use mondoc_record::DocumentId;
use mondoc_store::{DocumentStore, ReplaceOne};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Maximum number of entries issued in one bulk command.
pub const MAX_SLICE_LEN: usize = 1000;

/// The top-level session over a document store.
///
/// A context owns one [`StateManager`], one [`CacheCleaner`], the
/// serializer registry, and the store handle. User code obtains typed
/// [`DocumentSet`]s from the context, mutates ordinary in-memory
/// documents, and flushes all accumulated mutations with
/// [`save_changes`](Self::save_changes).
///
/// Saves and finds may be issued concurrently from multiple callers;
/// the context does not serialize them. The state manager's own lock
/// protects its internal consistency.
///
/// # Example
///
/// ```rust,ignore
/// let store = Arc::new(InMemoryStore::new());
/// let context = DocumentContext::new(store)?;
/// let users = context.set::<User>();
///
/// let user = User::create(DocumentId::generate());
/// users.add(&user)?;
/// context.save_changes()?;
/// ```
pub struct DocumentContext {
    store: Arc<dyn DocumentStore>,
    state: Arc<StateManager>,
    serializers: SerializerRegistry,
    cleaner: CacheCleaner,
    active_pushes: Arc<Mutex<HashSet<&'static str>>>,
    config: Config,
}

impl DocumentContext {
    /// Creates a context with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the configuration is invalid.
    pub fn new(store: Arc<dyn DocumentStore>) -> MondocResult<Self> {
        Self::with_config(store, Config::default())
    }

    /// Creates a context with a custom configuration.
    ///
    /// The configuration is validated and the cache cleaner is
    /// started.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the configuration is invalid.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: Config) -> MondocResult<Self> {
        config.validate()?;
        let state = StateManager::new(config.partial_cleanup_percent);
        let cleaner = CacheCleaner::spawn(
            Arc::clone(&state),
            config.cleanup_lower_bound,
            config.cleanup_upper_bound,
        );
        Ok(Self {
            store,
            state,
            serializers: SerializerRegistry::new(),
            cleaner,
            active_pushes: Arc::new(Mutex::new(HashSet::new())),
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Returns the state manager.
    #[must_use]
    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Returns the serializer registry.
    #[must_use]
    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Returns the cache cleaner.
    #[must_use]
    pub fn cleaner(&self) -> &CacheCleaner {
        &self.cleaner
    }

    /// Returns the typed document set for a document type, registering
    /// its standard serializer.
    #[must_use]
    pub fn set<T: DocumentType>(&self) -> DocumentSet<'_, T> {
        self.serializers.register::<T>();
        DocumentSet::new(self)
    }

    /// Begins tracking a document in the given initial state.
    ///
    /// An existing entry for the same identity is reused and
    /// transitioned to the requested state. Tracking as Modified
    /// records every declared controlled property as modified.
    ///
    /// # Errors
    ///
    /// Returns an argument error for initial state Detached, and an
    /// invalid-state error if an existing entry cannot transition.
    pub fn track_object(
        &self,
        document: Arc<dyn Document>,
        state: DocumentState,
    ) -> MondocResult<DocumentEntry<'_>> {
        if state == DocumentState::Detached {
            return Err(MondocError::argument(
                "cannot track a document as detached",
            ));
        }
        let layout = document.base().layout();
        let entry = self.state.add_or_get_existing(document, state)?;
        if entry.state() != state {
            self.state.change_document_state(&entry, state)?;
        }
        if entry.state() == DocumentState::Modified && entry.modified_properties().is_empty() {
            for spec in layout {
                entry.note_property_changed(spec.name);
            }
        }
        Ok(DocumentEntry::new(self, entry))
    }

    /// Returns a handle over the entry tracking an identity, if any.
    #[must_use]
    pub fn entry(&self, id: DocumentId) -> Option<DocumentEntry<'_>> {
        self.state.find(id).map(|entry| DocumentEntry::new(self, entry))
    }

    /// Persists all accumulated mutations.
    ///
    /// Entries are processed in the order all Adds, then all Modifies,
    /// then all Deletes; within a state they are grouped by document
    /// kind and issued as bulk commands of at most [`MAX_SLICE_LEN`]
    /// entries. Per-document write errors never abort the batch: the
    /// failed entries stay in their pre-commit state while the rest
    /// commit. Returns the total committed count.
    ///
    /// # Errors
    ///
    /// Returns a serializer-missing error for unregistered document
    /// types and propagates store-level command failures.
    pub fn save_changes(&self) -> MondocResult<usize> {
        let mut committed = 0;
        for state in [
            DocumentState::Added,
            DocumentState::Modified,
            DocumentState::Deleted,
        ] {
            let entries = self.state.entries(StateMask::single(state));
            if entries.is_empty() {
                continue;
            }
            let mut groups: HashMap<&'static str, Vec<Arc<StateEntry>>> = HashMap::new();
            for entry in entries {
                groups.entry(entry.collection_name()).or_default().push(entry);
            }
            for (collection, group) in groups {
                let serializer = self.serializers.get(collection)?;
                for slice in group.chunks(MAX_SLICE_LEN) {
                    committed += self.commit_slice(collection, serializer.as_ref(), state, slice)?;
                }
            }
        }
        Ok(committed)
    }

    /// Persists exactly one entry, applying the same rules as
    /// [`save_changes`](Self::save_changes).
    ///
    /// Returns 1 if the entry committed, 0 if it was clean or its
    /// write was rejected.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for a Detached entry and
    /// propagates store-level command failures.
    pub fn save_entry(&self, entry: &Arc<StateEntry>) -> MondocResult<usize> {
        let state = entry.state();
        match state {
            DocumentState::Added | DocumentState::Modified | DocumentState::Deleted => {
                let collection = entry.collection_name();
                let serializer = self.serializers.get(collection)?;
                self.commit_slice(
                    collection,
                    serializer.as_ref(),
                    state,
                    std::slice::from_ref(entry),
                )
            }
            DocumentState::Unchanged => Ok(0),
            DocumentState::Detached => Err(MondocError::invalid_state(format!(
                "entry {} is detached",
                entry.id()
            ))),
        }
    }

    /// Issues one bulk command for a slice and transitions the
    /// surviving entries.
    fn commit_slice(
        &self,
        collection: &str,
        serializer: &dyn DocumentSerializer,
        state: DocumentState,
        slice: &[Arc<StateEntry>],
    ) -> MondocResult<usize> {
        let response = match state {
            DocumentState::Added => {
                let mut documents = Vec::with_capacity(slice.len());
                for entry in slice {
                    documents.push(serializer.serialize(self.entry_document(entry)?.as_ref())?);
                }
                self.store.insert_many(collection, &documents)
            }
            DocumentState::Modified => {
                let mut updates = Vec::with_capacity(slice.len());
                for entry in slice {
                    let document = serializer.serialize(self.entry_document(entry)?.as_ref())?;
                    updates.push(ReplaceOne::new(entry.id(), document));
                }
                self.store.update_many(collection, &updates)
            }
            DocumentState::Deleted => {
                let ids: Vec<DocumentId> = slice.iter().map(|entry| entry.id()).collect();
                self.store.delete_many(collection, &ids)
            }
            _ => return Ok(0),
        };
        let response = response.map_err(|error| {
            tracing::warn!(collection, %state, %error, "bulk command failed");
            MondocError::from(error)
        })?;

        let failed = response.failed_indices();
        if !failed.is_empty() {
            tracing::warn!(
                collection,
                %state,
                failed = failed.len(),
                "bulk command reported per-document write errors"
            );
        }

        let target = if state == DocumentState::Deleted {
            DocumentState::Detached
        } else {
            DocumentState::Unchanged
        };
        let mut committed = 0;
        for (index, entry) in slice.iter().enumerate() {
            if failed.contains(&index) {
                continue;
            }
            self.state.change_document_state(entry, target)?;
            committed += 1;
        }
        tracing::debug!(collection, %state, slice = slice.len(), committed, "slice committed");
        Ok(committed)
    }

    fn entry_document(&self, entry: &Arc<StateEntry>) -> MondocResult<Arc<dyn Document>> {
        entry.document().ok_or_else(|| {
            MondocError::invalid_state(format!("document {} has been reclaimed", entry.id()))
        })
    }

    /// Re-reads an entry's document from the store, overwriting
    /// scalar and complex values in place on the pre-existing instance
    /// and resetting the entry to Unchanged.
    ///
    /// Reload is last-writer-wins from the store's perspective: any
    /// concurrent property edits made while the reload is in flight
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns a document-not-found error if the store no longer holds
    /// the identity, and an invalid-state error for a Detached entry.
    pub fn reload(&self, entry: &Arc<StateEntry>) -> MondocResult<()> {
        if entry.state() == DocumentState::Detached {
            return Err(MondocError::invalid_state(format!(
                "entry {} is detached",
                entry.id()
            )));
        }
        let collection = entry.collection_name();
        let record = self
            .store
            .reload(collection, entry.id())
            .map_err(|error| {
                tracing::warn!(collection, %error, "reload command failed");
                MondocError::from(error)
            })?
            .ok_or_else(|| MondocError::document_not_found(collection, entry.id()))?;
        let serializer = self.serializers.get(collection)?;
        serializer.deserialize(&record, &self.state)?;
        Ok(())
    }

    /// Fetches one document by identity through the identity-preserving
    /// path.
    pub(crate) fn fetch_tracked(
        &self,
        collection: &str,
        id: DocumentId,
    ) -> MondocResult<Option<Arc<dyn Document>>> {
        let Some(record) = self.store.find_one(collection, id)? else {
            return Ok(None);
        };
        let serializer = self.serializers.get(collection)?;
        Ok(Some(serializer.deserialize(&record, &self.state)?))
    }

    /// Registers an active push-based find for a collection.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if one is already active for the
    /// collection.
    pub(crate) fn begin_push(&self, collection: &'static str) -> MondocResult<PushGuard> {
        let mut active = self.active_pushes.lock();
        if !active.insert(collection) {
            return Err(MondocError::invalid_state(format!(
                "a push-based find is already active for collection {collection}"
            )));
        }
        Ok(PushGuard {
            active: Arc::clone(&self.active_pushes),
            collection,
        })
    }

    /// Produces a snapshot of context statistics: per-state entry
    /// counts, cache live count versus total capacity, and cleanup
    /// totals and timings.
    #[must_use]
    pub fn statistics(&self) -> ContextStats {
        let cache = self.state.unchanged();
        let counters = self.state.cleanup_counters();
        ContextStats {
            added: self.state.count(StateMask::ADDED),
            modified: self.state.count(StateMask::MODIFIED),
            deleted: self.state.count(StateMask::DELETED),
            unchanged_live: cache.approximate_count(),
            cache_capacity: cache.capacity(),
            full_cleanups: counters.full_cleanups(),
            partial_cleanups: counters.partial_cleanups(),
            reclaimed_total: counters.reclaimed_total(),
            cleanup_time_total: counters.cleanup_time_total(),
            last_cleanup_age: counters.last_cleanup_age(),
        }
    }
}

impl fmt::Debug for DocumentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentContext")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Clears the active-push registration for a collection on drop.
pub(crate) struct PushGuard {
    active: Arc<Mutex<HashSet<&'static str>>>,
    collection: &'static str,
}

impl Drop for PushGuard {
    fn drop(&mut self) {
        self.active.lock().remove(self.collection);
    }
}
