//! Per-document state entry.

use crate::document::Document;
use crate::error::{MondocError, MondocResult};
use crate::state::{DocumentState, DocumentWrapper};
use mondoc_record::DocumentId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Per-identity tracking record.
///
/// One entry exists per tracked identity within a state manager. The
/// entry owns the document wrapper, the current state, and - while the
/// state is Modified - the set of property names whose values differ
/// from the persisted image.
///
/// The identity, collection name, and document type stay readable in
/// any state, including after the weakly held document has been
/// reclaimed.
pub struct StateEntry {
    id: DocumentId,
    collection: &'static str,
    state: RwLock<DocumentState>,
    wrapper: RwLock<DocumentWrapper>,
    modified: Mutex<HashSet<String>>,
}

impl StateEntry {
    /// Creates an entry for a document in the given initial state.
    ///
    /// The wrapper variant is chosen by the state: strong for dirty
    /// states, weak for Unchanged and Detached.
    #[must_use]
    pub fn new(document: Arc<dyn Document>, state: DocumentState) -> Self {
        let id = document.base().id();
        let collection = document.base().collection_name();
        Self {
            id,
            collection,
            state: RwLock::new(state),
            wrapper: RwLock::new(DocumentWrapper::for_state(
                Some(document),
                id,
                collection,
                state,
            )),
            modified: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the tracked identity.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Returns the logical collection name, which equals the document
    /// type's name.
    #[must_use]
    pub fn collection_name(&self) -> &'static str {
        self.collection
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> DocumentState {
        *self.state.read()
    }

    /// Returns the tracked document, if it is still reachable.
    #[must_use]
    pub fn document(&self) -> Option<Arc<dyn Document>> {
        self.wrapper.read().document()
    }

    /// Returns true if the weakly held document has been reclaimed.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        !self.wrapper.read().is_alive()
    }

    /// Returns true if the entry's wrapper is the strong variant.
    #[must_use]
    pub fn has_strong_wrapper(&self) -> bool {
        self.wrapper.read().is_strong()
    }

    /// Transitions the entry to the target state, installing the
    /// wrapper variant the target state requires.
    ///
    /// Transitioning to the current state is a no-op. The
    /// modified-property set is cleared on transition to Unchanged.
    /// Returns false - leaving the state unchanged - if the document
    /// has already been reclaimed.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the entry is Detached.
    pub fn change_state(&self, target: DocumentState) -> MondocResult<bool> {
        let mut state = self.state.write();
        if *state == DocumentState::Detached {
            return Err(MondocError::invalid_state(format!(
                "entry {} is detached",
                self.id
            )));
        }
        if *state == target {
            return Ok(true);
        }

        let mut wrapper = self.wrapper.write();
        let Some(document) = wrapper.document() else {
            return Ok(false);
        };
        *wrapper = DocumentWrapper::for_state(Some(document), self.id, self.collection, target);
        *state = target;
        drop(wrapper);
        drop(state);

        if target == DocumentState::Unchanged {
            self.modified.lock().clear();
        }
        Ok(true)
    }

    /// Swaps in a fresh wrapper around the supplied document,
    /// preserving the entry's state, identity, and collection name.
    ///
    /// Used when the same identity is tracked again with a different
    /// in-memory instance, or to revive a dead Unchanged entry.
    pub(crate) fn replace_document(&self, document: Arc<dyn Document>) {
        let state = *self.state.read();
        let mut wrapper = self.wrapper.write();
        *wrapper = DocumentWrapper::for_state(Some(document), self.id, self.collection, state);
    }

    /// Records a modified property.
    pub fn note_property_changed(&self, name: &str) {
        self.modified.lock().insert(name.to_string());
    }

    /// Returns true if the named property has been recorded as
    /// modified.
    #[must_use]
    pub fn is_property_changed(&self, name: &str) -> bool {
        self.modified.lock().contains(name)
    }

    /// Returns the recorded modified properties.
    #[must_use]
    pub fn modified_properties(&self) -> Vec<String> {
        self.modified.lock().iter().cloned().collect()
    }
}

impl fmt::Debug for StateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEntry")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("state", &self.state())
            .field("dead", &self.is_dead())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBase, PropertySpec};
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

    #[test]
    fn new_entry_metadata() {
        let note = Note::new();
        let entry = StateEntry::new(note.clone(), DocumentState::Added);

        assert_eq!(entry.id(), note.base().id());
        assert_eq!(entry.collection_name(), "notes");
        assert_eq!(entry.state(), DocumentState::Added);
        assert!(entry.has_strong_wrapper());
        assert!(!entry.is_dead());
    }

    #[test]
    fn transition_installs_wrapper_variant() {
        let note = Note::new();
        let entry = StateEntry::new(note.clone(), DocumentState::Added);

        assert!(entry.change_state(DocumentState::Unchanged).unwrap());
        assert_eq!(entry.state(), DocumentState::Unchanged);
        assert!(!entry.has_strong_wrapper());

        assert!(entry.change_state(DocumentState::Modified).unwrap());
        assert!(entry.has_strong_wrapper());
    }

    #[test]
    fn transition_to_same_state_is_noop() {
        let note = Note::new();
        let entry = StateEntry::new(note, DocumentState::Modified);
        entry.note_property_changed("name");

        assert!(entry.change_state(DocumentState::Modified).unwrap());
        assert_eq!(entry.state(), DocumentState::Modified);
        // Modified-property set untouched by the no-op.
        assert!(entry.is_property_changed("name"));
    }

    #[test]
    fn transition_to_unchanged_clears_modified_set() {
        let note = Note::new();
        let entry = StateEntry::new(note, DocumentState::Modified);
        entry.note_property_changed("name");
        assert!(entry.is_property_changed("name"));

        assert!(entry.change_state(DocumentState::Unchanged).unwrap());
        assert!(!entry.is_property_changed("name"));
        assert!(entry.modified_properties().is_empty());
    }

    #[test]
    fn dead_entry_refuses_transition() {
        let note = Note::new();
        let entry = StateEntry::new(note, DocumentState::Unchanged);
        // Only weak references remain; the document is reclaimed.
        assert!(entry.is_dead());

        let changed = entry.change_state(DocumentState::Modified).unwrap();
        assert!(!changed);
        assert_eq!(entry.state(), DocumentState::Unchanged);
    }

    #[test]
    fn detached_entry_rejects_operations() {
        let note = Note::new();
        let entry = StateEntry::new(note, DocumentState::Deleted);
        assert!(entry.change_state(DocumentState::Detached).unwrap());

        let result = entry.change_state(DocumentState::Added);
        assert!(matches!(result, Err(MondocError::InvalidState { .. })));
    }

    #[test]
    fn metadata_survives_reclamation() {
        let note = Note::new();
        let id = note.base().id();
        let entry = StateEntry::new(note, DocumentState::Unchanged);

        assert!(entry.document().is_none());
        assert_eq!(entry.id(), id);
        assert_eq!(entry.collection_name(), "notes");
    }

    #[test]
    fn replace_document_revives_dead_entry() {
        let note = Note::new();
        let id = note.base().id();
        let entry = StateEntry::new(note, DocumentState::Unchanged);
        assert!(entry.is_dead());

        let replacement = Note::new();
        replacement.base().set_id(id);
        entry.replace_document(replacement.clone());

        assert!(!entry.is_dead());
        assert_eq!(entry.state(), DocumentState::Unchanged);
        assert!(!entry.has_strong_wrapper());
        let revived = entry.document().unwrap();
        let replacement: Arc<dyn Document> = replacement;
        assert!(Arc::ptr_eq(&revived, &replacement));
    }

    #[test]
    fn modified_property_queries() {
        let note = Note::new();
        let entry = StateEntry::new(note, DocumentState::Modified);

        assert!(!entry.is_property_changed("name"));
        entry.note_property_changed("name");
        entry.note_property_changed("name");
        assert!(entry.is_property_changed("name"));
        assert_eq!(entry.modified_properties(), vec!["name".to_string()]);
    }
}
