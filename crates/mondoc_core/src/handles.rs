//! User-facing views over a state entry.

use crate::context::DocumentContext;
use crate::document::{Document, PropertyKind, PropertySpec, RefIds, TrackedList};
use crate::error::{MondocError, MondocResult};
use crate::state::{DocumentState, StateEntry};
use mondoc_record::{DocumentId, Value};
use std::fmt;
use std::sync::Arc;

/// A handle over one tracked entry, manufactured by the context.
///
/// The handle is a borrowed view: it does not keep the document alive.
/// Navigation and property views are obtained per declared property.
pub struct DocumentEntry<'a> {
    context: &'a DocumentContext,
    entry: Arc<StateEntry>,
}

impl<'a> DocumentEntry<'a> {
    pub(crate) fn new(context: &'a DocumentContext, entry: Arc<StateEntry>) -> Self {
        Self { context, entry }
    }

    /// Returns the underlying state entry.
    #[must_use]
    pub fn entry(&self) -> &Arc<StateEntry> {
        &self.entry
    }

    /// Returns the entry's current state.
    #[must_use]
    pub fn state(&self) -> DocumentState {
        self.entry.state()
    }

    /// Returns the tracked identity.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.entry.id()
    }

    /// Returns the tracked document, if it is still reachable.
    #[must_use]
    pub fn document(&self) -> Option<Arc<dyn Document>> {
        self.entry.document()
    }

    fn spec(&self, name: &str) -> MondocResult<&'static PropertySpec> {
        let document = self.entry.document().ok_or_else(|| {
            MondocError::invalid_state(format!("document {} has been reclaimed", self.entry.id()))
        })?;
        document.base().property(name).ok_or_else(|| {
            MondocError::argument(format!(
                "property {name} is not declared on {}",
                self.entry.collection_name()
            ))
        })
    }

    /// Returns the view over a declared single-reference property.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the property is not a single
    /// reference.
    pub fn reference(&self, name: &str) -> MondocResult<ReferenceEntry<'a>> {
        let spec = self.spec(name)?;
        let PropertyKind::Reference { target } = spec.kind else {
            return Err(MondocError::argument(format!(
                "property {name} is not a single reference"
            )));
        };
        Ok(ReferenceEntry {
            context: self.context,
            entry: Arc::clone(&self.entry),
            spec,
            target,
        })
    }

    /// Returns the view over a declared collection-reference property.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the property is not a collection
    /// reference.
    pub fn collection(&self, name: &str) -> MondocResult<CollectionEntry<'a>> {
        let spec = self.spec(name)?;
        let PropertyKind::ReferenceCollection { target } = spec.kind else {
            return Err(MondocError::argument(format!(
                "property {name} is not a collection reference"
            )));
        };
        Ok(CollectionEntry {
            context: self.context,
            entry: Arc::clone(&self.entry),
            spec,
            target,
        })
    }

    /// Returns the view over a declared scalar or complex property.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the property is a navigation
    /// property.
    pub fn property(&self, name: &str) -> MondocResult<PropertyEntry> {
        let spec = self.spec(name)?;
        if !spec.is_value() {
            return Err(MondocError::argument(format!(
                "property {name} is not a value property"
            )));
        }
        Ok(PropertyEntry {
            entry: Arc::clone(&self.entry),
            spec,
        })
    }
}

impl fmt::Debug for DocumentEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentEntry")
            .field("id", &self.entry.id())
            .field("state", &self.state())
            .finish()
    }
}

/// View over a single-reference navigation property.
pub struct ReferenceEntry<'a> {
    context: &'a DocumentContext,
    entry: Arc<StateEntry>,
    spec: &'static PropertySpec,
    target: &'static str,
}

impl ReferenceEntry<'_> {
    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Returns the currently assigned referent.
    #[must_use]
    pub fn current_value(&self) -> Option<Arc<dyn Document>> {
        self.entry
            .document()
            .and_then(|document| document.base().reference(self.spec.name))
    }

    /// Returns the identity stored in the navigable map, if any.
    #[must_use]
    pub fn stored_id(&self) -> Option<DocumentId> {
        self.entry
            .document()
            .and_then(|document| match document.base().reference_ids(self.spec.name) {
                Some(RefIds::One(id)) => Some(id),
                _ => None,
            })
    }

    /// Returns true if the reference needs no load: the current value
    /// is assigned or the stored identity is empty.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        if self.current_value().is_some() {
            return true;
        }
        self.stored_id().map_or(true, |id| id.is_empty())
    }

    /// Resolves the stored identity into the tracked referent and
    /// assigns it. A loaded reference is left as it is.
    ///
    /// The referent is fetched through the identity-preserving path,
    /// so an already-tracked instance is reused. The assignment is a
    /// hydration write: it does not dirty the owning entry.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the owning document has been
    /// reclaimed.
    pub fn load(&self) -> MondocResult<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let document = self.entry.document().ok_or_else(|| {
            MondocError::invalid_state(format!(
                "document {} has been reclaimed",
                self.entry.id()
            ))
        })?;
        let Some(id) = self.stored_id() else {
            return Ok(());
        };
        let Some(referent) = self.context.fetch_tracked(self.target, id)? else {
            // Dangling reference: leave the slot null.
            return Ok(());
        };

        let owner = self.entry.id();
        self.context.state().set_property_tracking(owner, false);
        let assigned = document.base().set_reference(self.spec.name, Some(referent));
        self.context.state().set_property_tracking(owner, true);
        assigned
    }
}

impl fmt::Debug for ReferenceEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceEntry")
            .field("property", &self.spec.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// View over a collection-reference navigation property.
///
/// Exposes the set contract over the loaded change-notifying list;
/// set operations require a prior [`load`](Self::load) (or an
/// assignment made by user code).
pub struct CollectionEntry<'a> {
    context: &'a DocumentContext,
    entry: Arc<StateEntry>,
    spec: &'static PropertySpec,
    target: &'static str,
}

impl CollectionEntry<'_> {
    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Returns the currently assigned list.
    #[must_use]
    pub fn current_value(&self) -> Option<TrackedList> {
        self.entry
            .document()
            .and_then(|document| document.base().reference_list(self.spec.name))
    }

    /// Returns the identity sequence stored in the navigable map, if
    /// any.
    #[must_use]
    pub fn stored_ids(&self) -> Option<Vec<DocumentId>> {
        self.entry
            .document()
            .and_then(|document| match document.base().reference_ids(self.spec.name) {
                Some(RefIds::Many(ids)) => Some(ids),
                _ => None,
            })
    }

    /// Returns true if the collection needs no load: the current value
    /// is assigned or no identity sequence exists.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.current_value().is_some() || self.stored_ids().is_none()
    }

    /// Fetches the stored identity sequence in one batched query,
    /// wraps the referents in a change-notifying list, and assigns it.
    /// A loaded collection is left as it is.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the owning document has been
    /// reclaimed.
    pub fn load(&self) -> MondocResult<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let document = self.entry.document().ok_or_else(|| {
            MondocError::invalid_state(format!(
                "document {} has been reclaimed",
                self.entry.id()
            ))
        })?;
        let Some(ids) = self.stored_ids() else {
            return Ok(());
        };

        let records = self.context.store().find_many(self.target, &ids)?;
        let serializer = self.context.serializers().get(self.target)?;
        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            items.push(serializer.deserialize(record, self.context.state())?);
        }

        let owner = self.entry.id();
        let list = TrackedList::with_items(owner, self.spec.name, items);
        list.install_hook(document.base().change_hook());

        self.context.state().set_property_tracking(owner, false);
        let assigned = document.base().set_reference_list(self.spec.name, list);
        self.context.state().set_property_tracking(owner, true);
        assigned
    }

    fn loaded_list(&self) -> MondocResult<TrackedList> {
        self.current_value().ok_or_else(|| {
            MondocError::invalid_state(format!(
                "collection {} is not loaded",
                self.spec.name
            ))
        })
    }

    /// Adds a referent to the loaded list, dirtying the owning entry.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the collection is not loaded.
    pub fn add(&self, document: Arc<dyn Document>) -> MondocResult<()> {
        self.loaded_list()?.add(document);
        Ok(())
    }

    /// Removes a referent from the loaded list, dirtying the owning
    /// entry. Returns true if a referent was removed.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the collection is not loaded.
    pub fn remove(&self, id: DocumentId) -> MondocResult<bool> {
        Ok(self.loaded_list()?.remove(id))
    }

    /// Returns the number of referents in the loaded list.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the collection is not loaded.
    pub fn len(&self) -> MondocResult<usize> {
        Ok(self.loaded_list()?.len())
    }

    /// Returns true if the loaded list is empty.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the collection is not loaded.
    pub fn is_empty(&self) -> MondocResult<bool> {
        Ok(self.loaded_list()?.is_empty())
    }

    /// Returns true if a referent with the identity is in the loaded
    /// list.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the collection is not loaded.
    pub fn contains(&self, id: DocumentId) -> MondocResult<bool> {
        Ok(self.loaded_list()?.contains(id))
    }

    /// Returns the referents of the loaded list in order.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the collection is not loaded.
    pub fn items(&self) -> MondocResult<Vec<Arc<dyn Document>>> {
        Ok(self.loaded_list()?.items())
    }
}

impl fmt::Debug for CollectionEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionEntry")
            .field("property", &self.spec.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// View over one scalar or complex property.
pub struct PropertyEntry {
    entry: Arc<StateEntry>,
    spec: &'static PropertySpec,
}

impl PropertyEntry {
    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Returns the property's current value.
    #[must_use]
    pub fn current_value(&self) -> Option<Value> {
        self.entry
            .document()
            .and_then(|document| document.base().value(self.spec.name))
    }

    /// Writes the property through the controlled setter, dirtying the
    /// owning entry.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the owning document has been
    /// reclaimed.
    pub fn set_value(&self, value: Value) -> MondocResult<()> {
        let document = self.entry.document().ok_or_else(|| {
            MondocError::invalid_state(format!(
                "document {} has been reclaimed",
                self.entry.id()
            ))
        })?;
        document.base().set_value(self.spec.name, value)
    }
}

impl fmt::Debug for PropertyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEntry")
            .field("property", &self.spec.name)
            .finish()
    }
}
