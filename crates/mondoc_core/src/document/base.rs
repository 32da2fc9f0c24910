//! The base record embedded in every document type.

use crate::document::{Document, PropertyKind, PropertySpec};
use crate::error::{MondocError, MondocResult};
use mondoc_record::{DocumentId, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Change-notification callback installed by the state manager.
///
/// Invoked with the document's identity and the written property name
/// whenever a controlled setter runs. A direct callback slot, not a
/// virtual dispatch per setter.
pub type ChangeHook = Arc<dyn Fn(DocumentId, &str) + Send + Sync>;

/// An unresolved reference payload in the navigable map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefIds {
    /// A single-reference identity.
    One(DocumentId),
    /// An ordered collection-reference identity sequence.
    Many(Vec<DocumentId>),
}

/// A resolved navigation value.
enum Resolved {
    One(Arc<dyn Document>),
    Many(TrackedList),
}

/// The base record every tracked document embeds.
///
/// Holds the identity, the static collection name and property layout,
/// the controlled value bag, the navigable map of unresolved reference
/// payloads, the resolved navigation slots, and the change-notification
/// slot. All mutation goes through controlled setters that validate
/// against the layout and notify the installed hook.
pub struct DocumentBase {
    id: RwLock<DocumentId>,
    collection: &'static str,
    layout: &'static [PropertySpec],
    values: RwLock<BTreeMap<&'static str, Value>>,
    ref_ids: RwLock<BTreeMap<&'static str, RefIds>>,
    resolved: RwLock<BTreeMap<&'static str, Resolved>>,
    hook: RwLock<Option<ChangeHook>>,
    tracked: AtomicBool,
}

impl DocumentBase {
    /// Creates a base record with a freshly generated identity.
    #[must_use]
    pub fn new(collection: &'static str, layout: &'static [PropertySpec]) -> Self {
        Self::with_id(DocumentId::generate(), collection, layout)
    }

    /// Creates a base record with the given identity.
    #[must_use]
    pub fn with_id(
        id: DocumentId,
        collection: &'static str,
        layout: &'static [PropertySpec],
    ) -> Self {
        Self {
            id: RwLock::new(id),
            collection,
            layout,
            values: RwLock::new(BTreeMap::new()),
            ref_ids: RwLock::new(BTreeMap::new()),
            resolved: RwLock::new(BTreeMap::new()),
            hook: RwLock::new(None),
            tracked: AtomicBool::new(false),
        }
    }

    /// Returns the document's identity.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        *self.id.read()
    }

    /// Assigns the identity. Used during hydration only.
    pub fn set_id(&self, id: DocumentId) {
        *self.id.write() = id;
    }

    /// Returns the logical collection name.
    #[must_use]
    pub fn collection_name(&self) -> &'static str {
        self.collection
    }

    /// Returns the declared property layout.
    #[must_use]
    pub fn layout(&self) -> &'static [PropertySpec] {
        self.layout
    }

    /// Looks up a declared property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&'static PropertySpec> {
        self.layout.iter().find(|spec| spec.name == name)
    }

    fn declared(&self, name: &str, want_value: bool) -> MondocResult<&'static PropertySpec> {
        let spec = self.property(name).ok_or_else(|| {
            MondocError::argument(format!(
                "property {name} is not declared on {}",
                self.collection
            ))
        })?;
        if want_value != spec.is_value() {
            return Err(MondocError::argument(format!(
                "property {name} on {} has kind {:?}",
                self.collection, spec.kind
            )));
        }
        Ok(spec)
    }

    /// Reads a scalar or complex property value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    /// Writes a scalar or complex property through the controlled
    /// setter, emitting a change notification.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the property is not declared as a
    /// scalar or complex value.
    pub fn set_value(&self, name: &str, value: Value) -> MondocResult<()> {
        let spec = self.declared(name, true)?;
        self.values.write().insert(spec.name, value);
        self.notify(spec.name);
        Ok(())
    }

    /// Reads the resolved referent of a single-reference property.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<Arc<dyn Document>> {
        match self.resolved.read().get(name) {
            Some(Resolved::One(document)) => Some(Arc::clone(document)),
            _ => None,
        }
    }

    /// Assigns a single-reference property through the controlled
    /// setter, emitting a change notification.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the property is not declared as a
    /// single reference.
    pub fn set_reference(
        &self,
        name: &str,
        referent: Option<Arc<dyn Document>>,
    ) -> MondocResult<()> {
        let spec = self.declared(name, false)?;
        if !matches!(spec.kind, PropertyKind::Reference { .. }) {
            return Err(MondocError::argument(format!(
                "property {name} on {} is not a single reference",
                self.collection
            )));
        }
        {
            let mut resolved = self.resolved.write();
            match referent {
                Some(document) => {
                    resolved.insert(spec.name, Resolved::One(document));
                }
                None => {
                    resolved.remove(spec.name);
                }
            }
        }
        self.notify(spec.name);
        Ok(())
    }

    /// Reads the resolved list of a collection-reference property.
    #[must_use]
    pub fn reference_list(&self, name: &str) -> Option<TrackedList> {
        match self.resolved.read().get(name) {
            Some(Resolved::Many(list)) => Some(list.clone()),
            _ => None,
        }
    }

    /// Assigns a collection-reference property through the controlled
    /// setter, emitting a change notification.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the property is not declared as a
    /// collection reference.
    pub fn set_reference_list(&self, name: &str, list: TrackedList) -> MondocResult<()> {
        let spec = self.declared(name, false)?;
        if !matches!(spec.kind, PropertyKind::ReferenceCollection { .. }) {
            return Err(MondocError::argument(format!(
                "property {name} on {} is not a collection reference",
                self.collection
            )));
        }
        self.resolved.write().insert(spec.name, Resolved::Many(list));
        self.notify(spec.name);
        Ok(())
    }

    /// Reads the unresolved reference payload stored for a navigation
    /// property.
    #[must_use]
    pub fn reference_ids(&self, name: &str) -> Option<RefIds> {
        self.ref_ids.read().get(name).cloned()
    }

    /// Stores the raw reference payload for a navigation property and
    /// leaves the typed slot null.
    ///
    /// This is the hydration write of deserialization; it is not a
    /// controlled write and emits no change notification.
    pub fn set_reference_ids(&self, name: &str, ids: RefIds) {
        if let Some(spec) = self.property(name) {
            self.ref_ids.write().insert(spec.name, ids);
            self.resolved.write().remove(spec.name);
        }
    }

    /// Installs the change-notification hook. At most one subscriber;
    /// a new installation replaces the previous one.
    pub(crate) fn install_change_hook(&self, hook: ChangeHook) {
        *self.hook.write() = Some(hook);
    }

    /// Returns the currently installed change hook, if any.
    pub(crate) fn change_hook(&self) -> Option<ChangeHook> {
        self.hook.read().clone()
    }

    /// Marks the document as tracked; its eventual drop records a
    /// reclamation event.
    pub(crate) fn mark_tracked(&self) {
        self.tracked.store(true, Ordering::Relaxed);
    }

    fn notify(&self, name: &str) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(self.id(), name);
        }
    }
}

impl Drop for DocumentBase {
    fn drop(&mut self) {
        if self.tracked.load(Ordering::Relaxed) {
            crate::state::note_reclamation();
        }
    }
}

impl fmt::Debug for DocumentBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentBase")
            .field("id", &self.id())
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// A change-notifying set of referents, assigned by a collection load.
///
/// Mutations notify the owning document's change hook, so adding or
/// removing referents dirties the owning entry. The list is cheap to
/// clone; clones share storage.
#[derive(Clone)]
pub struct TrackedList {
    inner: Arc<ListInner>,
}

struct ListInner {
    owner: DocumentId,
    property: String,
    items: RwLock<Vec<Arc<dyn Document>>>,
    hook: RwLock<Option<ChangeHook>>,
}

impl TrackedList {
    /// Creates an empty list owned by the given document and property.
    #[must_use]
    pub fn new(owner: DocumentId, property: impl Into<String>) -> Self {
        Self::with_items(owner, property, Vec::new())
    }

    /// Creates a list pre-populated with referents.
    ///
    /// Population does not notify; only subsequent mutations do.
    #[must_use]
    pub fn with_items(
        owner: DocumentId,
        property: impl Into<String>,
        items: Vec<Arc<dyn Document>>,
    ) -> Self {
        Self {
            inner: Arc::new(ListInner {
                owner,
                property: property.into(),
                items: RwLock::new(items),
                hook: RwLock::new(None),
            }),
        }
    }

    /// Installs the owning document's change hook.
    pub(crate) fn install_hook(&self, hook: Option<ChangeHook>) {
        *self.inner.hook.write() = hook;
    }

    /// Adds a referent and notifies.
    pub fn add(&self, document: Arc<dyn Document>) {
        self.inner.items.write().push(document);
        self.notify();
    }

    /// Removes the referent with the given identity and notifies.
    ///
    /// Returns true if a referent was removed.
    pub fn remove(&self, id: DocumentId) -> bool {
        let removed = {
            let mut items = self.inner.items.write();
            let before = items.len();
            items.retain(|doc| doc.base().id() != id);
            items.len() != before
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Removes all referents and notifies if any were present.
    pub fn clear(&self) {
        let was_empty = {
            let mut items = self.inner.items.write();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.notify();
        }
    }

    /// Returns the number of referents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Returns true if the list holds no referents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Returns true if a referent with the given identity is present.
    #[must_use]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.inner
            .items
            .read()
            .iter()
            .any(|doc| doc.base().id() == id)
    }

    /// Returns the referents in order.
    #[must_use]
    pub fn items(&self) -> Vec<Arc<dyn Document>> {
        self.inner.items.read().clone()
    }

    /// Returns the referent identities in order.
    #[must_use]
    pub fn ids(&self) -> Vec<DocumentId> {
        self.inner
            .items
            .read()
            .iter()
            .map(|doc| doc.base().id())
            .collect()
    }

    fn notify(&self) {
        let hook = self.inner.hook.read().clone();
        if let Some(hook) = hook {
            hook(self.inner.owner, &self.inner.property);
        }
    }
}

impl fmt::Debug for TrackedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedList")
            .field("owner", &self.inner.owner)
            .field("property", &self.inner.property)
            .field("len", &self.len())
            .finish()
    }
}
