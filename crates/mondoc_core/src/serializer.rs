//! Identity-preserving document serialization.
//!
//! Serialization writes a document as an ordered, self-describing
//! record: the identity first, then scalar and complex values, then
//! single-reference identities, then collection-reference identity
//! arrays, in declaration order.
//!
//! Deserialization is the critical path of the identity map: every
//! record read from the store is offered to the state manager first,
//! so an already-tracked in-memory instance is reused and hydrated in
//! place. Hydration writes go through the controlled setters with
//! property-change tracking suppressed.

use crate::document::{Document, DocumentType, PropertyKind, RefIds};
use crate::error::{MondocError, MondocResult};
use crate::state::{DocumentState, StateEntry, StateManager};
use mondoc_record::{DocumentId, Record, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The state-manager surface deserialization hooks into.
pub trait DeserializeHooks {
    /// Returns the already-tracked document for an identity, if one
    /// exists and is still reachable.
    fn before_deserialize(&self, id: DocumentId) -> Option<Arc<dyn Document>>;

    /// Toggles property-change tracking for an identity.
    fn set_property_tracking(&self, id: DocumentId, enabled: bool);

    /// Adds-or-gets a tracking entry for the hydrated document and
    /// transitions it to Unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition fails.
    fn after_deserialize(&self, document: Arc<dyn Document>) -> MondocResult<Arc<StateEntry>>;
}

impl DeserializeHooks for Arc<StateManager> {
    fn before_deserialize(&self, id: DocumentId) -> Option<Arc<dyn Document>> {
        self.find(id).and_then(|entry| entry.document())
    }

    fn set_property_tracking(&self, id: DocumentId, enabled: bool) {
        StateManager::set_property_tracking(self, id, enabled);
    }

    fn after_deserialize(&self, document: Arc<dyn Document>) -> MondocResult<Arc<StateEntry>> {
        let entry = self.add_or_get_existing(document, DocumentState::Unchanged)?;
        if entry.state() != DocumentState::Unchanged {
            // Last serialization event wins: a concurrent reload
            // resets even a Modified entry.
            self.change_document_state(&entry, DocumentState::Unchanged)?;
        }
        Ok(entry)
    }
}

/// Encodes and decodes documents of one kind.
pub trait DocumentSerializer: Send + Sync {
    /// The collection this serializer handles.
    fn collection_name(&self) -> &'static str;

    /// Writes a document as an ordered record.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the document cannot be
    /// encoded.
    fn serialize(&self, document: &dyn Document) -> MondocResult<Record>;

    /// Decodes a record through the identity-preserving path.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be decoded.
    fn deserialize(
        &self,
        record: &Record,
        hooks: &dyn DeserializeHooks,
    ) -> MondocResult<Arc<dyn Document>>;
}

/// The standard serializer for a document type.
///
/// Follows the declared layout in both directions. Reference fields
/// round-trip as identities: hydration stores raw identities in the
/// navigable map and leaves the typed navigation slots null.
pub struct RecordSerializer<T: DocumentType> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: DocumentType> RecordSerializer<T> {
    /// Creates the serializer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: DocumentType> Default for RecordSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DocumentType> DocumentSerializer for RecordSerializer<T> {
    fn collection_name(&self) -> &'static str {
        T::collection_name()
    }

    fn serialize(&self, document: &dyn Document) -> MondocResult<Record> {
        let base = document.base();
        let mut record = Record::new(base.id());
        for spec in base.layout() {
            match spec.kind {
                PropertyKind::Scalar | PropertyKind::Complex => {
                    record.set(spec.name, base.value(spec.name).unwrap_or(Value::Null));
                }
                PropertyKind::Reference { .. } => {
                    // Prefer the resolved referent; fall back to the
                    // stored identity; absent means empty.
                    let id = base
                        .reference(spec.name)
                        .map(|referent| referent.base().id())
                        .or_else(|| match base.reference_ids(spec.name) {
                            Some(RefIds::One(id)) => Some(id),
                            _ => None,
                        })
                        .unwrap_or(DocumentId::EMPTY);
                    record.set(spec.name, Value::Id(id));
                }
                PropertyKind::ReferenceCollection { .. } => {
                    let ids = base
                        .reference_list(spec.name)
                        .map(|list| list.ids())
                        .or_else(|| match base.reference_ids(spec.name) {
                            Some(RefIds::Many(ids)) => Some(ids),
                            _ => None,
                        })
                        .unwrap_or_default();
                    record.set(spec.name, Value::id_array(&ids));
                }
            }
        }
        Ok(record)
    }

    fn deserialize(
        &self,
        record: &Record,
        hooks: &dyn DeserializeHooks,
    ) -> MondocResult<Arc<dyn Document>> {
        let id = record
            .id()
            .ok_or_else(|| MondocError::serialization("record has no _id field"))?;

        let document: Arc<dyn Document> = match hooks.before_deserialize(id) {
            Some(existing) => existing,
            None => T::create(id),
        };

        hooks.set_property_tracking(id, false);
        let hydrated = hydrate(document.as_ref(), record);
        hooks.set_property_tracking(id, true);
        hydrated?;

        hooks.after_deserialize(Arc::clone(&document))?;
        Ok(document)
    }
}

impl<T: DocumentType> fmt::Debug for RecordSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSerializer")
            .field("collection", &T::collection_name())
            .finish()
    }
}

/// Assigns a record's fields onto a document instance.
fn hydrate(document: &dyn Document, record: &Record) -> MondocResult<()> {
    let base = document.base();
    for (name, value) in record.fields() {
        if name == mondoc_record::ID_FIELD {
            continue;
        }
        // Fields not declared on this type are skipped.
        let Some(spec) = base.property(name) else {
            continue;
        };
        match spec.kind {
            PropertyKind::Scalar | PropertyKind::Complex => {
                base.set_value(spec.name, value.clone())?;
            }
            PropertyKind::Reference { .. } => {
                let id = value.as_id().ok_or_else(|| {
                    MondocError::serialization(format!(
                        "field {name} is not an identity"
                    ))
                })?;
                base.set_reference_ids(spec.name, RefIds::One(id));
            }
            PropertyKind::ReferenceCollection { .. } => {
                let ids = value.as_id_array().ok_or_else(|| {
                    MondocError::serialization(format!(
                        "field {name} is not an identity array"
                    ))
                })?;
                base.set_reference_ids(spec.name, RefIds::Many(ids));
            }
        }
    }
    Ok(())
}

/// Registry of serializers keyed by collection / document type name.
///
/// The standard serializer for a type is registered when its document
/// set is first obtained; custom serializers take precedence when
/// registered explicitly. Persisting a type with no registered
/// serializer raises [`MondocError::SerializerMissing`].
pub struct SerializerRegistry {
    by_collection: RwLock<HashMap<&'static str, Arc<dyn DocumentSerializer>>>,
}

impl SerializerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_collection: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the standard serializer for a type, unless a
    /// serializer for its collection is already present.
    pub fn register<T: DocumentType>(&self) {
        self.by_collection
            .write()
            .entry(T::collection_name())
            .or_insert_with(|| Arc::new(RecordSerializer::<T>::new()));
    }

    /// Registers a custom serializer, replacing any existing one for
    /// the same collection.
    pub fn register_custom(&self, serializer: Arc<dyn DocumentSerializer>) {
        self.by_collection
            .write()
            .insert(serializer.collection_name(), serializer);
    }

    /// Returns the serializer for a collection.
    ///
    /// # Errors
    ///
    /// Returns [`MondocError::SerializerMissing`] if none is
    /// registered.
    pub fn get(&self, collection: &str) -> MondocResult<Arc<dyn DocumentSerializer>> {
        self.by_collection
            .read()
            .get(collection)
            .map(Arc::clone)
            .ok_or_else(|| MondocError::serializer_missing(collection))
    }

    /// Returns true if a serializer is registered for the collection.
    #[must_use]
    pub fn contains(&self, collection: &str) -> bool {
        self.by_collection.read().contains_key(collection)
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("registered", &self.by_collection.read().len())
            .finish()
    }
}
