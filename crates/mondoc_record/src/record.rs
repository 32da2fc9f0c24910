//! Ordered top-level document record.

use crate::id::DocumentId;
use crate::value::Value;

/// The field name of the identity.
pub const ID_FIELD: &str = "_id";

/// An ordered, self-describing top-level document.
///
/// A record is the persisted image of one document: the `_id` field
/// first, followed by the declared fields in declaration order
/// (scalar and complex values, then single-reference identities, then
/// collection-reference identity arrays).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates a record for the given identity.
    ///
    /// The `_id` field is written first.
    #[must_use]
    pub fn new(id: DocumentId) -> Self {
        Self {
            fields: vec![(ID_FIELD.to_string(), Value::Id(id))],
        }
    }

    /// Creates a record from raw fields, as received from the driver.
    #[must_use]
    pub fn from_fields(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Returns the record's identity, if an `_id` field is present.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.get(ID_FIELD).and_then(Value::as_id)
    }

    /// Returns a field value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Sets a field value, replacing an existing field in place or
    /// appending a new one at the end.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Returns the fields in order.
    #[must_use]
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Returns the number of fields, including `_id`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
