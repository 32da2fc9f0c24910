//! Dynamic document value type.

use crate::id::DocumentId;

/// A dynamic document value.
///
/// This type represents any field value mondoc can persist. Embedded
/// documents keep their pairs in insertion order; the persisted layout
/// follows property declaration order, so no key sorting is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Document identity.
    Id(DocumentId),
    /// Array of values.
    Array(Vec<Value>),
    /// Embedded document (ordered key-value pairs).
    Document(Vec<(String, Value)>),
}

impl Value {
    /// Creates an embedded document value, preserving pair order.
    #[must_use]
    pub fn document(pairs: Vec<(String, Value)>) -> Self {
        Value::Document(pairs)
    }

    /// Creates an array of identities.
    #[must_use]
    pub fn id_array(ids: &[DocumentId]) -> Self {
        Value::Array(ids.iter().copied().map(Value::Id).collect())
    }

    /// Returns true if this is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the double value, if this is a `Double`.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the text value, if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte string, if this is a `Bytes`.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the identity, if this is an `Id`.
    #[must_use]
    pub fn as_id(&self) -> Option<DocumentId> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the array elements, if this is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the embedded document pairs, if this is a `Document`.
    #[must_use]
    pub fn as_document(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Document(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Collects the identities of an `Array` of `Id` values.
    ///
    /// Returns `None` if this is not an array or any element is not an
    /// identity.
    #[must_use]
    pub fn as_id_array(&self) -> Option<Vec<DocumentId>> {
        let values = self.as_array()?;
        values.iter().map(Value::as_id).collect()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::Id(id)
    }
}
