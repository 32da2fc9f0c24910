//! Document model: the behavioral surface the state manager tracks.
//!
//! User document types embed a [`DocumentBase`] by value and expose it
//! through the [`Document`] trait. The base record carries everything
//! the mapping layer needs: the identity, the declared property
//! layout, the controlled property bag, the navigable map of
//! unresolved reference payloads, and the change-notification slot the
//! state manager subscribes to. The state manager needs only this
//! behavioral surface, not inheritance.
//!
//! # Example
//!
//! ```
//! use std::any::Any;
//! use std::sync::Arc;
//! use mondoc_core::{Document, DocumentBase, DocumentId, DocumentType, PropertySpec, Value};
//!
//! const LAYOUT: &[PropertySpec] = &[
//!     PropertySpec::scalar("name"),
//!     PropertySpec::reference("manager", "employees"),
//! ];
//!
//! struct Employee {
//!     base: DocumentBase,
//! }
//!
//! impl Document for Employee {
//!     fn base(&self) -> &DocumentBase {
//!         &self.base
//!     }
//!
//!     fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
//!         self
//!     }
//! }
//!
//! impl DocumentType for Employee {
//!     fn collection_name() -> &'static str {
//!         "employees"
//!     }
//!
//!     fn layout() -> &'static [PropertySpec] {
//!         LAYOUT
//!     }
//!
//!     fn create(id: DocumentId) -> Arc<Self> {
//!         Arc::new(Self {
//!             base: DocumentBase::with_id(id, "employees", LAYOUT),
//!         })
//!     }
//! }
//!
//! let employee = Employee::create(DocumentId::generate());
//! employee.base().set_value("name", Value::Text("Alice".into())).unwrap();
//! ```

mod base;

pub use base::{ChangeHook, DocumentBase, RefIds, TrackedList};

use mondoc_record::DocumentId;
use std::any::Any;
use std::sync::Arc;

/// The kind of a controlled property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A scalar value (text, number, boolean, bytes).
    Scalar,
    /// A complex value (embedded document or array).
    Complex,
    /// A single-reference navigation; persisted as one identity.
    Reference {
        /// Collection name of the referent type.
        target: &'static str,
    },
    /// A collection-reference navigation; persisted as an ordered
    /// identity array.
    ReferenceCollection {
        /// Collection name of the referent type.
        target: &'static str,
    },
}

/// One declared controlled property.
///
/// Properties appear in the persisted record in declaration order:
/// scalar and complex values first, then single references, then
/// collection references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property name.
    pub name: &'static str,
    /// Property kind.
    pub kind: PropertyKind,
}

impl PropertySpec {
    /// Declares a scalar-value property.
    #[must_use]
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Scalar,
        }
    }

    /// Declares a complex-value property.
    #[must_use]
    pub const fn complex(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Complex,
        }
    }

    /// Declares a single-reference navigation property.
    #[must_use]
    pub const fn reference(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Reference { target },
        }
    }

    /// Declares a collection-reference navigation property.
    #[must_use]
    pub const fn collection(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::ReferenceCollection { target },
        }
    }

    /// Returns true for scalar and complex value properties.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self.kind, PropertyKind::Scalar | PropertyKind::Complex)
    }

    /// Returns true for navigation properties.
    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Reference { .. } | PropertyKind::ReferenceCollection { .. }
        )
    }
}

/// A document participating in tracking.
///
/// Object-safe; the state manager and the serializer work exclusively
/// through this trait and the embedded [`DocumentBase`].
pub trait Document: Send + Sync + 'static {
    /// Returns the embedded base record.
    fn base(&self) -> &DocumentBase;

    /// Upcasts for typed downcasting via [`downcast`].
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// The static surface of a document type.
pub trait DocumentType: Document {
    /// The collection name. By convention this equals the document
    /// type's name; there is no override.
    fn collection_name() -> &'static str;

    /// The declared property layout, in persistence order.
    fn layout() -> &'static [PropertySpec];

    /// Creates a fresh, empty instance with the given identity.
    ///
    /// Used by deserialization when no tracked instance exists.
    fn create(id: DocumentId) -> Arc<Self>;
}

/// Downcasts a type-erased document to a concrete document type.
#[must_use]
pub fn downcast<T: Document>(document: Arc<dyn Document>) -> Option<Arc<T>> {
    document.as_any().downcast::<T>().ok()
}
