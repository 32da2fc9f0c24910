//! Document wrapper: strong, weak, or null handle over one document.

use crate::document::Document;
use crate::state::DocumentState;
use mondoc_record::DocumentId;
use std::fmt;
use std::sync::{Arc, Weak};

/// A uniform handle holding one document together with its identity
/// and logical collection name.
///
/// - *Strong* owns the document for the wrapper's lifetime.
/// - *Weak* holds the document only while some other strong owner
///   exists and reports absence after reclamation. Identity and
///   collection name are cached at construction so they survive
///   reclamation.
/// - *Null* stands in for a missing document and always reports
///   absence.
pub enum DocumentWrapper {
    /// Owns the document.
    Strong(Arc<dyn Document>),
    /// Holds the document weakly.
    Weak {
        /// The weakly held document.
        document: Weak<dyn Document>,
        /// Identity cached at construction.
        id: DocumentId,
        /// Collection name cached at construction.
        collection: &'static str,
    },
    /// Sentinel for a missing document.
    Null {
        /// Identity of the absent document.
        id: DocumentId,
        /// Collection name of the absent document.
        collection: &'static str,
    },
}

impl DocumentWrapper {
    /// Creates the wrapper variant appropriate for a state.
    ///
    /// Added, Modified, and Deleted entries hold their document
    /// strongly; Unchanged and Detached entries hold it weakly. An
    /// absent document yields the Null sentinel.
    #[must_use]
    pub fn for_state(
        document: Option<Arc<dyn Document>>,
        id: DocumentId,
        collection: &'static str,
        state: DocumentState,
    ) -> Self {
        match document {
            Some(document) if state.holds_strong() => Self::Strong(document),
            Some(document) => Self::Weak {
                document: Arc::downgrade(&document),
                id,
                collection,
            },
            None => Self::Null { id, collection },
        }
    }

    /// Returns the document, if it is still reachable.
    #[must_use]
    pub fn document(&self) -> Option<Arc<dyn Document>> {
        match self {
            Self::Strong(document) => Some(Arc::clone(document)),
            Self::Weak { document, .. } => document.upgrade(),
            Self::Null { .. } => None,
        }
    }

    /// Returns the wrapped identity.
    ///
    /// Readable even after the document has been reclaimed.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        match self {
            Self::Strong(document) => document.base().id(),
            Self::Weak { id, .. } | Self::Null { id, .. } => *id,
        }
    }

    /// Returns the wrapped collection name.
    ///
    /// Readable even after the document has been reclaimed.
    #[must_use]
    pub fn collection_name(&self) -> &'static str {
        match self {
            Self::Strong(document) => document.base().collection_name(),
            Self::Weak { collection, .. } | Self::Null { collection, .. } => *collection,
        }
    }

    /// Returns true if the document is still reachable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak { document, .. } => document.strong_count() > 0,
            Self::Null { .. } => false,
        }
    }

    /// Returns true for the strong variant.
    #[must_use]
    pub fn is_strong(&self) -> bool {
        matches!(self, Self::Strong(_))
    }
}

impl fmt::Debug for DocumentWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Strong(_) => "Strong",
            Self::Weak { .. } => "Weak",
            Self::Null { .. } => "Null",
        };
        f.debug_struct("DocumentWrapper")
            .field("variant", &variant)
            .field("id", &self.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}
