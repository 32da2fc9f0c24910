//! Error types for mondoc core.

use mondoc_record::DocumentId;
use mondoc_store::StoreError;
use thiserror::Error;

/// Result type for mapping-layer operations.
pub type MondocResult<T> = Result<T, MondocError>;

/// Errors that can occur in mapping-layer operations.
///
/// Per-document write failures reported by the store are *not* errors;
/// they leave their entries in the pre-commit state and are observable
/// through statistics. Cancellation is not an error either: cancelled
/// finds complete with an empty result.
#[derive(Debug, Error)]
pub enum MondocError {
    /// Null or out-of-range input, raised before any store interaction.
    #[error("invalid argument: {message}")]
    Argument {
        /// Description of the argument issue.
        message: String,
    },

    /// Operation not permitted in the entry's current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Document not found in the store.
    #[error("document not found: {id} in collection {collection}")]
    DocumentNotFound {
        /// The collection searched.
        collection: String,
        /// The identity that was not found.
        id: DocumentId,
    },

    /// No serializer is registered for the document type.
    #[error("no serializer registered for collection {collection}")]
    SerializerMissing {
        /// Name of the collection / document type.
        collection: String,
    },

    /// A record could not be decoded or a document could not be encoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Store-level command failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MondocError {
    /// Creates an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a document not found error.
    pub fn document_not_found(collection: impl Into<String>, id: DocumentId) -> Self {
        Self::DocumentNotFound {
            collection: collection.into(),
            id,
        }
    }

    /// Creates a serializer missing error.
    pub fn serializer_missing(collection: impl Into<String>) -> Self {
        Self::SerializerMissing {
            collection: collection.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
