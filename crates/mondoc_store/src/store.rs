//! Document store trait definition.

use crate::error::StoreResult;
use crate::filter::Filter;
use mondoc_record::{DocumentId, Record};
use std::collections::HashSet;

/// A document store for mondoc.
///
/// Stores are **command executors**: the mapping layer hands them bulk
/// commands and they translate those to the driver's wire protocol.
/// Stores do not track document state and do not interpret records
/// beyond the `_id` field.
///
/// # Wire Commands
///
/// | Method | Command body |
/// |--------|--------------|
/// | [`insert_many`](Self::insert_many) | `{ insert: <collection>, documents: [<doc>,...] }` |
/// | [`update_many`](Self::update_many) | `{ update: <collection>, updates: [{ q:{_id}, u:<doc> },...] }` |
/// | [`delete_many`](Self::delete_many) | `{ delete: <collection>, deletes: [{ q:{_id}, limit:0 },...] }` |
/// | [`reload`](Self::reload) | `{ findAndModify: <collection>, query:{_id}, update:{} }` |
///
/// # Invariants
///
/// - Per-document failures are reported in [`WriteResponse::write_errors`]
///   and never abort the rest of the batch
/// - `index` in a write error is the zero-based position within the
///   command's batch
/// - Implementations must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`crate::InMemoryStore`] - For testing and ephemeral deployments
pub trait DocumentStore: Send + Sync {
    /// Inserts a batch of documents into a collection.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command as a whole fails;
    /// per-document rejections are reported in the response.
    fn insert_many(&self, collection: &str, documents: &[Record]) -> StoreResult<WriteResponse>;

    /// Replaces a batch of documents, each matched by identity.
    ///
    /// A replace whose identity matches no stored document is a no-op,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command as a whole fails.
    fn update_many(&self, collection: &str, updates: &[ReplaceOne]) -> StoreResult<WriteResponse>;

    /// Deletes a batch of documents by identity.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command as a whole fails.
    fn delete_many(&self, collection: &str, ids: &[DocumentId]) -> StoreResult<WriteResponse>;

    /// Fetches one document by identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn find_one(&self, collection: &str, id: DocumentId) -> StoreResult<Option<Record>>;

    /// Fetches a batch of documents by identity in one command.
    ///
    /// Missing identities are silently absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn find_many(&self, collection: &str, ids: &[DocumentId]) -> StoreResult<Vec<Record>>;

    /// Fetches documents matching a pass-through filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn query(
        &self,
        collection: &str,
        filter: &Filter,
        options: &QueryOptions,
    ) -> StoreResult<Vec<Record>>;

    /// Fetches the current image of one document via
    /// find-and-modify-with-empty-update.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn reload(&self, collection: &str, id: DocumentId) -> StoreResult<Option<Record>>;

    /// Deletes all documents matching a filter, returning the count
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn delete_where(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Returns the number of documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn count(&self, collection: &str) -> StoreResult<u64>;
}

/// One match-by-identity replace within an update command.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOne {
    /// The identity to match.
    pub id: DocumentId,
    /// The full replacement document.
    pub document: Record,
}

impl ReplaceOne {
    /// Creates a replace command entry.
    #[must_use]
    pub fn new(id: DocumentId, document: Record) -> Self {
        Self { id, document }
    }
}

/// Options for a filtered query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of records to return. `None` means unbounded.
    pub limit: Option<usize>,
    /// Number of matching records to skip.
    pub skip: usize,
}

impl QueryOptions {
    /// Creates default options: no limit, no skip.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of records to skip.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

/// A per-document failure report within a bulk command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Zero-based position within the command's batch.
    pub index: usize,
    /// Store-assigned error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl WriteError {
    /// Creates a write error report.
    #[must_use]
    pub fn new(index: usize, code: i32, message: impl Into<String>) -> Self {
        Self {
            index,
            code,
            message: message.into(),
        }
    }
}

/// The response to a bulk write command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResponse {
    /// Number of documents in the command's batch.
    pub requested: usize,
    /// Per-document failures, if any.
    pub write_errors: Vec<WriteError>,
}

impl WriteResponse {
    /// Creates a clean response for a batch of the given size.
    #[must_use]
    pub fn clean(requested: usize) -> Self {
        Self {
            requested,
            write_errors: Vec::new(),
        }
    }

    /// Creates a response carrying write errors.
    #[must_use]
    pub fn with_errors(requested: usize, write_errors: Vec<WriteError>) -> Self {
        Self {
            requested,
            write_errors,
        }
    }

    /// Returns true if no document in the batch failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.write_errors.is_empty()
    }

    /// Returns the batch positions that failed.
    #[must_use]
    pub fn failed_indices(&self) -> HashSet<usize> {
        self.write_errors.iter().map(|e| e.index).collect()
    }

    /// Returns the number of documents that succeeded.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.requested.saturating_sub(self.failed_indices().len())
    }
}
