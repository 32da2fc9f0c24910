//! In-memory document store for testing.

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::store::{DocumentStore, QueryOptions, ReplaceOne, WriteError, WriteResponse};
use mondoc_record::{DocumentId, Record};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Error code reported for duplicate-key inserts.
pub const DUPLICATE_KEY: i32 = 11000;

/// An in-memory document store.
///
/// This store keeps all collections in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral contexts that don't need persistence
///
/// Collections are created implicitly on first insert. Documents are
/// held in identity order.
///
/// # Failure Injection
///
/// For testing the persistence pipeline, write errors can be scripted
/// per command kind ([`script_insert_errors`](Self::script_insert_errors)
/// and friends) and a one-shot command failure can be armed with
/// [`fail_next_command`](Self::fail_next_command). Scripted responses
/// are consumed in FIFO order, one batch per command.
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<DocumentId, Record>>>,
    scripted_insert_errors: Mutex<VecDeque<Vec<WriteError>>>,
    scripted_update_errors: Mutex<VecDeque<Vec<WriteError>>>,
    scripted_delete_errors: Mutex<VecDeque<Vec<WriteError>>>,
    fail_next: Mutex<Option<String>>,
    insert_batch_sizes: Mutex<Vec<usize>>,
    write_commands: Mutex<u64>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the write errors for the next insert command.
    pub fn script_insert_errors(&self, errors: Vec<WriteError>) {
        self.scripted_insert_errors.lock().push_back(errors);
    }

    /// Scripts the write errors for the next update command.
    pub fn script_update_errors(&self, errors: Vec<WriteError>) {
        self.scripted_update_errors.lock().push_back(errors);
    }

    /// Scripts the write errors for the next delete command.
    pub fn script_delete_errors(&self, errors: Vec<WriteError>) {
        self.scripted_delete_errors.lock().push_back(errors);
    }

    /// Arms a one-shot command-level failure.
    ///
    /// The next command of any kind fails with [`StoreError::Command`].
    pub fn fail_next_command(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// Returns the sizes of the insert batches received so far.
    ///
    /// Useful for asserting slice partitioning.
    #[must_use]
    pub fn insert_batch_sizes(&self) -> Vec<usize> {
        self.insert_batch_sizes.lock().clone()
    }

    /// Returns the number of write commands received so far.
    #[must_use]
    pub fn write_command_count(&self) -> u64 {
        *self.write_commands.lock()
    }

    /// Returns a copy of all records in a collection, in identity order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Clears all collections and scripted failures.
    pub fn clear(&self) {
        self.collections.write().clear();
        self.scripted_insert_errors.lock().clear();
        self.scripted_update_errors.lock().clear();
        self.scripted_delete_errors.lock().clear();
        *self.fail_next.lock() = None;
        self.insert_batch_sizes.lock().clear();
    }

    fn check_fail(&self) -> StoreResult<()> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(StoreError::Command { message });
        }
        Ok(())
    }

    fn note_write_command(&self) {
        *self.write_commands.lock() += 1;
    }
}

impl DocumentStore for InMemoryStore {
    fn insert_many(&self, collection: &str, documents: &[Record]) -> StoreResult<WriteResponse> {
        self.check_fail()?;
        self.note_write_command();
        self.insert_batch_sizes.lock().push(documents.len());

        let mut errors = self
            .scripted_insert_errors
            .lock()
            .pop_front()
            .unwrap_or_default();
        let mut failed = errors.iter().map(|e| e.index).collect::<Vec<_>>();

        let mut collections = self.collections.write();
        let entries = collections.entry(collection.to_string()).or_default();

        for (index, record) in documents.iter().enumerate() {
            if failed.contains(&index) {
                continue;
            }
            let Some(id) = record.id() else {
                errors.push(WriteError::new(index, 2, "document has no _id"));
                failed.push(index);
                continue;
            };
            if entries.contains_key(&id) {
                errors.push(WriteError::new(
                    index,
                    DUPLICATE_KEY,
                    format!("duplicate key: {id}"),
                ));
                failed.push(index);
                continue;
            }
            entries.insert(id, record.clone());
        }

        Ok(WriteResponse::with_errors(documents.len(), errors))
    }

    fn update_many(&self, collection: &str, updates: &[ReplaceOne]) -> StoreResult<WriteResponse> {
        self.check_fail()?;
        self.note_write_command();

        let errors = self
            .scripted_update_errors
            .lock()
            .pop_front()
            .unwrap_or_default();
        let failed = errors.iter().map(|e| e.index).collect::<Vec<_>>();

        let mut collections = self.collections.write();
        let entries = collections.entry(collection.to_string()).or_default();

        for (index, update) in updates.iter().enumerate() {
            if failed.contains(&index) {
                continue;
            }
            // Match-by-identity replace; no match is a no-op.
            if let Some(slot) = entries.get_mut(&update.id) {
                *slot = update.document.clone();
            }
        }

        Ok(WriteResponse::with_errors(updates.len(), errors))
    }

    fn delete_many(&self, collection: &str, ids: &[DocumentId]) -> StoreResult<WriteResponse> {
        self.check_fail()?;
        self.note_write_command();

        let errors = self
            .scripted_delete_errors
            .lock()
            .pop_front()
            .unwrap_or_default();
        let failed = errors.iter().map(|e| e.index).collect::<Vec<_>>();

        let mut collections = self.collections.write();
        if let Some(entries) = collections.get_mut(collection) {
            for (index, id) in ids.iter().enumerate() {
                if failed.contains(&index) {
                    continue;
                }
                entries.remove(id);
            }
        }

        Ok(WriteResponse::with_errors(ids.len(), errors))
    }

    fn find_one(&self, collection: &str, id: DocumentId) -> StoreResult<Option<Record>> {
        self.check_fail()?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(&id))
            .cloned())
    }

    fn find_many(&self, collection: &str, ids: &[DocumentId]) -> StoreResult<Vec<Record>> {
        self.check_fail()?;
        let collections = self.collections.read();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id))
            .cloned()
            .collect())
    }

    fn query(
        &self,
        collection: &str,
        filter: &Filter,
        options: &QueryOptions,
    ) -> StoreResult<Vec<Record>> {
        self.check_fail()?;
        let collections = self.collections.read();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = entries
            .values()
            .filter(|record| filter.matches(record))
            .skip(options.skip);
        let result = match options.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        };
        Ok(result)
    }

    fn reload(&self, collection: &str, id: DocumentId) -> StoreResult<Option<Record>> {
        // findAndModify with an empty update: returns the current
        // image without changing it.
        self.find_one(collection, id)
    }

    fn delete_where(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.check_fail()?;
        self.note_write_command();

        let mut collections = self.collections.write();
        let Some(entries) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|_, record| !filter.matches(record));
        Ok((before - entries.len()) as u64)
    }

    fn count(&self, collection: &str) -> StoreResult<u64> {
        self.check_fail()?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.len() as u64)
            .unwrap_or(0))
    }
}
