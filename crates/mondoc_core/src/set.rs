//! Typed per-kind document set facade.

use crate::context::DocumentContext;
use crate::document::{downcast, Document, DocumentType};
use crate::error::{MondocError, MondocResult};
use crate::handles::DocumentEntry;
use crate::state::DocumentState;
use mondoc_record::DocumentId;
use mondoc_store::{Filter, QueryOptions};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{mpsc, Arc};

/// A cancellation signal for find operations.
///
/// Cancelled finds complete with an empty result and do not raise.
/// Tokens are cheap to clone; clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Options for a filtered find.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Maximum number of documents to return. `None` means unbounded.
    pub limit: Option<usize>,
    /// Number of matching documents to skip.
    pub skip: usize,
    /// Cancellation signal, if any.
    pub cancel: Option<CancelToken>,
}

impl FindOptions {
    /// Creates default options: no limit, no skip, no cancellation.
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

    /// Sets the number of documents to skip.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            limit: self.limit,
            skip: self.skip,
        }
    }
}

/// A typed facade over one document kind.
///
/// Obtained from [`DocumentContext::set`]. Tracking operations
/// (add / attach / update / remove) route through the context's state
/// manager; finds go to the store and pass through the
/// identity-preserving deserialization path, so returned instances may
/// be pre-existing tracked objects.
///
/// # Filtering
///
/// mondoc does not translate queries. Filtering uses host-language
/// predicates over records, handed through to the store:
///
/// ```rust,ignore
/// let adults = people.find_where(
///     Filter::new(|r| r.get("age").and_then(Value::as_int).unwrap_or(0) >= 18),
///     FindOptions::new(),
/// )?;
/// ```
pub struct DocumentSet<'a, T: DocumentType> {
    context: &'a DocumentContext,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: DocumentType> DocumentSet<'a, T> {
    pub(crate) fn new(context: &'a DocumentContext) -> Self {
        Self {
            context,
            _marker: PhantomData,
        }
    }

    /// Returns the collection name this set operates on.
    #[must_use]
    pub fn collection_name(&self) -> &'static str {
        T::collection_name()
    }

    fn track(&self, document: &Arc<T>, state: DocumentState) -> MondocResult<DocumentEntry<'a>> {
        let document: Arc<dyn Document> = Arc::clone(document) as Arc<dyn Document>;
        self.context.track_object(document, state)
    }

    /// Begins tracking a new document; it is inserted on the next
    /// save.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if an existing entry for the
    /// identity cannot transition.
    pub fn add(&self, document: &Arc<T>) -> MondocResult<DocumentEntry<'a>> {
        self.track(document, DocumentState::Added)
    }

    /// Begins tracking an existing document as Unchanged.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if an existing entry for the
    /// identity cannot transition.
    pub fn attach(&self, document: &Arc<T>) -> MondocResult<DocumentEntry<'a>> {
        self.track(document, DocumentState::Unchanged)
    }

    /// Begins tracking a document as Modified; it is replaced on the
    /// next save.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if an existing entry for the
    /// identity cannot transition.
    pub fn update(&self, document: &Arc<T>) -> MondocResult<DocumentEntry<'a>> {
        self.track(document, DocumentState::Modified)
    }

    /// Begins tracking a document as Deleted; it is removed from the
    /// store on the next save.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if an existing entry for the
    /// identity cannot transition.
    pub fn remove(&self, document: &Arc<T>) -> MondocResult<DocumentEntry<'a>> {
        self.track(document, DocumentState::Deleted)
    }

    /// Fetches one document by identity.
    ///
    /// The fetch goes straight to the store; the result passes through
    /// the identity-preserving path, so an already-tracked instance is
    /// returned when one exists.
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn find(&self, id: DocumentId) -> MondocResult<Option<Arc<T>>> {
        let Some(document) = self.context.fetch_tracked(T::collection_name(), id)? else {
            return Ok(None);
        };
        self.expect_typed(document).map(Some)
    }

    /// Fetches the documents matching a pass-through filter.
    ///
    /// # Errors
    ///
    /// Propagates store command failures. Cancellation is not an
    /// error: a cancelled find returns an empty result.
    pub fn find_where(&self, filter: Filter, options: FindOptions) -> MondocResult<Vec<Arc<T>>> {
        if options.is_cancelled() {
            return Ok(Vec::new());
        }
        let records =
            self.context
                .store()
                .query(T::collection_name(), &filter, &options.query_options())?;
        let serializer = self.context.serializers().get(T::collection_name())?;
        let mut result = Vec::with_capacity(records.len());
        for record in &records {
            if options.is_cancelled() {
                return Ok(Vec::new());
            }
            let document = serializer.deserialize(record, self.context.state())?;
            result.push(self.expect_typed(document)?);
        }
        Ok(result)
    }

    /// Fetches the first document matching a filter.
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn find_one(&self, filter: Filter) -> MondocResult<Option<Arc<T>>> {
        let mut found = self.find_where(filter, FindOptions::new().with_limit(1))?;
        Ok(found.pop())
    }

    /// Push-based find: decoded documents are pumped into the returned
    /// channel by a worker.
    ///
    /// No backpressure is applied; observers must keep up with the
    /// producer's rate. At most one push-based find may be active per
    /// collection; an overlapping call raises an invalid-state error.
    /// Cancellation ends the stream without error.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error for an overlapping push-based
    /// find on the same collection.
    pub fn find_push(
        &self,
        filter: Filter,
        options: FindOptions,
    ) -> MondocResult<Receiver<Arc<T>>> {
        let guard = self.context.begin_push(T::collection_name())?;
        let serializer = self.context.serializers().get(T::collection_name())?;
        let store = Arc::clone(self.context.store());
        let state = Arc::clone(self.context.state());
        let (sender, receiver) = mpsc::channel();

        std::thread::spawn(move || {
            let _guard = guard;
            if options.is_cancelled() {
                return;
            }
            let records =
                match store.query(T::collection_name(), &filter, &options.query_options()) {
                    Ok(records) => records,
                    Err(error) => {
                        tracing::warn!(
                            collection = T::collection_name(),
                            %error,
                            "push-based find failed"
                        );
                        return;
                    }
                };
            for record in &records {
                if options.is_cancelled() {
                    break;
                }
                match serializer.deserialize(record, &state) {
                    Ok(document) => {
                        let Some(typed) = downcast::<T>(document) else {
                            continue;
                        };
                        if sender.send(typed).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            collection = T::collection_name(),
                            %error,
                            "push-based find could not decode record"
                        );
                        break;
                    }
                }
            }
        });

        Ok(receiver)
    }

    /// Deletes one document store-side, bypassing the tracked set.
    ///
    /// A tracked copy of the document remains live; re-adding and
    /// saving it later resurrects the deleted row as an insert.
    /// Callers are responsible for also detaching any tracked copies.
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn delete(&self, document: &Arc<T>) -> MondocResult<()> {
        let id = document.base().id();
        self.context
            .store()
            .delete_many(T::collection_name(), &[id])?;
        Ok(())
    }

    /// Deletes every document matching a filter store-side, bypassing
    /// the tracked set. Returns the number of documents removed.
    ///
    /// Tracked copies of deleted documents remain live; re-adding and
    /// saving one later resurrects its row.
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn delete_where(&self, filter: Filter) -> MondocResult<u64> {
        Ok(self
            .context
            .store()
            .delete_where(T::collection_name(), &filter)?)
    }

    /// Deletes every document in the collection store-side, bypassing
    /// the tracked set. Returns the number of documents removed.
    ///
    /// Tracked copies of deleted documents remain live; re-adding and
    /// saving one later resurrects its row.
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn delete_all(&self) -> MondocResult<u64> {
        self.delete_where(Filter::all())
    }

    /// Returns the cardinality of the underlying collection.
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn count(&self) -> MondocResult<u64> {
        Ok(self.context.store().count(T::collection_name())?)
    }

    /// Iterates over every document in the collection.
    ///
    /// Equivalent to an unfiltered [`find_where`](Self::find_where).
    ///
    /// # Errors
    ///
    /// Propagates store command failures.
    pub fn iter(&self) -> MondocResult<impl Iterator<Item = Arc<T>>> {
        let documents = self.find_where(Filter::all(), FindOptions::new())?;
        Ok(documents.into_iter())
    }

    fn expect_typed(&self, document: Arc<dyn Document>) -> MondocResult<Arc<T>> {
        downcast::<T>(document).ok_or_else(|| {
            MondocError::serialization(format!(
                "tracked document for collection {} has a different type",
                T::collection_name()
            ))
        })
    }
}

impl<T: DocumentType> fmt::Debug for DocumentSet<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSet")
            .field("collection", &T::collection_name())
            .finish()
    }
}
