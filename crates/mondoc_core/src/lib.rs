//! # Mondoc Core
//!
//! Identity-mapped, change-tracked object-document mapping over a
//! MongoDB-compatible store.
//!
//! This crate provides:
//! - A state manager tracking each document's lifecycle state
//!   (Added / Modified / Deleted / Unchanged / Detached) with
//!   single-instance identity per context
//! - A weak/strong hybrid cache: Unchanged documents are weakly held
//!   and reclaimable, dirty documents are strongly held until
//!   persisted
//! - A background cache cleaner reclaiming dead entries
//! - Identity-preserving serialization: every record read from the
//!   store reuses the tracked in-memory instance when one exists
//! - A persistence pipeline batching dirty entries into bulk commands
//!   and correlating per-document write errors back to their entries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mondoc_core::{Config, DocumentContext, InMemoryStore};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let context = DocumentContext::with_config(store, Config::from_env())?;
//!
//! let users = context.set::<User>();
//! let user = User::create(DocumentId::generate());
//! user.base().set_value("name", Value::Text("Alice".into()))?;
//!
//! users.add(&user)?;
//! let committed = context.save_changes()?;
//! assert_eq!(committed, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod handles;
pub mod serializer;
pub mod set;
pub mod state;
pub mod stats;

pub use config::Config;
pub use context::{DocumentContext, MAX_SLICE_LEN};
pub use document::{
    downcast, ChangeHook, Document, DocumentBase, DocumentType, PropertyKind, PropertySpec,
    RefIds, TrackedList,
};
pub use error::{MondocError, MondocResult};
pub use handles::{CollectionEntry, DocumentEntry, PropertyEntry, ReferenceEntry};
pub use serializer::{DeserializeHooks, DocumentSerializer, RecordSerializer, SerializerRegistry};
pub use set::{CancelToken, DocumentSet, FindOptions};
pub use state::{
    reclamation_events, CacheCleaner, DocumentCache, DocumentState, DocumentWrapper, StateEntry,
    StateManager, StateMask,
};
pub use stats::{CleanupCounters, ContextStats};

// Re-export the leaf crates' surface so downstream code needs only
// one dependency.
pub use mondoc_record::{DocumentId, Record, Value};
pub use mondoc_store::{
    DocumentStore, Filter, InMemoryStore, QueryOptions, ReplaceOne, StoreError, StoreResult,
    WriteError, WriteResponse,
};
