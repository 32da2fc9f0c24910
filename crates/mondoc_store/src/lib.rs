//! # Mondoc Store
//!
//! Document store command surface for mondoc.
//!
//! This crate provides the boundary between the mapping layer and the
//! underlying MongoDB-compatible driver. The mapping layer issues a
//! small set of bulk commands; implementations translate them to the
//! driver's wire protocol.
//!
//! ## Design Principles
//!
//! - Stores execute commands; they do not track state
//! - Per-document write failures are reported positionally, never raised
//! - Filtering is pass-through: a host-language predicate, no query DSL
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral deployments
//!
//! ## Example
//!
//! ```
//! use mondoc_record::{DocumentId, Record, Value};
//! use mondoc_store::{DocumentStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! let id = DocumentId::generate();
//! let mut record = Record::new(id);
//! record.set("name", Value::Text("Alice".into()));
//!
//! let response = store.insert_many("users", &[record]).unwrap();
//! assert!(response.is_clean());
//! assert!(store.find_one("users", id).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod filter;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use filter::Filter;
pub use memory::{InMemoryStore, DUPLICATE_KEY};
pub use store::{DocumentStore, QueryOptions, ReplaceOne, WriteError, WriteResponse};
