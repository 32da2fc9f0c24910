//! # Mondoc Record
//!
//! Document value model for mondoc.
//!
//! This crate provides the representation of documents as they travel
//! between the mapping layer and the store driver:
//! - [`DocumentId`] - 12-byte chronologically ordered identity
//! - [`Value`] - dynamic document value
//! - [`Record`] - ordered, self-describing top-level document
//!
//! ## Field Ordering
//!
//! Records preserve field order: `_id` first, then fields in the order
//! they were written. Unlike canonical encodings, no key sorting is
//! applied - the persisted layout follows property declaration order.
//!
//! ## Example
//!
//! ```
//! use mondoc_record::{DocumentId, Record, Value};
//!
//! let id = DocumentId::generate();
//! let mut record = Record::new(id);
//! record.set("name", Value::Text("Alice".into()));
//!
//! assert_eq!(record.id(), Some(id));
//! assert_eq!(record.get("name").and_then(Value::as_text), Some("Alice"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod id;
mod record;
mod value;

pub use id::DocumentId;
pub use record::{Record, ID_FIELD};
pub use value::Value;
