//! Pass-through record filter.

use mondoc_record::Record;
use std::fmt;
use std::sync::Arc;

/// A pass-through filter over records.
///
/// mondoc does not translate queries into a DSL. Filtering is done
/// with host-language predicates handed through to the store, in the
/// same spirit as iterator-adapter filtering:
///
/// ```
/// use mondoc_record::Value;
/// use mondoc_store::Filter;
///
/// let adults = Filter::new(|record| {
///     record.get("age").and_then(Value::as_int).unwrap_or(0) >= 18
/// });
/// ```
#[derive(Clone, Default)]
pub struct Filter {
    predicate: Option<Arc<dyn Fn(&Record) -> bool + Send + Sync>>,
}

impl Filter {
    /// Creates a filter matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter from a predicate.
    pub fn new(predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Returns true if the record matches the filter.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(record),
            None => true,
        }
    }

    /// Returns true if this filter matches every record.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.predicate.is_none()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            f.write_str("Filter::all")
        } else {
            f.write_str("Filter::predicate")
        }
    }
}
