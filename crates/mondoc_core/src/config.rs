//! Context configuration.

use crate::error::{MondocError, MondocResult};
use std::time::Duration;

/// Environment key for the minimum inter-cleanup spacing, in
/// milliseconds.
pub const CLEANUP_LOWER_BOUND_KEY: &str = "CacheCleanUpLowerBound";

/// Environment key for the maximum sleep between cleaner polls, in
/// milliseconds.
pub const CLEANUP_UPPER_BOUND_KEY: &str = "CacheCleanUpUpperBound";

/// Environment key for the document store connection string.
pub const CONNECTION_STRING_KEY: &str = "DocumentStoreConnection";

/// Configuration for a repository context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Minimum time between two cache cleanups.
    pub cleanup_lower_bound: Duration,

    /// Maximum sleep between cache-cleaner polls. Even without
    /// reclamation signals, a best-effort cleanup runs at this cadence.
    pub cleanup_upper_bound: Duration,

    /// Share of the cache's total capacity a partial cleanup may
    /// remove, in percent.
    pub partial_cleanup_percent: u32,

    /// Connection string for the document store, if configured.
    pub connection_string: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cleanup_lower_bound: Duration::from_millis(10_000),
            cleanup_upper_bound: Duration::from_millis(60_000),
            partial_cleanup_percent: 10,
            connection_string: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the process environment.
    ///
    /// Reads [`CLEANUP_LOWER_BOUND_KEY`], [`CLEANUP_UPPER_BOUND_KEY`]
    /// (integers, milliseconds) and [`CONNECTION_STRING_KEY`]. Keys
    /// that are absent or unparsable keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = read_millis(CLEANUP_LOWER_BOUND_KEY) {
            config.cleanup_lower_bound = ms;
        }
        if let Some(ms) = read_millis(CLEANUP_UPPER_BOUND_KEY) {
            config.cleanup_upper_bound = ms;
        }
        if let Ok(conn) = std::env::var(CONNECTION_STRING_KEY) {
            if !conn.is_empty() {
                config.connection_string = Some(conn);
            }
        }
        config
    }

    /// Sets the minimum inter-cleanup spacing.
    #[must_use]
    pub fn with_cleanup_lower_bound(mut self, bound: Duration) -> Self {
        self.cleanup_lower_bound = bound;
        self
    }

    /// Sets the maximum sleep between cleaner polls.
    #[must_use]
    pub fn with_cleanup_upper_bound(mut self, bound: Duration) -> Self {
        self.cleanup_upper_bound = bound;
        self
    }

    /// Sets the partial-cleanup share of cache capacity, in percent.
    #[must_use]
    pub fn with_partial_cleanup_percent(mut self, percent: u32) -> Self {
        self.partial_cleanup_percent = percent;
        self
    }

    /// Sets the connection string.
    #[must_use]
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an argument error if the lower cleanup bound exceeds
    /// the upper bound, or the partial-cleanup share exceeds 100%.
    pub fn validate(&self) -> MondocResult<()> {
        if self.cleanup_lower_bound > self.cleanup_upper_bound {
            return Err(MondocError::argument(format!(
                "cleanup lower bound {:?} exceeds upper bound {:?}",
                self.cleanup_lower_bound, self.cleanup_upper_bound
            )));
        }
        if self.partial_cleanup_percent > 100 {
            return Err(MondocError::argument(format!(
                "partial cleanup percent {} exceeds 100",
                self.partial_cleanup_percent
            )));
        }
        Ok(())
    }
}

fn read_millis(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
