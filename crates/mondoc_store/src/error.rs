//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when issuing store commands.
///
/// Per-document write failures are *not* errors; they are reported in
/// [`crate::WriteResponse::write_errors`]. A `StoreError` means the
/// command as a whole produced no usable response.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The command failed at the store level.
    #[error("command failed: {message}")]
    Command {
        /// Description of the failure.
        message: String,
    },

    /// The store is not reachable.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a command failure error.
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = StoreError::command("boom");
        assert_eq!(err.to_string(), "command failed: boom");

        let err = StoreError::unavailable("down");
        assert_eq!(err.to_string(), "store unavailable: down");
    }
}
