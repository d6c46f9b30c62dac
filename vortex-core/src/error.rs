//! Error types for the Vortex core engine.

use thiserror::Error;

/// Result type alias using Vortex's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown collection, group, or record id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name where uniqueness is enforced.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Embedding length disagrees with the collection's dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Empty name, k <= 0, malformed filter, zero-magnitude embedding, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Query forbids staleness and disallows fallback, but the index is stale.
    #[error("index is stale for this collection")]
    IndexStale,

    /// No index is installed and fallback is disabled.
    #[error("no index available for this collection")]
    IndexUnavailable,

    /// Operation was cancelled via a cooperative cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation exceeded its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invariant violation - a bug, not a user error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            got: 512,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 512");
    }
}
