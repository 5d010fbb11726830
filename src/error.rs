//! Error types for agora operations.

use thiserror::Error;

/// Result type alias for agora operations.
pub type Result<T> = std::result::Result<T, AgoraError>;

/// Main error type for agora operations.
///
/// Every failure is local to one operation or one query; there is no
/// fatal error class. Batch-level errors (`Validation`, `NotFound`) mean
/// the batch had no effect at all.
#[derive(Error, Debug)]
pub enum AgoraError {
    /// A batch violates an entity or link invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation references an identifier absent from the graph.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Sync transport failure. Surfaced, never retried by this core.
    #[error("Sync error: {0}")]
    Sync(String),

    /// Deterministic-encoding failure while hashing content.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AgoraError {
    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new sync error.
    pub fn sync<T: ToString>(msg: T) -> Self {
        Self::Sync(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgoraError::validation("bad batch");
        assert_eq!(err.to_string(), "Validation error: bad batch");

        let err = AgoraError::not_found("post abc123");
        assert_eq!(err.to_string(), "Not found: post abc123");
    }
}
