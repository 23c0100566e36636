//! Error types for the processing engine.

use deltafold_protocol::PayloadError;
use thiserror::Error;

/// Result type for a single fold.
pub type FoldResult<T> = Result<T, FoldError>;

/// A delta could not be folded. The prior state is kept.
#[derive(Debug, Error)]
pub enum FoldError {
    /// Recognized tag, malformed payload.
    #[error("malformed payload: {0}")]
    Payload(#[from] PayloadError),

    /// A kind plugin refused the delta.
    #[error("{kind} plugin rejected {tag}: {reason}")]
    Plugin {
        kind: String,
        tag: String,
        reason: String,
    },
}

/// Errors raised while building the kind registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two plugins claimed the same kind tag.
    #[error("kind already registered: {0}")]
    DuplicateKind(String),

    /// A visibility band whose bounds are inverted or empty.
    #[error("invalid visibility band for {kind}: [{lower}, {upper})")]
    InvalidBand {
        kind: String,
        lower: usize,
        upper: usize,
    },
}

/// Result type for document persistence.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors from a document store.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the document.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Document ID cannot be turned into a storage key.
    #[error("invalid document id: {0:?}")]
    InvalidId(String),

    /// Store backend error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for the JSONL feed driver.
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors that stop the feed driver.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Reading the input failed.
    #[error("reading delta stream: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::DuplicateKind("text".to_string());
        assert_eq!(err.to_string(), "kind already registered: text");

        let err = PersistError::InvalidId("../x".to_string());
        assert_eq!(err.to_string(), "invalid document id: \"../x\"");

        let err = FoldError::Payload(PayloadError::WrongShape {
            tag: "title".to_string(),
            expected: "string",
        });
        assert_eq!(
            err.to_string(),
            "malformed payload: title: expected string payload"
        );
    }
}
