//! Shared error taxonomy for the ingestion and retrieval pipeline.

use thiserror::Error;

/// Errors surfaced by the document pipeline and its collaborators.
///
/// The taxonomy is deliberately closed so callers can branch on the failure
/// kind instead of string-matching: extraction failures need a new file,
/// configuration failures are caller bugs, embedding and store failures may
/// be retried when [`RagError::is_retryable`] says so.
#[derive(Debug, Error)]
pub enum RagError {
    /// The source document could not be read or decoded.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Invalid chunking or provider parameters supplied by the caller.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The embedding provider rejected or failed a request.
    #[error("embedding failed: {message}")]
    Embedding { message: String, retryable: bool },

    /// Provisioning, upsert, query, or delete failed against the vector
    /// backend or the document store.
    #[error("store error: {0}")]
    Store(String),

    /// The requested document does not exist for the requesting user.
    #[error("document {document_id} not found for user {user_id}")]
    NotFound {
        user_id: String,
        document_id: String,
    },

    /// Filesystem failure while reading a source document.
    #[error("io error: {0}")]
    Io(String),
}

impl RagError {
    /// A transient embedding failure: rate limiting, timeouts, upstream 5xx.
    pub fn embedding_transient(message: impl Into<String>) -> Self {
        RagError::Embedding {
            message: message.into(),
            retryable: true,
        }
    }

    /// A permanent embedding failure: malformed input, auth, bad request.
    pub fn embedding_permanent(message: impl Into<String>) -> Self {
        RagError::Embedding {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Embedding { retryable, .. } => *retryable,
            RagError::Store(_) => true,
            RagError::Extraction(_)
            | RagError::Configuration(_)
            | RagError::NotFound { .. }
            | RagError::Io(_) => false,
        }
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}
