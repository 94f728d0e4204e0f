//! Typed errors for conditions callers must tell apart.
//!
//! Pipeline plumbing uses [`anyhow::Result`]; the variants here are
//! attached to those errors so that the HTTP layer can recover them with
//! `downcast_ref` and map them to client-facing status codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed request shape: empty query, limit out of range, no snippets.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("agent {0} not found")]
    UnknownAgent(String),

    #[error("index {0} not found")]
    IndexNotFound(String),

    /// An embedder other than the one the index was built with.
    #[error("embedding model mismatch: index {index} was built with {indexed}, got {query}")]
    ModelMismatch {
        index: String,
        indexed: String,
        query: String,
    },

    #[error("dimension mismatch for index {index}: expected {expected}, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    /// The embedder returned a batch that does not line up with its input.
    #[error("embedding batch returned {actual} vectors for {expected} inputs")]
    EmbeddingCount { expected: usize, actual: usize },
}

impl RagError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RagError::InvalidInput(message.into())
    }
}

/// Returns the [`RagError`] carried by an `anyhow` chain, if any.
pub fn classify(err: &anyhow::Error) -> Option<&RagError> {
    err.chain().find_map(|cause| cause.downcast_ref::<RagError>())
}
