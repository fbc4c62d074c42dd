//! Error types for the `papyrus` crate.

use thiserror::Error;

/// Errors that can occur in pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A request was rejected before any side effect took place.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// An error occurred in the file storage backend.
    #[error("Storage error ({provider}): {message}")]
    StorageError {
        /// The storage provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while parsing an uploaded document.
    #[error("Parsing error ({provider}): {message}")]
    ParsingError {
        /// The parsing provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the user/document metadata store.
    #[error("User store error: {0}")]
    UserStoreError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
