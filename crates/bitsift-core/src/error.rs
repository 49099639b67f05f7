//! Error types for bitsift-core.
//!
//! This module defines the error types used across the core library:
//! codec validation, chunking, embedding and other collaborator calls,
//! document storage, vector search, ingestion and configuration.

use thiserror::Error;

/// Errors raised by the quantization codec.
///
/// Always fatal to the single call that produced them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// Input has the wrong shape or contains values the codec cannot encode
    #[error("Invalid codec input: {0}")]
    InvalidInput(String),
    /// Transport text is not valid base64
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// Errors that can occur while calling an embedding model.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Remote endpoint or model call failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    /// Collaborator returned a response with an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Collaborator is not configured or unreachable
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

impl From<String> for EmbeddingError {
    fn from(s: String) -> Self {
        EmbeddingError::InferenceFailed(s)
    }
}

/// Errors raised by the generator, the query rewriter and the crawler.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Endpoint or source could not be reached
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    /// Endpoint answered with a failure status
    #[error("Request failed: {0}")]
    RequestFailed(String),
    /// Reply had an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Embedding fetched content failed
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl From<CollaboratorError> for EmbeddingError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Unavailable(msg) => EmbeddingError::Unavailable(msg),
            CollaboratorError::RequestFailed(msg) => EmbeddingError::InferenceFailed(msg),
            CollaboratorError::MalformedResponse(msg) => EmbeddingError::MalformedResponse(msg),
            CollaboratorError::Embedding(e) => e,
        }
    }
}

/// Errors that can occur during semantic chunking.
#[derive(Debug, Clone, Error)]
pub enum ChunkingError {
    /// Invalid chunking configuration
    #[error("Invalid chunking config: {0}")]
    InvalidConfig(String),
    /// Embedding the paragraph windows failed
    #[error("Embedding failed during chunking: {0}")]
    Embedding(#[from] EmbeddingError),
    /// The embedder returned a different number of vectors than windows
    #[error("Embedder returned {actual} vectors for {expected} windows")]
    BatchSizeMismatch {
        /// Number of windows sent
        expected: usize,
        /// Number of vectors received
        actual: usize,
    },
}

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    IoError(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Document id cannot be used as a file name
    #[error("Invalid document id: {0}")]
    InvalidId(String),
    /// In-memory lock poisoned
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

/// Error types for vector space operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    /// Vector dimension mismatch (expected vs actual)
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the space was configured with
        expected: usize,
        /// Dimension of the vector received
        actual: usize,
    },
    /// Query or point has the wrong element type for this space
    #[error("Dtype mismatch for {space}: expected {expected}")]
    DtypeMismatch {
        /// Space name
        space: String,
        /// Expected dtype name
        expected: &'static str,
    },
    /// Space could not be loaded from its backing store
    #[error("Index error: {0}")]
    IndexError(String),
    /// Vector decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Configuration errors. Fatal at process start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Space name is not one of the three fixed spaces
    #[error("Unknown vector space: {0} (expected text, metadata or image)")]
    UnknownSpace(String),
    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors raised while converting a source file into a raw document.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// File extension is not supported by this converter
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// Failed to read file
    #[error("Failed to read file: {0}")]
    FileRead(String),
    /// Chunking the file text failed
    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding a chunk or the metadata record failed
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Quantizing an embedding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// Persisting the document failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    /// Registering a point failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
    /// Crawler could not deliver documents
    #[error("Live acquisition failed: {0}")]
    Acquisition(String),
    /// Source conversion failed
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    /// A collaborator the operation needs was not supplied
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

/// Errors that abort a retrieval or cascade run.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Query embedding failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Sufficiency check, generation or rewriting failed
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
    /// Vector space search failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
    /// Quantizing the query failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    /// Document store failed for a reason other than a missing document
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that prevent the engine from starting.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Document store could not be opened
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    /// A vector space could not be built
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
    /// Chunker parameters rejected
    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),
}
