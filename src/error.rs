//! Error types for vicinage.

use thiserror::Error;

/// Errors that can occur while building, partitioning or maintaining a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Invalid parameter value, rejected at configuration time.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A similarity function is required but none was configured.
    #[error("similarity is not defined")]
    SimilarityUndefined,

    /// I/O error while reading or writing a persisted graph.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while reading or writing a persisted graph.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for vicinage operations.
pub type Result<T> = std::result::Result<T, GraphError>;
