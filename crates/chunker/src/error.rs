use std::path::PathBuf;
use thiserror::Error;

/// Result type for chunk discovery and splitting
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur while reading or producing evidence chunks
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Chunk file referenced by a plan no longer exists
    #[error("Missing coverage artifact: {}", .0.display())]
    MissingCoverageArtifact(PathBuf),

    /// Root directory is absent or not a directory
    #[error("Invalid chunk directory: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Tokenizer could not be loaded
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Chunk file is not valid JSON of the expected shape
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ChunkerError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
