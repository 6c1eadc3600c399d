use faultrank_chunker::ChunkerError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankerError>;

#[derive(Error, Debug)]
pub enum RankerError {
    /// Rendered prompt is larger than the input ceiling
    #[error("Input token size exceeded: {tokens} tokens > ceiling {ceiling}")]
    BudgetExceeded { tokens: usize, ceiling: usize },

    /// Model call or its response stream failed
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Missing coverage artifact: {0}")]
    MissingCoverageArtifact(PathBuf),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Chunk error: {0}")]
    Chunker(ChunkerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RankerError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<ChunkerError> for RankerError {
    fn from(err: ChunkerError) -> Self {
        match err {
            ChunkerError::MissingCoverageArtifact(path) => Self::MissingCoverageArtifact(path),
            ChunkerError::Tokenizer(msg) => Self::Tokenizer(msg),
            ChunkerError::IoError(err) => Self::IoError(err),
            ChunkerError::SerializationError(err) => Self::SerializationError(err),
            other => Self::Chunker(other),
        }
    }
}

impl From<reqwest::Error> for RankerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
