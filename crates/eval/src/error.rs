use std::path::PathBuf;
use thiserror::Error;

/// Result type for scoring
pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    /// No `<bug>.txt` ground-truth file
    #[error("Missing ground truth: {}", .0.display())]
    MissingGroundTruth(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
