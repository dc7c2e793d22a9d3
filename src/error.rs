use thiserror::Error;

/// Errors raised by the memory engine
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("dimension mismatch: expected {expected}, found {found}")]
    Dimension { expected: usize, found: usize },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid episode: {0}")]
    InvalidEpisode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
