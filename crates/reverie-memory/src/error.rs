//! Memory system error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("corrupt affective state: {0}")]
    CorruptState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MemoryResult<T> = Result<T, MemoryError>;
