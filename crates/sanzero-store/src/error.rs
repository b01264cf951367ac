use sanzero_core::{RequestId, TransitionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("parquet file not found: {0}")]
    ParquetNotFound(std::path::PathBuf),

    #[error("duplicate case number: {0}")]
    DuplicateKey(String),

    #[error("precedent not found: {0}")]
    PrecedentNotFound(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding for {0} has zero norm or non-finite values")]
    InvalidEmbedding(String),

    #[error("quality score for {0} must be a finite value in [0, 1]")]
    InvalidQuality(String),

    #[error("duplicate exact-match key: {0}")]
    DuplicateExactKey(String),

    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("request already exists: {0}")]
    RequestExists(RequestId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
