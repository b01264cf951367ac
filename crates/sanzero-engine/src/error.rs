use sanzero_ai::EmbedError;
use sanzero_core::{ConfigError, FailureKind, InvalidQuery, RequestId};
use sanzero_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("embedder dimension {embedder} does not match index dimension {index}")]
    DimensionMismatch { embedder: usize, index: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] InvalidQuery),

    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("engine is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why one analysis did not complete. `message` is internal detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct AnalysisFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AnalysisFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
