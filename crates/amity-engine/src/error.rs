use thiserror::Error;

/// Failure of an engine operation, tagged by recovery policy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced user or character does not exist. Never retried internally.
    #[error("not found: {0}")]
    NotFound(String),

    /// The completion service failed. For a turn, the user's message is
    /// already saved but no reply was recorded and the counter did not move.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Malformed input, rejected before anything was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable tag reported to callers in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream_failure",
            Self::Validation(_) => "validation_error",
            Self::Store(_) => "internal",
        }
    }

    pub fn character_not_found(id: i64) -> Self {
        Self::NotFound(format!("character {} not found", id))
    }

    pub fn user_not_found(id: i64) -> Self {
        Self::NotFound(format!("user {} not found", id))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
