use thiserror::Error;

/// Failure inside the ballot store. Storage failures propagate to the caller
/// as-is; no retry is performed at this layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON column (aspect scores, abstained candidates) failed to decode.
    #[error("corrupt stored value: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("corrupt stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Request-surface failure taxonomy. Validation failures are raised before
/// any store access; store failures propagate from below.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VoteError {
    pub fn validation(message: impl Into<String>) -> Self {
        VoteError::Validation(message.into())
    }
}
