use crate::store::record::RequestId;

/// Errors that can occur during audit store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A response was already recorded for this request.
    #[error("request {0} already has a recorded response")]
    DuplicateResponse(RequestId),

    /// The referenced request does not exist (never stored, or deleted).
    #[error("request {0} does not exist")]
    UnknownRequest(RequestId),

    /// An error from the underlying storage backend.
    #[error("storage error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
