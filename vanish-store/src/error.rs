use thiserror::Error;
use vanish_types::EnvelopeError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The database could not be reached or the statement failed. Retry
    /// with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row no longer forms a valid envelope.
    #[error("corrupt envelope row: {0}")]
    Corrupt(String),

    #[error("expiry sweeper is not running")]
    Stopped,
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<EnvelopeError> for StoreError {
    fn from(e: EnvelopeError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}
