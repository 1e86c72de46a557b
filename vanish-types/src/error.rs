use thiserror::Error;

/// Result type for data model validation.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Errors raised while building or decoding model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("envelope lifetime must be positive (expires_at > created_at)")]
    InvalidLifetime,

    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonce { expected: usize, actual: usize },

    #[error("invalid field encoding: {0}")]
    Encoding(String),
}
