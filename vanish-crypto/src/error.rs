//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from key generation, sealing and opening.
///
/// None of these are transient: retrying with the same inputs gives the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Unwrap and authentication failures share this variant so callers
    /// cannot tell which step rejected the input.
    #[error("cannot decrypt message")]
    Decryption,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
