//! Relay and session error types.

use thiserror::Error;
use vanish_crypto::CryptoError;
use vanish_store::StoreError;
use vanish_types::{EnvelopeError, Identity};
use vanish_vault::{DirectoryError, VaultError};

/// Result type for delivery and session operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The receiver has never published a public key.
    #[error("recipient unknown: {0}")]
    RecipientUnknown(Identity),

    #[error("transport error: {0}")]
    Transport(String),

    /// The relay refused the envelope; resending it unchanged cannot succeed.
    #[error("envelope rejected by relay: {0}")]
    Rejected(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("key vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether retrying the same call later may succeed. Cryptographic
    /// failures never are.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Transport(_) => true,
            RelayError::Store(e) => e.is_transient(),
            RelayError::Directory(e) => e.is_transient(),
            RelayError::Vault(VaultError::Directory(e)) => e.is_transient(),
            _ => false,
        }
    }
}
