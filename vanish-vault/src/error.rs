use crate::directory::DirectoryError;
use thiserror::Error;
use vanish_crypto::CryptoError;
use vanish_types::Identity;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The random source or key primitive failed. Nothing can be sent or
    /// read without a key, so this is fatal for the session.
    #[error("identity key generation failed")]
    KeyGeneration(#[source] CryptoError),

    /// No private key on this device. Recover by provisioning a new one.
    #[error("no local private key for {0}")]
    NoLocalKey(Identity),

    #[error("stored private key is corrupt: {0}")]
    CorruptKey(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl VaultError {
    /// True when the caller should fall back to provisioning a fresh keypair.
    pub fn needs_provisioning(&self) -> bool {
        matches!(self, VaultError::NoLocalKey(_))
    }
}

impl From<duckdb::Error> for VaultError {
    fn from(e: duckdb::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}
