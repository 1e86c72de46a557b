//! Public key directory: identity -> SPKI DER public key.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use vanish_types::Identity;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The identity has never published a key. Surfaced as "recipient unknown".
    #[error("no public key published for {0}")]
    NotFound(Identity),

    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("directory rejected request: {0}")]
    Rejected(String),
}

impl DirectoryError {
    /// Unavailable is worth retrying. The other variants are final answers.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_))
    }
}

/// Read/write access to the shared identity -> public key mapping.
///
/// Keys are opaque bytes here (X25519 SPKI DER). Parsing and validation
/// happen at the point of use.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_public_key(&self, identity: &Identity) -> DirectoryResult<Vec<u8>>;

    /// Publishes (or replaces) the caller's public key.
    async fn set_public_key(&self, identity: &Identity, spki_der: &[u8]) -> DirectoryResult<()>;
}

/// In-process directory.
///
/// `set_offline(true)` makes every call fail with `Unavailable`, for
/// exercising the error paths of callers.
#[derive(Default)]
pub struct MemoryDirectory {
    keys: RwLock<HashMap<Identity, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    fn check_online(&self) -> DirectoryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("directory offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_public_key(&self, identity: &Identity) -> DirectoryResult<Vec<u8>> {
        self.check_online()?;
        self.keys
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(identity.clone()))
    }

    async fn set_public_key(&self, identity: &Identity, spki_der: &[u8]) -> DirectoryResult<()> {
        self.check_online()?;
        if spki_der.is_empty() {
            return Err(DirectoryError::Rejected("empty public key".into()));
        }
        let replaced = self
            .keys
            .write()
            .await
            .insert(identity.clone(), spki_der.to_vec())
            .is_some();
        debug!(%identity, replaced, "public key published");
        Ok(())
    }
}
