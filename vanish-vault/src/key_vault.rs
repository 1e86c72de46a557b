//! Identity key custody: local private keys, published public keys.

use crate::directory::Directory;
use crate::error::{VaultError, VaultResult};
use crate::secret_store::SecretStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vanish_crypto::{IdentityKeyPair, RecipientKey};
use vanish_types::Identity;

/// Owns identity keypairs on this device and keeps the directory in step.
///
/// Provisioning is serialised so two concurrent `ensure_key_pair` calls for
/// the same identity never produce two keypairs.
pub struct KeyVault {
    secrets: Arc<dyn SecretStore>,
    directory: Arc<dyn Directory>,
    provisioning: Mutex<()>,
}

impl KeyVault {
    pub fn new(secrets: Arc<dyn SecretStore>, directory: Arc<dyn Directory>) -> Self {
        Self {
            secrets,
            directory,
            provisioning: Mutex::new(()),
        }
    }

    /// Returns the local keypair for `identity`, creating and publishing one
    /// if none exists.
    ///
    /// The private key is persisted before the public key is published, so a
    /// failed publish never strands an unknown private key. On
    /// `VaultError::Directory` the keypair exists locally and
    /// [`publish_public_key`](Self::publish_public_key) can be retried.
    pub async fn ensure_key_pair(&self, identity: &Identity) -> VaultResult<IdentityKeyPair> {
        let _guard = self.provisioning.lock().await;

        if let Some(existing) = self.load_local(identity).await? {
            debug!(%identity, "identity keypair already provisioned");
            return Ok(existing);
        }

        let keypair = IdentityKeyPair::generate().map_err(VaultError::KeyGeneration)?;
        self.save_local(identity, &keypair).await?;
        info!(%identity, public_key = ?keypair.public_key(), "generated identity keypair");

        self.publish(identity, keypair.public_key()).await?;
        Ok(keypair)
    }

    /// Re-publishes the local public key, e.g. after a failed first publish.
    pub async fn publish_public_key(&self, identity: &Identity) -> VaultResult<()> {
        let keypair = self.private_key_of(identity).await?;
        self.publish(identity, keypair.public_key()).await
    }

    /// The local keypair, or `NoLocalKey` if this device has none.
    pub async fn private_key_of(&self, identity: &Identity) -> VaultResult<IdentityKeyPair> {
        self.load_local(identity)
            .await?
            .ok_or_else(|| VaultError::NoLocalKey(identity.clone()))
    }

    pub async fn public_key_of(&self, identity: &Identity) -> VaultResult<RecipientKey> {
        Ok(*self.private_key_of(identity).await?.public_key())
    }

    async fn publish(&self, identity: &Identity, public_key: &RecipientKey) -> VaultResult<()> {
        self.directory
            .set_public_key(identity, &public_key.to_spki_der())
            .await
            .map_err(|e| {
                warn!(%identity, error = %e, "failed to publish public key");
                VaultError::Directory(e)
            })
    }

    async fn load_local(&self, identity: &Identity) -> VaultResult<Option<IdentityKeyPair>> {
        let secrets = Arc::clone(&self.secrets);
        let owner = identity.clone();
        let stored = tokio::task::spawn_blocking(move || secrets.load(&owner))
            .await
            .map_err(|e| VaultError::Storage(format!("key load task failed: {e}")))??;

        match stored {
            Some(bytes) => IdentityKeyPair::from_secret_slice(&bytes)
                .map(Some)
                .map_err(|e| VaultError::CorruptKey(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save_local(&self, identity: &Identity, keypair: &IdentityKeyPair) -> VaultResult<()> {
        let secrets = Arc::clone(&self.secrets);
        let owner = identity.clone();
        let secret = keypair.secret_bytes();
        tokio::task::spawn_blocking(move || secrets.save(&owner, secret.as_slice()))
            .await
            .map_err(|e| VaultError::Storage(format!("key save task failed: {e}")))?
    }
}
