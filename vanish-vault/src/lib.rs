//! Identity key custody for Vanish.
//!
//! [`KeyVault`] generates each identity's X25519 keypair once, keeps the
//! private half in a device-local [`SecretStore`], and publishes the public
//! half to a [`Directory`].

mod directory;
mod error;
mod key_vault;
mod secret_store;

pub use directory::{Directory, DirectoryError, DirectoryResult, MemoryDirectory};
pub use error::{VaultError, VaultResult};
pub use key_vault::KeyVault;
pub use secret_store::{DuckDbSecretStore, MemorySecretStore, SecretStore};
