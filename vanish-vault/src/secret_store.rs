//! Device-local custody of identity private keys.
//!
//! Private keys never leave this store except through [`crate::KeyVault`].

use crate::error::{VaultError, VaultResult};
use chrono::Utc;
use duckdb::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use vanish_types::Identity;
use zeroize::Zeroizing;

/// Storage for raw private key bytes, keyed by identity.
///
/// Implementations are synchronous; [`crate::KeyVault`] calls them from a
/// blocking task.
pub trait SecretStore: Send + Sync + 'static {
    fn load(&self, identity: &Identity) -> VaultResult<Option<Zeroizing<Vec<u8>>>>;

    /// Stores a key, replacing any existing one for the identity.
    fn save(&self, identity: &Identity, secret: &[u8]) -> VaultResult<()>;

    /// Returns true if a key was removed.
    fn remove(&self, identity: &Identity) -> VaultResult<bool>;
}

/// DuckDB-backed secret store (table `identity_keys`).
pub struct DuckDbSecretStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbSecretStore {
    pub fn open(db_path: &Path) -> VaultResult<Self> {
        let conn = Connection::open(db_path)?;
        // Cap memory/threads. DuckDB defaults to ~80% RAM per connection.
        conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;
        Self::with_connection(Arc::new(Mutex::new(conn)))
    }

    pub fn open_in_memory() -> VaultResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(Arc::new(Mutex::new(conn)))
    }

    /// Uses a connection shared with other tables in the same database.
    pub fn with_connection(conn: Arc<Mutex<Connection>>) -> VaultResult<Self> {
        let store = Self { conn };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> VaultResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identity_keys (
                identity VARCHAR PRIMARY KEY,
                secret BLOB NOT NULL,
                created_at BIGINT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| VaultError::Storage(e.to_string()))
    }
}

impl SecretStore for DuckDbSecretStore {
    fn load(&self, identity: &Identity) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT secret FROM identity_keys WHERE identity = ?",
            params![identity.as_str()],
            |row| row.get::<_, Vec<u8>>(0),
        );
        match result {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, identity: &Identity, secret: &[u8]) -> VaultResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO identity_keys (identity, secret, created_at) VALUES (?, ?, ?)",
            params![identity.as_str(), secret.to_vec(), Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> VaultResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM identity_keys WHERE identity = ?",
            params![identity.as_str()],
        )?;
        Ok(affected > 0)
    }
}

/// In-memory secret store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySecretStore {
    keys: RwLock<HashMap<Identity, Zeroizing<Vec<u8>>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn load(&self, identity: &Identity) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
        let keys = self
            .keys
            .read()
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(keys.get(identity).cloned())
    }

    fn save(&self, identity: &Identity, secret: &[u8]) -> VaultResult<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        keys.insert(identity.clone(), Zeroizing::new(secret.to_vec()));
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> VaultResult<bool> {
        let mut keys = self
            .keys
            .write()
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(keys.remove(identity).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn exercise(store: &dyn SecretStore) {
        assert!(store.load(&id("alice")).unwrap().is_none());

        store.save(&id("alice"), &[7u8; 32]).unwrap();
        assert_eq!(store.load(&id("alice")).unwrap().unwrap().as_slice(), &[7u8; 32]);

        store.save(&id("alice"), &[9u8; 32]).unwrap();
        assert_eq!(store.load(&id("alice")).unwrap().unwrap().as_slice(), &[9u8; 32]);

        assert!(store.load(&id("bob")).unwrap().is_none());
        assert!(store.remove(&id("alice")).unwrap());
        assert!(!store.remove(&id("alice")).unwrap());
        assert!(store.load(&id("alice")).unwrap().is_none());
    }

    #[test]
    fn duckdb_store_load_save_remove() {
        exercise(&DuckDbSecretStore::open_in_memory().unwrap());
    }

    #[test]
    fn memory_store_load_save_remove() {
        exercise(&MemorySecretStore::new());
    }
}
