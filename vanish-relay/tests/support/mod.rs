//! Shared fixtures for relay integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vanish_relay::{ChatSession, DeliveryChannel, RelayHub, VanishConfig};
use vanish_store::{EnvelopeStore, EphemeralStore, PutOutcome, StoreError, StoreResult};
use vanish_types::{Identity, MessageEnvelope};
use vanish_vault::{KeyVault, MemoryDirectory, MemorySecretStore};

pub fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

/// Config with fast retries so failure paths finish quickly.
pub fn test_config() -> VanishConfig {
    VanishConfig {
        retry_base_delay_ms: 5,
        sweep_interval_ms: 50,
        ..VanishConfig::default()
    }
}

/// Store wrapper whose first `failures` puts and history reads fail with a
/// transient error.
pub struct FlakyStore {
    inner: EphemeralStore,
    remaining_failures: AtomicU32,
    pub attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: EphemeralStore::open_in_memory().unwrap(),
            remaining_failures: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    fn maybe_fail(&self) -> StoreResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(StoreError::Unavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }
}

impl EnvelopeStore for FlakyStore {
    fn put_as_of(&self, envelope: &MessageEnvelope, now: DateTime<Utc>) -> StoreResult<PutOutcome> {
        self.maybe_fail()?;
        self.inner.put_as_of(envelope, now)
    }

    fn history_as_of(
        &self,
        a: &Identity,
        b: &Identity,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<MessageEnvelope>> {
        self.maybe_fail()?;
        self.inner.history_as_of(a, b, now)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.inner.purge_expired(now)
    }

    fn len(&self) -> StoreResult<usize> {
        self.inner.len()
    }
}

/// One relay, one directory, any number of client sessions.
pub struct Harness {
    pub config: VanishConfig,
    pub store: Arc<dyn EnvelopeStore>,
    pub hub: Arc<RelayHub>,
    pub directory: Arc<MemoryDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(EphemeralStore::open_in_memory().unwrap()), test_config())
    }

    pub fn with_config(config: VanishConfig) -> Self {
        Self::with_store(Arc::new(EphemeralStore::open_in_memory().unwrap()), config)
    }

    pub fn with_store(store: Arc<dyn EnvelopeStore>, config: VanishConfig) -> Self {
        let hub = Arc::new(RelayHub::new(store.clone(), &config));
        Self {
            config,
            store,
            hub,
            directory: Arc::new(MemoryDirectory::new()),
        }
    }

    pub fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::new(self.hub.clone(), &self.config)
    }

    /// A session on its own device (own secret store).
    pub fn session(&self, name: &str) -> ChatSession {
        let vault = Arc::new(KeyVault::new(
            Arc::new(MemorySecretStore::new()),
            self.directory.clone(),
        ));
        ChatSession::new(
            id(name),
            vault,
            self.directory.clone(),
            self.channel(),
            &self.config,
        )
    }

    pub async fn started_session(&self, name: &str) -> ChatSession {
        let session = self.session(name);
        session.start().await.unwrap();
        session
    }
}

/// Polls `cond` every 10 ms for up to two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
