//! DuckDB-backed envelope store with read-time expiry.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};
use vanish_types::{ConversationKey, Identity, MessageEnvelope, SealedPayload, NONCE_LEN};

/// Result of a [`EnvelopeStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// An envelope with the same id is already stored.
    Duplicate,
    /// The deadline had already passed; nothing was written.
    AlreadyExpired,
}

/// Storage seam used by the relay.
///
/// Implementations are synchronous. Async callers go through
/// `spawn_blocking`.
pub trait EnvelopeStore: Send + Sync + 'static {
    fn put_as_of(&self, envelope: &MessageEnvelope, now: DateTime<Utc>)
        -> StoreResult<PutOutcome>;

    /// Envelopes between `a` and `b` (either direction) with
    /// `expires_at > now`, ascending by `created_at`, ties by id.
    fn history_as_of(
        &self,
        a: &Identity,
        b: &Identity,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<MessageEnvelope>>;

    /// Deletes every envelope with `expires_at <= now`. Returns the number removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    /// Rows currently on disk, including expired rows not yet purged.
    fn len(&self) -> StoreResult<usize>;

    fn put(&self, envelope: &MessageEnvelope) -> StoreResult<PutOutcome> {
        self.put_as_of(envelope, Utc::now())
    }

    fn history(&self, a: &Identity, b: &Identity) -> StoreResult<Vec<MessageEnvelope>> {
        self.history_as_of(a, b, Utc::now())
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Envelope store on a single DuckDB table, `envelopes`.
///
/// Rows are keyed by [`vanish_types::EnvelopeId`], so a re-sent envelope is
/// stored once.
#[derive(Clone)]
pub struct EphemeralStore {
    conn: Arc<Mutex<Connection>>,
}

impl EphemeralStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = crate::open_connection(path)?;
        initialize_envelope_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_envelope_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))
    }
}

impl EnvelopeStore for EphemeralStore {
    fn put_as_of(
        &self,
        envelope: &MessageEnvelope,
        now: DateTime<Utc>,
    ) -> StoreResult<PutOutcome> {
        let id = envelope.id();
        if envelope.is_expired_at(now) {
            debug!(envelope = ?id, "refusing to store expired envelope");
            return Ok(PutOutcome::AlreadyExpired);
        }

        let conn = self.lock()?;
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM envelopes WHERE id = ?",
            params![id.to_hex()],
            |row| row.get(0),
        )?;
        if existing > 0 {
            trace!(envelope = ?id, "duplicate envelope ignored");
            return Ok(PutOutcome::Duplicate);
        }

        conn.execute(
            r#"
            INSERT OR IGNORE INTO envelopes (
                id, conversation, sender, receiver,
                ciphertext, wrapped_key, nonce,
                created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id.to_hex(),
                envelope.conversation().storage_key(),
                envelope.sender().as_str(),
                envelope.receiver().as_str(),
                envelope.ciphertext().to_vec(),
                envelope.wrapped_key().to_vec(),
                envelope.nonce().to_vec(),
                envelope.created_at().timestamp_millis(),
                envelope.expires_at().timestamp_millis(),
            ],
        )?;
        debug!(
            envelope = ?id,
            sender = %envelope.sender(),
            receiver = %envelope.receiver(),
            expires_at = %envelope.expires_at(),
            "envelope stored"
        );
        Ok(PutOutcome::Stored)
    }

    fn history_as_of(
        &self,
        a: &Identity,
        b: &Identity,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<MessageEnvelope>> {
        let conversation = ConversationKey::new(a.clone(), b.clone());
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT sender, receiver, ciphertext, wrapped_key, nonce, created_at, expires_at \
             FROM envelopes WHERE conversation = ? AND expires_at > ? \
             ORDER BY created_at, id",
        )?;

        let rows = stmt
            .query_map(
                params![conversation.storage_key(), now.timestamp_millis()],
                |row| {
                    Ok(EnvelopeRow {
                        sender: row.get(0)?,
                        receiver: row.get(1)?,
                        ciphertext: row.get(2)?,
                        wrapped_key: row.get(3)?,
                        nonce: row.get(4)?,
                        created_at: row.get(5)?,
                        expires_at: row.get(6)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(EnvelopeRow::into_envelope).collect()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM envelopes WHERE expires_at <= ?",
            params![now.timestamp_millis()],
        )?;
        if removed > 0 {
            debug!(removed, "purged expired envelopes");
        }
        Ok(removed)
    }

    fn len(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM envelopes", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

struct EnvelopeRow {
    sender: String,
    receiver: String,
    ciphertext: Vec<u8>,
    wrapped_key: Vec<u8>,
    nonce: Vec<u8>,
    created_at: i64,
    expires_at: i64,
}

impl EnvelopeRow {
    fn into_envelope(self) -> StoreResult<MessageEnvelope> {
        let nonce: [u8; NONCE_LEN] = self.nonce.as_slice().try_into().map_err(|_| {
            StoreError::Corrupt(format!(
                "nonce has {} bytes, expected {NONCE_LEN}",
                self.nonce.len()
            ))
        })?;
        let created_at = millis_to_datetime(self.created_at)?;
        let expires_at = millis_to_datetime(self.expires_at)?;

        Ok(MessageEnvelope::from_parts(
            Identity::new(self.sender)?,
            Identity::new(self.receiver)?,
            SealedPayload {
                ciphertext: self.ciphertext,
                wrapped_key: self.wrapped_key,
                nonce,
            },
            created_at,
            expires_at,
        )?)
    }
}

fn millis_to_datetime(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn initialize_envelope_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS envelopes (
            id VARCHAR PRIMARY KEY,
            conversation VARCHAR NOT NULL,
            sender VARCHAR NOT NULL,
            receiver VARCHAR NOT NULL,
            ciphertext BLOB NOT NULL,
            wrapped_key BLOB NOT NULL,
            nonce BLOB NOT NULL,
            created_at BIGINT NOT NULL,
            expires_at BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_envelopes_conversation ON envelopes(conversation, created_at);
        CREATE INDEX IF NOT EXISTS idx_envelopes_expiry ON envelopes(expires_at);
        "#,
    )?;
    Ok(())
}
