//! Message envelopes and their identity.

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::identity::Identity;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of the AEAD nonce carried by every envelope.
pub const NONCE_LEN: usize = 12;

/// Output of hybrid sealing: the only message-derived bytes that ever leave
/// the client.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// AEAD ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// One-time session key wrapped for the receiver's public key.
    pub wrapped_key: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("wrapped_key_len", &self.wrapped_key.len())
            .finish_non_exhaustive()
    }
}

/// One encrypted, self-expiring message between two identities.
///
/// Fields are private: an envelope is immutable once built. Timestamps are
/// kept at millisecond precision, matching what the store persists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    sender: Identity,
    receiver: Identity,
    payload: SealedPayload,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn to_millis_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

impl MessageEnvelope {
    /// Builds an envelope that expires `ttl` after `created_at`.
    pub fn new(
        sender: Identity,
        receiver: Identity,
        payload: SealedPayload,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> EnvelopeResult<Self> {
        if ttl <= Duration::zero() {
            return Err(EnvelopeError::InvalidLifetime);
        }
        let created_at = to_millis_precision(created_at);
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or(EnvelopeError::InvalidLifetime)?;
        Self::from_parts(sender, receiver, payload, created_at, expires_at)
    }

    /// Rebuilds an envelope from stored or received parts, re-checking the
    /// lifetime invariant.
    pub fn from_parts(
        sender: Identity,
        receiver: Identity,
        payload: SealedPayload,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> EnvelopeResult<Self> {
        let created_at = to_millis_precision(created_at);
        let expires_at = to_millis_precision(expires_at);
        if expires_at <= created_at {
            return Err(EnvelopeError::InvalidLifetime);
        }
        Ok(Self {
            sender,
            receiver,
            payload,
            created_at,
            expires_at,
        })
    }

    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    pub fn receiver(&self) -> &Identity {
        &self.receiver
    }

    pub fn payload(&self) -> &SealedPayload {
        &self.payload
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.payload.ciphertext
    }

    pub fn wrapped_key(&self) -> &[u8] {
        &self.payload.wrapped_key
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.payload.nonce
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }

    /// True once `now` has reached the deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The unordered participant pair this envelope belongs to.
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender.clone(), self.receiver.clone())
    }

    /// Content-derived identity, used for deduplication and as storage key.
    pub fn id(&self) -> EnvelopeId {
        let created_ms = self.created_at.timestamp_millis().to_be_bytes();
        let parts: [&[u8]; 6] = [
            self.sender.as_str().as_bytes(),
            self.receiver.as_str().as_bytes(),
            &created_ms,
            &self.payload.ciphertext,
            &self.payload.wrapped_key,
            &self.payload.nonce,
        ];

        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        EnvelopeId(hasher.finalize().into())
    }
}

// ── Wire shape ──

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    sender: Identity,
    receiver: Identity,
    ciphertext: String,
    wrapped_key: String,
    nonce: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn decode_field(name: &str, value: &str) -> EnvelopeResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| EnvelopeError::Encoding(format!("{name}: {e}")))
}

impl TryFrom<WireEnvelope> for MessageEnvelope {
    type Error = EnvelopeError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let nonce_bytes = decode_field("nonce", &wire.nonce)?;
        let nonce: [u8; NONCE_LEN] =
            nonce_bytes
                .as_slice()
                .try_into()
                .map_err(|_| EnvelopeError::InvalidNonce {
                    expected: NONCE_LEN,
                    actual: nonce_bytes.len(),
                })?;

        let payload = SealedPayload {
            ciphertext: decode_field("ciphertext", &wire.ciphertext)?,
            wrapped_key: decode_field("wrappedKey", &wire.wrapped_key)?,
            nonce,
        };
        Self::from_parts(
            wire.sender,
            wire.receiver,
            payload,
            wire.created_at,
            wire.expires_at,
        )
    }
}

impl From<&MessageEnvelope> for WireEnvelope {
    fn from(env: &MessageEnvelope) -> Self {
        Self {
            sender: env.sender.clone(),
            receiver: env.receiver.clone(),
            ciphertext: STANDARD.encode(&env.payload.ciphertext),
            wrapped_key: STANDARD.encode(&env.payload.wrapped_key),
            nonce: STANDARD.encode(env.payload.nonce),
            created_at: env.created_at,
            expires_at: env.expires_at,
        }
    }
}

impl Serialize for MessageEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEnvelope::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEnvelope::deserialize(deserializer)?;
        MessageEnvelope::try_from(wire).map_err(serde::de::Error::custom)
    }
}

// ── Envelope id ──

/// SHA-256 over the envelope's participants, creation time and sealed bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvelopeId([u8; 32]);

impl EnvelopeId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> EnvelopeResult<Self> {
        let bytes = hex::decode(s).map_err(|e| EnvelopeError::Encoding(format!("envelope id: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EnvelopeError::Encoding("envelope id must be 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvelopeId({})", &self.to_hex()[..12])
    }
}

impl Serialize for EnvelopeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EnvelopeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EnvelopeId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ── Conversation key ──

/// Unordered pair of identities: `new(a, b) == new(b, a)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: Identity,
    high: Identity,
}

impl ConversationKey {
    pub fn new(a: Identity, b: Identity) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn participants(&self) -> (&Identity, &Identity) {
        (&self.low, &self.high)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        &self.low == identity || &self.high == identity
    }

    /// Stable string form used as an index column. Identities never contain
    /// control characters, so the unit separator cannot collide.
    pub fn storage_key(&self) -> String {
        format!("{}\u{1f}{}", self.low, self.high)
    }
}
