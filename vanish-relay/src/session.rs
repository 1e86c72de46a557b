//! Per-identity client pipeline: provision, seal, publish, open.

use crate::config::VanishConfig;
use crate::conversation::Conversation;
use crate::delivery::{DeliveryChannel, ReconcileReport};
use crate::error::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use vanish_crypto::IdentityKeyPair;
use vanish_types::{EnvelopeId, Identity, MessageEnvelope};
use vanish_vault::{Directory, DirectoryError, KeyVault};

/// Marker shown in place of a message that could not be decrypted.
pub const UNREADABLE_MARKER: &str = "[Unable to decrypt]";

/// What a client shows for one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Wrong key, tampering, or a body that is not UTF-8. Never an error for
    /// the surrounding view.
    Unreadable,
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBody::Text(text) => f.write_str(text),
            MessageBody::Unreadable => f.write_str(UNREADABLE_MARKER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub id: EnvelopeId,
    pub sender: Identity,
    pub receiver: Identity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub body: MessageBody,
}

impl RenderedMessage {
    pub fn is_readable(&self) -> bool {
        matches!(self.body, MessageBody::Text(_))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct SentCopy {
    text: String,
    expires_at: DateTime<Utc>,
}

/// One identity's chat client.
///
/// Envelopes are sealed for the receiver only, so the sender cannot open
/// its own outgoing messages. The session keeps the text of what it sent in
/// memory until the envelope expires and renders outgoing messages from
/// that copy.
pub struct ChatSession {
    identity: Identity,
    vault: Arc<KeyVault>,
    directory: Arc<dyn Directory>,
    channel: DeliveryChannel,
    ttl: chrono::Duration,
    sent: Mutex<HashMap<EnvelopeId, SentCopy>>,
}

impl ChatSession {
    pub fn new(
        identity: Identity,
        vault: Arc<KeyVault>,
        directory: Arc<dyn Directory>,
        channel: DeliveryChannel,
        config: &VanishConfig,
    ) -> Self {
        Self {
            identity,
            vault,
            directory,
            channel,
            ttl: config.ttl(),
            sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn channel(&self) -> &DeliveryChannel {
        &self.channel
    }

    /// Provisions (or loads) this identity's keypair.
    pub async fn start(&self) -> RelayResult<()> {
        let keypair = self.vault.ensure_key_pair(&self.identity).await?;
        info!(identity = %self.identity, public_key = ?keypair.public_key(), "session started");
        Ok(())
    }

    /// Looks up `receiver`'s public key and seals `text` into an envelope
    /// expiring after the configured TTL. Nothing is sent.
    pub async fn seal_text(&self, receiver: &Identity, text: &str) -> RelayResult<MessageEnvelope> {
        let public_key = match self.directory.get_public_key(receiver).await {
            Ok(der) => der,
            Err(DirectoryError::NotFound(identity)) => {
                return Err(RelayError::RecipientUnknown(identity));
            }
            Err(e) => return Err(e.into()),
        };

        let sealed = vanish_crypto::seal(text.as_bytes(), &public_key)?;
        let envelope = MessageEnvelope::new(
            self.identity.clone(),
            receiver.clone(),
            sealed,
            Utc::now(),
            self.ttl,
        )?;
        Ok(envelope)
    }

    /// Seals `text` for `receiver` and publishes it.
    pub async fn send_text(&self, receiver: &Identity, text: &str) -> RelayResult<MessageEnvelope> {
        let envelope = self.seal_text(receiver, text).await?;
        self.remember_sent(&envelope, text);

        if let Err(e) = self.channel.publish(&envelope).await {
            warn!(receiver = %receiver, "publish failed: {e}");
            self.forget_sent(&envelope.id());
            return Err(e);
        }
        debug!(receiver = %receiver, envelope = ?envelope.id(), "message sent");
        Ok(envelope)
    }

    /// Renders one envelope. Decryption failures become
    /// [`MessageBody::Unreadable`]; only a missing local key is an error.
    pub async fn read(&self, envelope: &MessageEnvelope) -> RelayResult<RenderedMessage> {
        let keypair = self.vault.private_key_of(&self.identity).await?;
        Ok(self.render(envelope, &keypair))
    }

    /// Renders a batch, loading the private key once.
    pub async fn read_all(&self, envelopes: &[MessageEnvelope]) -> RelayResult<Vec<RenderedMessage>> {
        let keypair = self.vault.private_key_of(&self.identity).await?;
        Ok(envelopes
            .iter()
            .map(|envelope| self.render(envelope, &keypair))
            .collect())
    }

    /// Adds a pushed envelope to `conversation` unless it is already there.
    /// Returns whether it was new.
    pub async fn ingest_pushed(
        &self,
        conversation: &mut Conversation,
        envelope: &MessageEnvelope,
    ) -> RelayResult<bool> {
        if !conversation.wants(envelope, Utc::now()) {
            return Ok(false);
        }
        let message = self.read(envelope).await?;
        Ok(conversation.ingest(message))
    }

    /// Brings `conversation` in line with a reconciliation snapshot: new
    /// envelopes are rendered and added, vanished ones are dropped. Returns
    /// the number of new messages.
    pub async fn ingest_snapshot(
        &self,
        conversation: &mut Conversation,
        report: &ReconcileReport,
    ) -> RelayResult<usize> {
        let now = Utc::now();
        let fresh: Vec<MessageEnvelope> = report
            .envelopes
            .iter()
            .filter(|envelope| conversation.wants(envelope, now))
            .cloned()
            .collect();

        let mut added = 0;
        if !fresh.is_empty() {
            for message in self.read_all(&fresh).await? {
                if conversation.ingest(message) {
                    added += 1;
                }
            }
        }
        let removed = conversation.apply_snapshot(report);
        debug!(identity = %self.identity, added, removed, "snapshot applied");
        Ok(added)
    }

    fn render(&self, envelope: &MessageEnvelope, keypair: &IdentityKeyPair) -> RenderedMessage {
        let body = if envelope.receiver() == &self.identity {
            match vanish_crypto::open(envelope, keypair) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => MessageBody::Text(text),
                    Err(_) => MessageBody::Unreadable,
                },
                Err(e) => {
                    debug!(envelope = ?envelope.id(), "cannot open envelope: {e}");
                    MessageBody::Unreadable
                }
            }
        } else if envelope.sender() == &self.identity {
            self.sent_copy(&envelope.id())
                .map(MessageBody::Text)
                .unwrap_or(MessageBody::Unreadable)
        } else {
            MessageBody::Unreadable
        };

        RenderedMessage {
            id: envelope.id(),
            sender: envelope.sender().clone(),
            receiver: envelope.receiver().clone(),
            created_at: envelope.created_at(),
            expires_at: envelope.expires_at(),
            body,
        }
    }

    fn remember_sent(&self, envelope: &MessageEnvelope, text: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            let now = Utc::now();
            sent.retain(|_, copy| copy.expires_at > now);
            sent.insert(
                envelope.id(),
                SentCopy {
                    text: text.to_string(),
                    expires_at: envelope.expires_at(),
                },
            );
        }
    }

    fn forget_sent(&self, id: &EnvelopeId) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.remove(id);
        }
    }

    fn sent_copy(&self, id: &EnvelopeId) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        sent.get(id)
            .filter(|copy| copy.expires_at > Utc::now())
            .map(|copy| copy.text.clone())
    }
}
