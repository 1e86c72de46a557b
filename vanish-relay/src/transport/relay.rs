//! In-process relay: identity rooms on top of an [`EnvelopeStore`].

use crate::config::VanishConfig;
use crate::error::{RelayError, RelayResult};
use crate::transport::connection::{Connection, SendAck};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use vanish_store::{EnvelopeStore, PutOutcome};
use vanish_types::{Identity, MessageEnvelope};

/// How far ahead of the relay's clock an envelope's `created_at` may be.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 30;

/// Relays envelopes between identities.
///
/// `send` always stores first. Only after the store accepted the envelope is
/// it pushed to the receiver's live subscribers, so anything a receiver saw
/// pushed is also visible through `history` until it expires.
///
/// Store failures are returned after a single attempt; retrying is up to the
/// [`DeliveryChannel`](crate::DeliveryChannel).
pub struct RelayHub {
    store: Arc<dyn EnvelopeStore>,
    rooms: RwLock<HashMap<Identity, Vec<mpsc::Sender<MessageEnvelope>>>>,
    subscriber_buffer: usize,
    max_ttl: Duration,
}

impl RelayHub {
    pub fn new(store: Arc<dyn EnvelopeStore>, config: &VanishConfig) -> Self {
        Self {
            store,
            rooms: RwLock::new(HashMap::new()),
            subscriber_buffer: config.subscriber_buffer.max(1),
            max_ttl: config.ttl(),
        }
    }

    /// Live subscribers currently in `identity`'s room.
    pub async fn subscriber_count(&self, identity: &Identity) -> usize {
        self.rooms
            .read()
            .await
            .get(identity)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Refuses envelopes that would outlive this deployment's lifetime or
    /// claim to be created in the future.
    fn check_lifetime(&self, envelope: &MessageEnvelope) -> RelayResult<()> {
        if envelope.ttl() > self.max_ttl {
            return Err(RelayError::Rejected(format!(
                "lifetime {}s exceeds the relay limit of {}s",
                envelope.ttl().num_seconds(),
                self.max_ttl.num_seconds()
            )));
        }
        let horizon = Utc::now() + Duration::seconds(MAX_CLOCK_SKEW_SECONDS);
        if envelope.created_at() > horizon {
            return Err(RelayError::Rejected(format!(
                "created_at {} is ahead of the relay clock",
                envelope.created_at()
            )));
        }
        Ok(())
    }

    async fn store(&self, envelope: &MessageEnvelope) -> RelayResult<PutOutcome> {
        let store = Arc::clone(&self.store);
        let envelope = envelope.clone();
        tokio::task::spawn_blocking(move || store.put(&envelope))
            .await
            .map_err(|e| RelayError::Transport(format!("store task failed: {e}")))?
            .map_err(RelayError::from)
    }

    async fn push(&self, envelope: &MessageEnvelope) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(subscribers) = rooms.get_mut(envelope.receiver()) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(envelope.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(receiver = %envelope.receiver(), "subscriber buffer full, push dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            rooms.remove(envelope.receiver());
        }
        delivered
    }
}

#[async_trait]
impl Connection for RelayHub {
    async fn join(&self, identity: &Identity) -> RelayResult<mpsc::Receiver<MessageEnvelope>> {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(identity.clone()).or_default();
        room.retain(|tx| !tx.is_closed());
        room.push(tx);
        info!(%identity, subscribers = room.len(), "joined room");
        Ok(rx)
    }

    async fn send(&self, envelope: &MessageEnvelope) -> RelayResult<SendAck> {
        let envelope_id = envelope.id();
        if let Err(e) = self.check_lifetime(envelope) {
            warn!(envelope = ?envelope_id, sender = %envelope.sender(), error = %e, "envelope refused");
            return Err(e);
        }
        let outcome = self.store(envelope).await?;

        let live_deliveries = match outcome {
            PutOutcome::Stored => self.push(envelope).await,
            PutOutcome::Duplicate | PutOutcome::AlreadyExpired => 0,
        };
        debug!(
            envelope = ?envelope_id,
            ?outcome,
            live_deliveries,
            "envelope relayed"
        );

        Ok(SendAck {
            envelope_id,
            outcome,
            live_deliveries,
        })
    }

    async fn history(&self, a: &Identity, b: &Identity) -> RelayResult<Vec<MessageEnvelope>> {
        let store = Arc::clone(&self.store);
        let (a, b) = (a.clone(), b.clone());
        tokio::task::spawn_blocking(move || store.history(&a, &b))
            .await
            .map_err(|e| RelayError::Transport(format!("store task failed: {e}")))?
            .map_err(RelayError::from)
    }
}
