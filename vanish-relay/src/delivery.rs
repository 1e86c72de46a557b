//! Client side of delivery: publish, live subscription and reconciliation.
//!
//! Delivery is at-least-once. The same envelope can arrive through a push
//! and again through a later reconciliation, so consumers deduplicate by
//! [`EnvelopeId`] (see [`crate::Conversation`]).

use crate::config::VanishConfig;
use crate::error::RelayResult;
use crate::retry::with_backoff;
use crate::transport::{Connection, SendAck};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vanish_types::{EnvelopeId, Identity, MessageEnvelope};

/// Publishes and receives envelopes over one [`Connection`].
#[derive(Clone)]
pub struct DeliveryChannel {
    connection: Arc<dyn Connection>,
    max_attempts: u32,
    retry_base_delay: Duration,
}

/// Result of one reconciliation pass: the full set of envelopes the relay
/// still holds for the pair.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// Taken before the history request was issued.
    pub started_at: DateTime<Utc>,
    pub envelopes: Vec<MessageEnvelope>,
}

impl ReconcileReport {
    pub fn ids(&self) -> impl Iterator<Item = EnvelopeId> + '_ {
        self.envelopes.iter().map(MessageEnvelope::id)
    }

    pub fn contains(&self, id: &EnvelopeId) -> bool {
        self.ids().any(|candidate| &candidate == id)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

/// Owns a background delivery task.
///
/// `cancel` stops callbacks and waits for the task to exit. Dropping the
/// handle aborts the task. Either way the room membership or poll loop is
/// released.
pub struct SubscriptionHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    fn new(cancel_tx: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            cancel_tx: Some(cancel_tx),
            task: Some(task),
        }
    }

    /// Stops the task. No callback runs after this returns.
    pub async fn cancel(mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl DeliveryChannel {
    pub fn new(connection: Arc<dyn Connection>, config: &VanishConfig) -> Self {
        Self {
            connection,
            max_attempts: config.publish_max_attempts,
            retry_base_delay: config.retry_base_delay(),
        }
    }

    /// Sends an envelope to the relay, which stores it and pushes it to the
    /// receiver if online. Transient failures are retried with exponential
    /// backoff; anything else is returned at once.
    pub async fn publish(&self, envelope: &MessageEnvelope) -> RelayResult<SendAck> {
        let ack = with_backoff("publish", self.max_attempts, self.retry_base_delay, || {
            self.connection.send(envelope)
        })
        .await?;
        debug!(
            envelope = ?ack.envelope_id,
            outcome = ?ack.outcome,
            live = ack.live_deliveries,
            "published"
        );
        Ok(ack)
    }

    /// History snapshot for a pair, retried like `publish`.
    pub async fn history(&self, a: &Identity, b: &Identity) -> RelayResult<Vec<MessageEnvelope>> {
        with_backoff("history", self.max_attempts, self.retry_base_delay, || {
            self.connection.history(a, b)
        })
        .await
    }

    /// Joins `identity`'s room and invokes `on_envelope` once per pushed
    /// envelope until the returned handle is cancelled or dropped.
    pub async fn subscribe<F>(
        &self,
        identity: &Identity,
        mut on_envelope: F,
    ) -> RelayResult<SubscriptionHandle>
    where
        F: FnMut(MessageEnvelope) + Send + 'static,
    {
        let mut inbox = self.connection.join(identity).await?;
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let owner = identity.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    next = inbox.recv() => match next {
                        Some(envelope) => on_envelope(envelope),
                        None => {
                            debug!(identity = %owner, "relay closed subscription");
                            break;
                        }
                    },
                }
            }
            info!(identity = %owner, "subscription ended");
        });

        Ok(SubscriptionHandle::new(cancel_tx, task))
    }

    /// Fetches the current history for the pair and reports each envelope in
    /// `createdAt` order. Envelopes missing since the last pass have expired
    /// and are simply absent; that is not an error.
    pub async fn reconcile<F>(
        &self,
        a: &Identity,
        b: &Identity,
        mut on_envelope: F,
    ) -> RelayResult<ReconcileReport>
    where
        F: FnMut(&MessageEnvelope),
    {
        let started_at = Utc::now();
        let envelopes = self.history(a, b).await?;
        for envelope in &envelopes {
            on_envelope(envelope);
        }
        debug!(%a, %b, count = envelopes.len(), "reconciled");
        Ok(ReconcileReport {
            started_at,
            envelopes,
        })
    }

    /// Runs [`reconcile`](Self::reconcile) every `interval`, starting
    /// immediately, and hands each report to `on_snapshot`. Failed passes are
    /// logged and retried on the next tick.
    pub fn spawn_reconciler<F>(
        &self,
        a: &Identity,
        b: &Identity,
        interval: Duration,
        mut on_snapshot: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(ReconcileReport) + Send + 'static,
    {
        let channel = self.clone();
        let (a, b) = (a.clone(), b.clone());
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        let pass = tokio::select! {
                            biased;
                            _ = &mut cancel_rx => break,
                            pass = channel.reconcile(&a, &b, |_| {}) => pass,
                        };
                        match pass {
                            Ok(report) => on_snapshot(report),
                            Err(e) => warn!(%a, %b, "reconciliation failed: {e}"),
                        }
                    }
                }
            }
            info!(%a, %b, "reconciler stopped");
        });

        SubscriptionHandle::new(cancel_tx, task)
    }
}
