use crate::error::RelayResult;
use async_trait::async_trait;
use tokio::sync::mpsc;
use vanish_store::PutOutcome;
use vanish_types::{EnvelopeId, Identity, MessageEnvelope};

/// Relay's acknowledgement of a `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub envelope_id: EnvelopeId,
    pub outcome: PutOutcome,
    /// Live subscribers the envelope was pushed to.
    pub live_deliveries: usize,
}

/// An explicit connection to a relay, owned by the session that uses it.
///
/// Mirrors the relay protocol: room membership (`join`), envelope
/// submission (`send`) and the request/response `history` call.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Joins `identity`'s room. Envelopes addressed to it are pushed to the
    /// returned receiver until it is dropped.
    async fn join(&self, identity: &Identity) -> RelayResult<mpsc::Receiver<MessageEnvelope>>;

    async fn send(&self, envelope: &MessageEnvelope) -> RelayResult<SendAck>;

    /// Point-in-time snapshot of the non-expired envelopes between `a` and `b`.
    async fn history(&self, a: &Identity, b: &Identity) -> RelayResult<Vec<MessageEnvelope>>;
}
