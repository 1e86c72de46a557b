//! Core data model for Vanish.
//!
//! An [`Identity`] is an opaque user handle. A [`MessageEnvelope`] is the
//! unit of transport and storage: it only ever carries sealed bytes, never
//! plaintext. Envelopes are immutable once built and always satisfy
//! `expires_at > created_at`.

mod envelope;
mod error;
mod identity;

pub use envelope::{ConversationKey, EnvelopeId, MessageEnvelope, SealedPayload, NONCE_LEN};
pub use error::{EnvelopeError, EnvelopeResult};
pub use identity::{Identity, MAX_IDENTITY_LEN};
