//! Delivery layer for Vanish.
//!
//! - [`RelayHub`]: in-process relay. Stores every envelope, then pushes it to
//!   the receiver's live subscribers.
//! - [`DeliveryChannel`]: client side of a [`Connection`] with publish
//!   retries, cancellable subscriptions and history reconciliation.
//! - [`ChatSession`]: one identity's pipeline (lookup, seal, publish, open).
//! - [`Conversation`]: deduplicated view that drops vanished messages.
//! - [`HttpDirectory`]: public key directory over HTTP.

pub mod api_client;
pub mod config;
pub mod conversation;
pub mod delivery;
pub mod error;
mod retry;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use api_client::HttpDirectory;
pub use config::VanishConfig;
pub use conversation::Conversation;
pub use delivery::{DeliveryChannel, ReconcileReport, SubscriptionHandle};
pub use error::{RelayError, RelayResult};
pub use session::{ChatSession, MessageBody, RenderedMessage, UNREADABLE_MARKER};
pub use telemetry::init_tracing;
pub use transport::{Connection, RelayHub, SendAck};
