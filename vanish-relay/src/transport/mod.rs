//! Transport seam between clients and the relay.

mod connection;
mod relay;

pub use connection::{Connection, SendAck};
pub use relay::{RelayHub, MAX_CLOCK_SKEW_SECONDS};
