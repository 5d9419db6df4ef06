//! Venue boundary.
//!
//! The engine talks to the broker through `VenueTransport`, a thin
//! fire-and-forget sink for outbound JSON frames. Replies come back
//! asynchronously as raw text on a channel owned by the connection and are
//! routed by the dispatcher. Swap in a scripted transport for tests.

pub mod deriv;
pub mod protocol;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::EngineError;

pub use deriv::DerivConnection;
pub use protocol::{parse_inbound, Envelope, InboundMessage, OutboundRequest, Reply};

/// Outbound half of a venue connection.
#[async_trait]
pub trait VenueTransport: Send + Sync {
    /// Queue one JSON frame for transmission.
    async fn send(&self, payload: Value) -> Result<(), EngineError>;
}
