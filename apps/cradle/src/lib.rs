//! Client side of the cradle rendezvous: exchange client, negotiation loops,
//! and the peer connection lifecycle.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod peer;
pub mod publisher;
pub mod responder;
pub mod retriever;
pub mod session;
pub mod signaling;
pub mod telemetry;
pub mod trust;
pub mod update;

mod polling;

#[cfg(test)]
mod testing;

pub use config::{LinkConfig, LinkTiming};
pub use error::LinkError;
pub use lifecycle::{revoke, PeerCallbacks, RtcPeer};
pub use peer::{ConnectionState, GatheringState, NegotiationPeer};
pub use signaling::{ExchangeApi, ExchangeClient};
pub use trust::{TrustGate, TrustedParents};
