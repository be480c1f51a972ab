//! Whole-handshake drivers for each role.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::LinkTiming;
use crate::error::LinkError;
use crate::peer::{ConnectionState, NegotiationPeer};
use crate::publisher::{publish_offer, PublishOutcome};
use crate::retriever::{retrieve_answer, RetrieveOutcome};
use crate::signaling::ExchangeApi;
use crate::trust::TrustGate;

/// Initiator: publish the offer, then wait for a trusted answer.
pub async fn negotiate_as_initiator<P, E, G>(
    peer: &P,
    exchange: &E,
    gate: &G,
    timing: &LinkTiming,
    cancel: &CancellationToken,
) -> Result<RetrieveOutcome, LinkError>
where
    P: NegotiationPeer + ?Sized,
    E: ExchangeApi + ?Sized,
    G: TrustGate + ?Sized,
{
    match publish_offer(peer, exchange, timing, cancel).await? {
        PublishOutcome::Stored(offer) => {
            retrieve_answer(peer, exchange, gate, &offer, timing, cancel).await
        }
        PublishOutcome::Cancelled => Ok(RetrieveOutcome::Cancelled),
    }
}

/// Wait until the connection is up. `false` on a terminal state or cancellation.
pub async fn wait_for_connection(
    mut state: watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
) -> bool {
    let settled = state.wait_for(|state| *state == ConnectionState::Connected || state.is_terminal());
    tokio::select! {
        _ = cancel.cancelled() => false,
        result = settled => matches!(result.as_deref(), Ok(ConnectionState::Connected)),
    }
}
