use cradle_proto::{Envelope, ExchangeKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LinkTiming;
use crate::error::LinkError;
use crate::lifecycle::revoke;
use crate::peer::NegotiationPeer;
use crate::polling::pause;
use crate::signaling::ExchangeApi;
use crate::trust::TrustGate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieveOutcome {
    /// A trusted answer was applied as the remote description.
    Accepted { parent_id: Option<String> },
    Cancelled,
}

/// Poll the answer slot until a trusted answer arrives.
///
/// Untrusted answers are displaced by re-publishing `offer`. Read failures are
/// logged and polling continues. If polling stops before a remote description
/// was applied, the attempt is revoked.
pub async fn retrieve_answer<P, E, G>(
    peer: &P,
    exchange: &E,
    gate: &G,
    offer: &Envelope,
    timing: &LinkTiming,
    cancel: &CancellationToken,
) -> Result<RetrieveOutcome, LinkError>
where
    P: NegotiationPeer + ?Sized,
    E: ExchangeApi + ?Sized,
    G: TrustGate + ?Sized,
{
    while pause(timing.poll_interval, cancel).await {
        let answer = match exchange.load(ExchangeKind::Answer).await {
            Ok(Some(Envelope::Answer(answer))) => answer,
            Ok(Some(Envelope::Offer(_) | Envelope::Clear)) | Ok(None) => continue,
            Err(err) => {
                warn!(target = "cradle::retriever", error = %err, "answer poll failed");
                continue;
            }
        };

        if !gate.is_trusted(answer.parent_id.as_deref()) {
            debug!(
                target = "cradle::retriever",
                parent_id = ?answer.parent_id,
                "untrusted answer; re-publishing offer"
            );
            if let Err(err) = exchange.store(offer).await {
                warn!(target = "cradle::retriever", error = %err, "re-publishing offer failed");
            }
            continue;
        }

        peer.set_parent_id(answer.parent_id.clone());
        if let Err(err) = peer.apply_remote_answer(&answer.sdp).await {
            warn!(target = "cradle::retriever", error = %err, "applying trusted answer failed");
            let _ = revoke([peer], exchange).await;
            return Err(err);
        }
        info!(target = "cradle::retriever", parent_id = ?answer.parent_id, "answer accepted");
        return Ok(RetrieveOutcome::Accepted {
            parent_id: answer.parent_id,
        });
    }

    if !peer.has_remote_description().await {
        let _ = revoke([peer], exchange).await;
    }
    Ok(RetrieveOutcome::Cancelled)
}
