use cradle_proto::{Envelope, StoreStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::LinkTiming;
use crate::error::LinkError;
use crate::lifecycle::revoke;
use crate::peer::{wait_for_gathering, NegotiationPeer};
use crate::polling::store_until;
use crate::signaling::ExchangeApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The exchange holds this offer.
    Stored(Envelope),
    Cancelled,
}

/// Create the local offer, wait for gathering, and write the offer until the
/// exchange acknowledges it.
///
/// A gathering timeout, a negotiation failure, or cancellation before the
/// acknowledgement revokes the attempt.
pub async fn publish_offer<P, E>(
    peer: &P,
    exchange: &E,
    timing: &LinkTiming,
    cancel: &CancellationToken,
) -> Result<PublishOutcome, LinkError>
where
    P: NegotiationPeer + ?Sized,
    E: ExchangeApi + ?Sized,
{
    let prepared = async {
        peer.create_local_offer().await?;
        wait_for_gathering(peer.gathering(), timing.gather_timeout).await?;
        peer.local_sdp().await
    };
    let prepared = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        prepared = prepared => Some(prepared),
    };
    let sdp = match prepared {
        Some(Ok(sdp)) => sdp,
        Some(Err(err)) => {
            let _ = revoke([peer], exchange).await;
            return Err(err);
        }
        None => {
            debug!(target = "cradle::publisher", "cancelled while preparing the offer");
            let _ = revoke([peer], exchange).await;
            return Ok(PublishOutcome::Cancelled);
        }
    };
    debug!(target = "cradle::publisher", sdp_len = sdp.len(), "local offer ready");

    let offer = Envelope::offer(sdp);
    let stored = store_until(
        exchange,
        &offer,
        StoreStatus::OfferStored,
        timing.publish_interval,
        cancel,
        "initiator",
    )
    .await;
    if stored {
        info!(target = "cradle::publisher", "offer published");
        Ok(PublishOutcome::Stored(offer))
    } else {
        debug!(target = "cradle::publisher", "cancelled before the offer was stored");
        let _ = revoke([peer], exchange).await;
        Ok(PublishOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeExchange, FakePeer};

    #[tokio::test(start_paused = true)]
    async fn retries_after_transport_errors() {
        let exchange = FakeExchange::default();
        exchange.fail_stores(2);
        let peer = FakePeer::completed();

        let outcome = publish_offer(&peer, &exchange, &LinkTiming::default(), &CancellationToken::new())
            .await
            .expect("published");
        assert_eq!(outcome, PublishOutcome::Stored(Envelope::offer("local-offer")));
        assert_eq!(exchange.stored(), vec![Envelope::offer("local-offer")]);
        assert_eq!(peer.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_gathering_times_out_and_revokes() {
        let exchange = FakeExchange::default();
        let peer = FakePeer::stalled();
        let timing = LinkTiming {
            gather_timeout: Some(Duration::from_secs(15)),
            ..LinkTiming::default()
        };

        let err = publish_offer(&peer, &exchange, &timing, &CancellationToken::new())
            .await
            .expect_err("gathering never completes");
        assert!(matches!(err, LinkError::GatheringTimeout(_)));
        assert_eq!(peer.close_calls(), 1);
        assert_eq!(exchange.stored(), vec![Envelope::Clear]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_acknowledgement_revokes() {
        let exchange = FakeExchange::default();
        exchange.fail_stores(usize::MAX);
        let peer = FakePeer::completed();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let outcome = publish_offer(&peer, &exchange, &LinkTiming::default(), &cancel)
            .await
            .expect("cancellation is not an error");
        assert_eq!(outcome, PublishOutcome::Cancelled);
        assert_eq!(peer.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_gathering_stops_on_cancellation() {
        let exchange = FakeExchange::default();
        let peer = FakePeer::stalled();
        let timing = LinkTiming {
            gather_timeout: None,
            ..LinkTiming::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            publish_offer(&peer, &exchange, &timing, &cancel),
        )
        .await
        .expect("cancellation ends the gathering wait")
        .expect("cancellation is not an error");
        assert_eq!(outcome, PublishOutcome::Cancelled);
        assert_eq!(peer.close_calls(), 1);
        assert_eq!(exchange.stored(), vec![Envelope::Clear]);
    }
}
