use cradle_proto::{Envelope, ExchangeKind, Offer, StoreStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LinkTiming;
use crate::error::LinkError;
use crate::lifecycle::revoke;
use crate::peer::{wait_for_gathering, NegotiationPeer};
use crate::polling::{pause, store_until};
use crate::signaling::ExchangeApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespondOutcome {
    /// The exchange holds our answer to `offer`.
    Answered { offer: Offer },
    Cancelled,
}

/// Wait for an offer, answer it as `parent_id`, and write the answer until
/// the exchange acknowledges it.
pub async fn respond_to_offer<P, E>(
    peer: &P,
    exchange: &E,
    parent_id: &str,
    timing: &LinkTiming,
    cancel: &CancellationToken,
) -> Result<RespondOutcome, LinkError>
where
    P: NegotiationPeer + ?Sized,
    E: ExchangeApi + ?Sized,
{
    let offer = loop {
        if !pause(timing.poll_interval, cancel).await {
            debug!(target = "cradle::responder", "cancelled while waiting for an offer");
            let _ = revoke([peer], exchange).await;
            return Ok(RespondOutcome::Cancelled);
        }
        match exchange.load(ExchangeKind::Offer).await {
            Ok(Some(Envelope::Offer(offer))) => break offer,
            Ok(_) => {}
            Err(err) => warn!(target = "cradle::responder", error = %err, "offer poll failed"),
        }
    };
    debug!(target = "cradle::responder", sdp_len = offer.sdp.len(), "offer found");

    let prepared = async {
        peer.apply_remote_offer(&offer.sdp).await?;
        peer.create_local_answer().await?;
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
            warn!(target = "cradle::responder", error = %err, "answering the offer failed");
            let _ = revoke([peer], exchange).await;
            return Err(err);
        }
        None => {
            debug!(target = "cradle::responder", "cancelled while preparing the answer");
            let _ = revoke([peer], exchange).await;
            return Ok(RespondOutcome::Cancelled);
        }
    };

    peer.set_parent_id(Some(parent_id.to_string()));
    let answer = Envelope::answer(sdp, Some(parent_id.to_string()));
    let stored = store_until(
        exchange,
        &answer,
        StoreStatus::AnswerStored,
        timing.publish_interval,
        cancel,
        "responder",
    )
    .await;
    if stored {
        info!(target = "cradle::responder", parent_id, "answer published");
        Ok(RespondOutcome::Answered { offer })
    } else {
        let _ = revoke([peer], exchange).await;
        Ok(RespondOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cradle_proto::Answer;

    use super::*;
    use crate::testing::{FakeExchange, FakePeer};

    #[tokio::test(start_paused = true)]
    async fn stores_an_answer_carrying_the_parent_id() {
        let exchange = FakeExchange::default();
        exchange.script(
            ExchangeKind::Offer,
            vec![Ok(None), Err(()), Ok(Some(Envelope::offer("remote-offer")))],
        );
        let peer = FakePeer::completed();

        let outcome = respond_to_offer(
            &peer,
            &exchange,
            "mum",
            &LinkTiming::default(),
            &CancellationToken::new(),
        )
        .await
        .expect("answered");

        assert_eq!(
            outcome,
            RespondOutcome::Answered {
                offer: Offer {
                    sdp: "remote-offer".into(),
                    ..Offer::default()
                }
            }
        );
        assert_eq!(peer.applied_offers(), vec!["remote-offer".to_string()]);
        assert_eq!(
            exchange.current_answer(),
            Some(Answer {
                sdp: "local-answer".into(),
                parent_id: Some("mum".into()),
                ..Answer::default()
            })
        );
        assert_eq!(peer.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_while_waiting_revokes() {
        let exchange = FakeExchange::default();
        let peer = FakePeer::completed();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let outcome = respond_to_offer(&peer, &exchange, "mum", &LinkTiming::default(), &cancel)
            .await
            .expect("cancelled");
        assert_eq!(outcome, RespondOutcome::Cancelled);
        assert_eq!(peer.close_calls(), 1);
        assert_eq!(exchange.stored(), vec![Envelope::Clear]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_gathering_revokes_with_timeout() {
        let exchange = FakeExchange::default();
        exchange.script(ExchangeKind::Offer, vec![Ok(Some(Envelope::offer("remote-offer")))]);
        let peer = FakePeer::stalled();

        let err = respond_to_offer(
            &peer,
            &exchange,
            "mum",
            &LinkTiming::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("gathering stalls");
        assert!(matches!(err, LinkError::GatheringTimeout(_)));
        assert_eq!(exchange.clear_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_gathering_stops_on_cancellation() {
        let exchange = FakeExchange::default();
        exchange.script(ExchangeKind::Offer, vec![Ok(Some(Envelope::offer("remote-offer")))]);
        let peer = FakePeer::stalled();
        let timing = LinkTiming {
            gather_timeout: None,
            ..LinkTiming::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            respond_to_offer(&peer, &exchange, "mum", &timing, &cancel),
        )
        .await
        .expect("cancellation ends the gathering wait")
        .expect("cancellation is not an error");
        assert_eq!(outcome, RespondOutcome::Cancelled);
        assert_eq!(peer.applied_offers(), vec!["remote-offer".to_string()]);
        assert_eq!(peer.close_calls(), 1);
        assert_eq!(exchange.stored(), vec![Envelope::Clear]);
    }
}
