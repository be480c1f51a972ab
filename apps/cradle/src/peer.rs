use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::timeout;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

impl From<RTCIceGathererState> for GatheringState {
    fn from(state: RTCIceGathererState) -> Self {
        match state {
            RTCIceGathererState::Gathering => GatheringState::Gathering,
            RTCIceGathererState::Complete => GatheringState::Complete,
            _ => GatheringState::New,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// States that end the session from the caller's point of view.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                ConnectionState::New
            }
        }
    }
}

/// The negotiation surface the rendezvous loops drive.
///
/// `RtcPeer` implements it over a real peer connection; tests substitute
/// scripted peers.
#[async_trait]
pub trait NegotiationPeer: Send + Sync {
    /// Create an offer and commit it as the local description.
    async fn create_local_offer(&self) -> Result<(), LinkError>;

    /// Create an answer to the applied remote offer and commit it locally.
    async fn create_local_answer(&self) -> Result<(), LinkError>;

    async fn apply_remote_offer(&self, sdp: &str) -> Result<(), LinkError>;

    async fn apply_remote_answer(&self, sdp: &str) -> Result<(), LinkError>;

    /// SDP of the committed local description, candidates included once gathering completes.
    async fn local_sdp(&self) -> Result<String, LinkError>;

    async fn has_remote_description(&self) -> bool;

    fn gathering(&self) -> watch::Receiver<GatheringState>;

    fn set_parent_id(&self, parent_id: Option<String>);

    fn parent_id(&self) -> Option<String>;

    /// Idempotent.
    async fn close(&self) -> Result<(), LinkError>;
}

/// Wait until `gathering` reports `Complete`.
///
/// The current value is checked before subscribing to changes, so a gathering
/// that finished before the call returns immediately.
pub async fn wait_for_gathering(
    mut gathering: watch::Receiver<GatheringState>,
    limit: Option<Duration>,
) -> Result<(), LinkError> {
    let wait = async move {
        gathering
            .wait_for(|state| *state == GatheringState::Complete)
            .await
            .map(|_| ())
            .map_err(|_| LinkError::Peer("gathering state channel closed".into()))
    };
    match limit {
        Some(limit) => timeout(limit, wait)
            .await
            .map_err(|_| LinkError::GatheringTimeout(limit))?,
        None => wait.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_gathering_returns_immediately() {
        let (tx, rx) = watch::channel(GatheringState::Complete);
        wait_for_gathering(rx, Some(Duration::from_millis(1)))
            .await
            .expect("already complete");
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn gathering_that_completes_later_is_observed() {
        let (tx, rx) = watch::channel(GatheringState::New);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            tx.send_replace(GatheringState::Gathering);
            tokio::time::sleep(Duration::from_secs(2)).await;
            tx.send_replace(GatheringState::Complete);
        });
        wait_for_gathering(rx, Some(Duration::from_secs(15)))
            .await
            .expect("complete before timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_gathering_times_out() {
        let (_tx, rx) = watch::channel(GatheringState::Gathering);
        let err = wait_for_gathering(rx, Some(Duration::from_secs(15)))
            .await
            .expect_err("should time out");
        assert!(matches!(err, LinkError::GatheringTimeout(limit) if limit == Duration::from_secs(15)));
    }

    #[test]
    fn terminal_states_share_one_group() {
        assert!(ConnectionState::from(RTCPeerConnectionState::Failed).is_terminal());
        assert!(ConnectionState::from(RTCPeerConnectionState::Closed).is_terminal());
        assert!(ConnectionState::from(RTCPeerConnectionState::Disconnected).is_terminal());
        assert!(!ConnectionState::from(RTCPeerConnectionState::Connected).is_terminal());
        assert!(!ConnectionState::from(RTCPeerConnectionState::Connecting).is_terminal());
    }
}
