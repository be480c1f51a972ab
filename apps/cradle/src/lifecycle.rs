//! Peer connection lifecycle: construction, event wiring, data channel
//! attach, message delivery, and revocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use cradle_proto::{Envelope, StoreStatus};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::LinkError;
use crate::peer::{ConnectionState, GatheringState, NegotiationPeer};
use crate::signaling::ExchangeApi;

pub type PeerCallback = Arc<dyn Fn(Arc<RtcPeer>) + Send + Sync>;
pub type TrackCallback = Arc<dyn Fn(Arc<TrackRemote>, Arc<RtcPeer>) + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(Bytes, Arc<RtcPeer>) + Send + Sync>;

/// Caller hooks for connection events.
#[derive(Clone, Default)]
pub struct PeerCallbacks {
    pub on_connect: Option<PeerCallback>,
    /// Fired for disconnected, failed, and closed alike.
    pub on_disconnect: Option<PeerCallback>,
    pub on_track: Option<TrackCallback>,
}

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    connection: watch::Sender<ConnectionState>,
    gathering: Arc<watch::Sender<GatheringState>>,
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
    parent_id: Mutex<Option<String>>,
    closed: AtomicBool,
}

fn build_api(setting: SettingEngine) -> Result<API, LinkError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_setting_engine(setting)
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

impl RtcPeer {
    /// Build a peer connection with `tracks` attached and `callbacks` wired.
    pub async fn new(
        callbacks: PeerCallbacks,
        tracks: Vec<LocalTrack>,
        ice_servers: &[String],
    ) -> Result<Arc<Self>, LinkError> {
        Self::with_settings(callbacks, tracks, ice_servers, SettingEngine::default()).await
    }

    /// As [`RtcPeer::new`], with transport-level settings such as a virtual network.
    pub async fn with_settings(
        callbacks: PeerCallbacks,
        tracks: Vec<LocalTrack>,
        ice_servers: &[String],
        setting: SettingEngine,
    ) -> Result<Arc<Self>, LinkError> {
        let api = build_api(setting)?;
        let mut config = RTCConfiguration::default();
        if !ice_servers.is_empty() {
            config.ice_servers = vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }];
        }
        let pc = Arc::new(api.new_peer_connection(config).await?);

        for track in tracks {
            pc.add_track(track).await?;
        }

        let peer = Arc::new(Self {
            pc,
            connection: watch::channel(ConnectionState::New).0,
            gathering: Arc::new(watch::channel(GatheringState::New).0),
            channel: Mutex::new(None),
            parent_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        peer.wire_events(callbacks);
        Ok(peer)
    }

    // Handlers hold a `Weak` so the connection does not keep its owner alive.
    fn wire_events(self: &Arc<Self>, callbacks: PeerCallbacks) {
        let weak = Arc::downgrade(self);
        let on_connect = callbacks.on_connect;
        let on_disconnect = callbacks.on_disconnect;
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let weak = weak.clone();
                let on_connect = on_connect.clone();
                let on_disconnect = on_disconnect.clone();
                Box::pin(async move {
                    let Some(peer) = weak.upgrade() else {
                        return;
                    };
                    let state = ConnectionState::from(state);
                    peer.connection.send_replace(state);
                    debug!(target = "cradle::lifecycle", ?state, "peer connection state changed");
                    if state == ConnectionState::Connected {
                        if let Some(callback) = on_connect {
                            callback(peer);
                        }
                    } else if state.is_terminal() {
                        if let Some(callback) = on_disconnect {
                            callback(peer);
                        }
                    }
                })
            }));

        let gathering = Arc::clone(&self.gathering);
        self.pc
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                let gathering = Arc::clone(&gathering);
                Box::pin(async move {
                    let state = GatheringState::from(state);
                    tracing::trace!(target = "cradle::lifecycle", ?state, "gathering state changed");
                    gathering.send_replace(state);
                })
            }));

        if let Some(on_track) = callbacks.on_track {
            let weak = Arc::downgrade(self);
            self.pc.on_track(Box::new(
                move |track: Arc<TrackRemote>,
                      _receiver: Arc<RTCRtpReceiver>,
                      _transceiver: Arc<RTCRtpTransceiver>| {
                    let weak = weak.clone();
                    let on_track = Arc::clone(&on_track);
                    Box::pin(async move {
                        if let Some(peer) = weak.upgrade() {
                            debug!(target = "cradle::lifecycle", kind = ?track.kind(), "remote track");
                            on_track(track, peer);
                        }
                    })
                },
            ));
        }
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Initiator side: open a channel now, wire it once it opens.
    pub async fn create_data_channel(
        self: &Arc<Self>,
        label: &str,
        on_message: MessageCallback,
    ) -> Result<(), LinkError> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let channel = self.pc.create_data_channel(label, Some(init)).await?;
        self.attach_data_channel(Some(channel), on_message);
        Ok(())
    }

    /// Wire `channel` if given, otherwise wait for the remote side to announce one.
    pub fn attach_data_channel(
        self: &Arc<Self>,
        channel: Option<Arc<RTCDataChannel>>,
        on_message: MessageCallback,
    ) {
        match channel {
            Some(channel) => wire_channel(Arc::downgrade(self), channel, on_message),
            None => {
                let weak = Arc::downgrade(self);
                self.pc
                    .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                        let weak = weak.clone();
                        let on_message = Arc::clone(&on_message);
                        Box::pin(async move {
                            debug!(
                                target = "cradle::lifecycle",
                                label = %channel.label(),
                                "remote data channel announced"
                            );
                            wire_channel(weak, channel, on_message);
                        })
                    }));
            }
        }
    }

    /// Deliver `payload` over the open data channel.
    ///
    /// Returns `false` when nothing was sent; the reason is logged, never raised.
    pub async fn send_message(&self, payload: impl Into<Bytes>) -> bool {
        let channel = self.channel.lock().clone();
        let Some(channel) = channel else {
            warn!(target = "cradle::lifecycle", "no data channel attached; message dropped");
            return false;
        };
        if channel.ready_state() != RTCDataChannelState::Open {
            warn!(
                target = "cradle::lifecycle",
                state = %channel.ready_state(),
                "data channel not open; message dropped"
            );
            return false;
        }
        match channel.send(&payload.into()).await {
            Ok(_) => true,
            Err(err) => {
                warn!(target = "cradle::lifecycle", error = %err, "data channel send failed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn commit_local(&self, description: RTCSessionDescription) -> Result<(), LinkError> {
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(description).await?;
        let gathering = Arc::clone(&self.gathering);
        let pc = Arc::downgrade(&self.pc);
        tokio::spawn(async move {
            // The promise resolves by dropping its sender, on completion and on teardown alike.
            let _ = gathered.recv().await;
            if gathering_finished(pc.upgrade().map(|pc| pc.ice_gathering_state())) {
                gathering.send_replace(GatheringState::Complete);
            } else {
                debug!(target = "cradle::lifecycle", "peer torn down before gathering completed");
            }
        });
        Ok(())
    }
}

fn gathering_finished(state: Option<RTCIceGatheringState>) -> bool {
    state == Some(RTCIceGatheringState::Complete)
}

fn wire_channel(peer: Weak<RtcPeer>, channel: Arc<RTCDataChannel>, on_message: MessageCallback) {
    let message_peer = peer.clone();
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let peer = message_peer.clone();
        let on_message = Arc::clone(&on_message);
        Box::pin(async move {
            if let Some(peer) = peer.upgrade() {
                on_message(message.data, peer);
            }
        })
    }));

    let opened = Arc::clone(&channel);
    channel.on_open(Box::new(move || {
        Box::pin(async move {
            let Some(peer) = peer.upgrade() else {
                return;
            };
            debug!(target = "cradle::lifecycle", label = %opened.label(), "data channel open");
            *peer.channel.lock() = Some(opened);
        })
    }));
}

#[async_trait]
impl NegotiationPeer for RtcPeer {
    async fn create_local_offer(&self) -> Result<(), LinkError> {
        let offer = self.pc.create_offer(None).await?;
        self.commit_local(offer).await
    }

    async fn create_local_answer(&self) -> Result<(), LinkError> {
        let answer = self.pc.create_answer(None).await?;
        self.commit_local(answer).await
    }

    async fn apply_remote_offer(&self, sdp: &str) -> Result<(), LinkError> {
        let description = RTCSessionDescription::offer(sdp.to_string())?;
        self.pc.set_remote_description(description).await?;
        Ok(())
    }

    async fn apply_remote_answer(&self, sdp: &str) -> Result<(), LinkError> {
        let description = RTCSessionDescription::answer(sdp.to_string())?;
        self.pc.set_remote_description(description).await?;
        Ok(())
    }

    async fn local_sdp(&self) -> Result<String, LinkError> {
        self.pc
            .local_description()
            .await
            .map(|description| description.sdp)
            .ok_or(LinkError::MissingLocalDescription)
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    fn gathering(&self) -> watch::Receiver<GatheringState> {
        self.gathering.subscribe()
    }

    fn set_parent_id(&self, parent_id: Option<String>) {
        *self.parent_id.lock() = parent_id;
    }

    fn parent_id(&self) -> Option<String> {
        self.parent_id.lock().clone()
    }

    async fn close(&self) -> Result<(), LinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.channel.lock().take();
        self.pc.close().await?;
        Ok(())
    }
}

/// Close every peer, then clear the exchange slot.
///
/// Close failures are logged and do not stop the clear. The clear is always
/// attempted; its failure is logged and returned.
pub async fn revoke<'a, P, E, I>(peers: I, exchange: &E) -> Result<StoreStatus, LinkError>
where
    P: NegotiationPeer + ?Sized + 'a,
    E: ExchangeApi + ?Sized,
    I: IntoIterator<Item = &'a P>,
{
    for peer in peers {
        if let Err(err) = peer.close().await {
            warn!(target = "cradle::lifecycle", error = %err, "closing peer during revoke failed");
        }
    }
    match exchange.store(&Envelope::Clear).await {
        Ok(status) => {
            debug!(target = "cradle::lifecycle", %status, "exchange cleared");
            Ok(status)
        }
        Err(err) => {
            warn!(target = "cradle::lifecycle", error = %err, "failed to clear exchange");
            Err(err)
        }
    }
}
