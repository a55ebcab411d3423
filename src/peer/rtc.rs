//! WebRTC-backed [`PeerTransport`]
//!
//! Wraps one `RTCPeerConnection` per remote peer. Engine callbacks are
//! translated into [`TransportEvent`]s on the session queue; nothing in here
//! touches session state directly.

use crate::config::SessionConfig;
use crate::media::{LocalTrack, TrackKind};
use crate::peer::transport::{
    PeerTransport, TransportEvent, TransportEventSender, TransportFactory,
};
use crate::signaling::{IceCandidatePayload, SdpPayload};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

/// ICE server list in engine form
fn ice_servers(config: &SessionConfig) -> Vec<RTCIceServer> {
    let mut servers = vec![RTCIceServer {
        urls: config.stun_servers.clone(),
        ..Default::default()
    }];
    for turn in &config.turn_servers {
        servers.push(RTCIceServer {
            urls: vec![turn.url.clone()],
            username: turn.username.clone(),
            credential: turn.credential.clone(),
        });
    }
    servers
}

/// One WebRTC peer connection toward a single remote peer
pub struct RtcPeerTransport {
    peer_id: String,
    pc: Arc<RTCPeerConnection>,
    /// Negotiated outgoing video sender, kept for in-place track swaps
    video_sender: parking_lot::Mutex<Option<Arc<RTCRtpSender>>>,
    closed: AtomicBool,
}

impl RtcPeerTransport {
    /// Create the connection and install engine callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeerNegotiationError`] when the engine rejects the
    /// configuration.
    pub async fn new(
        peer_id: &str,
        config: &SessionConfig,
        events: TransportEventSender,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| negotiation_err(peer_id, e))?;

        let registry = Registry::new();
        let registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| negotiation_err(peer_id, e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| negotiation_err(peer_id, e))?,
        );
        debug!(peer_id = %peer_id, "Peer connection created");

        let transport = Self {
            peer_id: peer_id.to_string(),
            pc,
            video_sender: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        transport.install_callbacks(events);
        Ok(transport)
    }

    fn install_callbacks(&self, events: TransportEventSender) {
        let tx = events.clone();
        let peer_id = self.peer_id.clone();
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            let peer_id = peer_id.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!(peer_id = %peer_id, "ICE gathering finished");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let event = TransportEvent::Candidate {
                            peer_id: peer_id.clone(),
                            candidate: IceCandidatePayload {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            },
                        };
                        if tx.send(event).is_err() {
                            debug!(peer_id = %peer_id, "Event queue closed, dropping candidate");
                        }
                    }
                    Err(e) => {
                        warn!(peer_id = %peer_id, "Failed to serialize ICE candidate: {}", e);
                    }
                }
            })
        }));

        let tx = events.clone();
        let peer_id = self.peer_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state| {
                let tx = tx.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    debug!(peer_id = %peer_id, state = ?state, "Peer connection state changed");
                    let event = match state {
                        RTCPeerConnectionState::Connected => Some(TransportEvent::Connected {
                            peer_id: peer_id.clone(),
                        }),
                        RTCPeerConnectionState::Failed => Some(TransportEvent::Failed {
                            peer_id: peer_id.clone(),
                            reason: "connectivity check failed".to_string(),
                        }),
                        RTCPeerConnectionState::Closed => Some(TransportEvent::Closed {
                            peer_id: peer_id.clone(),
                        }),
                        _ => None,
                    };
                    if let Some(event) = event {
                        if tx.send(event).is_err() {
                            debug!(peer_id = %peer_id, "Event queue closed, dropping state event");
                        }
                    }
                })
            }));

        let tx = events;
        let peer_id = self.peer_id.clone();
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = tx.clone();
            let peer_id = peer_id.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Unspecified => {
                        warn!(peer_id = %peer_id, "Remote track with unspecified kind, ignoring");
                        return;
                    }
                };
                debug!(
                    peer_id = %peer_id,
                    track_id = %track.id(),
                    kind = kind.as_str(),
                    "Remote track arrived"
                );
                let event = TransportEvent::RemoteTrack {
                    peer_id: peer_id.clone(),
                    stream_id: track.stream_id(),
                    track_id: track.id(),
                    kind,
                };
                if tx.send(event).is_err() {
                    debug!(peer_id = %peer_id, "Event queue closed, dropping remote track");
                }
            })
        }));
    }

    fn err(&self, e: impl std::fmt::Display) -> Error {
        negotiation_err(&self.peer_id, e)
    }
}

fn negotiation_err(peer_id: &str, e: impl std::fmt::Display) -> Error {
    Error::PeerNegotiationError {
        peer_id: peer_id.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn create_offer(&self) -> Result<SdpPayload> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| self.err(e))?;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| self.err(e))?;

        // Candidates trickle separately; the offer goes out before gathering
        // completes.
        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| self.err("local description missing after offer"))?;
        Ok(SdpPayload::offer(local.sdp))
    }

    async fn accept_offer(&self, offer: SdpPayload) -> Result<SdpPayload> {
        let remote = RTCSessionDescription::offer(offer.sdp).map_err(|e| self.err(e))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| self.err(e))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| self.err(e))?;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| self.err(e))?;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| self.err("local description missing after answer"))?;
        Ok(SdpPayload::answer(local.sdp))
    }

    async fn accept_answer(&self, answer: SdpPayload) -> Result<()> {
        let remote = RTCSessionDescription::answer(answer.sdp).map_err(|e| self.err(e))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| self.err(e))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidatePayload) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| self.err(e))
    }

    async fn attach_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        let sender = self
            .pc
            .add_track(track.rtp_track() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| self.err(e))?;

        if track.kind() == TrackKind::Video {
            *self.video_sender.lock() = Some(sender);
        }
        debug!(
            peer_id = %self.peer_id,
            track_id = %track.id(),
            "Local track attached"
        );
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        let sender = self.video_sender.lock().clone();
        match sender {
            Some(sender) => {
                sender
                    .replace_track(Some(track.rtp_track() as Arc<dyn TrackLocal + Send + Sync>))
                    .await
                    .map_err(|e| self.err(e))?;
                debug!(
                    peer_id = %self.peer_id,
                    track_id = %track.id(),
                    "Video track replaced"
                );
                Ok(())
            }
            None => {
                // No negotiated video sender yet; attach instead. The track
                // starts flowing on the next negotiation.
                warn!(peer_id = %self.peer_id, "No video sender to swap, attaching track");
                self.attach_track(track).await
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(peer_id = %self.peer_id, "Closing peer connection");
        self.pc.close().await.map_err(|e| self.err(e))
    }
}

/// Factory producing [`RtcPeerTransport`]s
#[derive(Debug, Default)]
pub struct RtcTransportFactory;

impl RtcTransportFactory {
    /// New factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        config: &SessionConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = RtcPeerTransport::new(peer_id, config, events).await?;
        Ok(Arc::new(transport))
    }
}
