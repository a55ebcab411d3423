//! Transport seam between session logic and the WebRTC engine
//!
//! The rest of the crate negotiates against [`PeerTransport`] and creates
//! instances through [`TransportFactory`], never against the engine types
//! directly. Tests drive full negotiation flows with channel-backed mocks;
//! production wires in [`RtcTransportFactory`](crate::peer::rtc::RtcTransportFactory).

use crate::config::SessionConfig;
use crate::media::{LocalTrack, TrackKind};
use crate::signaling::{IceCandidatePayload, SdpPayload};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events pushed up from one peer transport into the session loop
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered and should be relayed to the peer
    Candidate {
        /// Peer the owning transport belongs to
        peer_id: String,
        /// Candidate in wire form
        candidate: IceCandidatePayload,
    },

    /// Connectivity reached the connected state
    Connected {
        /// Peer the owning transport belongs to
        peer_id: String,
    },

    /// Connectivity failed permanently
    Failed {
        /// Peer the owning transport belongs to
        peer_id: String,
        /// Failure detail for logging and the session error slot
        reason: String,
    },

    /// The transport closed
    Closed {
        /// Peer the owning transport belongs to
        peer_id: String,
    },

    /// A remote media track started arriving
    RemoteTrack {
        /// Peer the track comes from
        peer_id: String,
        /// Stream the track belongs to
        stream_id: String,
        /// Remote track ID
        track_id: String,
        /// Audio or video
        kind: TrackKind,
    },
}

/// Sender half used by transports to report events
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// One negotiable media transport toward a single remote peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Peer this transport belongs to
    fn peer_id(&self) -> &str;

    /// Create and install a local offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeerNegotiationError`](crate::Error::PeerNegotiationError)
    /// when offer creation or installation fails.
    async fn create_offer(&self) -> Result<SdpPayload>;

    /// Install a remote offer and produce the local answer.
    async fn accept_offer(&self, offer: SdpPayload) -> Result<SdpPayload>;

    /// Install the remote answer to a previously created offer.
    async fn accept_answer(&self, answer: SdpPayload) -> Result<()>;

    /// Add a remote ICE candidate.
    async fn add_remote_candidate(&self, candidate: IceCandidatePayload) -> Result<()>;

    /// Attach a local track so its media is sent to the peer.
    async fn attach_track(&self, track: Arc<LocalTrack>) -> Result<()>;

    /// Swap the outgoing video track in place, without renegotiation.
    ///
    /// Used for the camera/screen substitution: the sender keeps its
    /// negotiated m-line and only the media source changes.
    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<()>;

    /// Close the transport. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Factory producing transports for new peers
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport for `peer_id`, reporting events on `events`.
    async fn create(
        &self,
        peer_id: &str,
        config: &SessionConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>>;
}
