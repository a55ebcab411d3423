//! Error types for classmesh sessions

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in a media session
///
/// Device and transport faults are also mirrored into
/// [`SessionState::error`](crate::SessionState) so observers see the last
/// fault without catching it at a call site.
#[derive(Debug, Error)]
pub enum Error {
    /// Camera/microphone access was refused by the capture provider
    #[error("Media access denied: {0}")]
    MediaAccessDenied(String),

    /// No usable capture device was available
    #[error("Media device unavailable: {0}")]
    MediaDeviceUnavailable(String),

    /// Display capture was refused or cancelled
    #[error("Screen share denied: {0}")]
    ScreenShareDenied(String),

    /// Writing media samples to a local track failed
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// The signaling transport failed (connect, send, or mid-session)
    #[error("Signaling transport error: {0}")]
    SignalingTransportError(String),

    /// SDP or ICE handling failed for one peer connection
    #[error("Peer negotiation error for {peer_id}: {reason}")]
    PeerNegotiationError {
        /// Remote participant the connection belongs to
        peer_id: String,
        /// Failure detail from the transport
        reason: String,
    },

    /// A signaling message addressed a peer with no live connection.
    /// Expected during teardown races; logged and swallowed by the
    /// dispatch loop, never surfaced to callers.
    #[error("Message for unknown peer: {0}")]
    UnknownPeerMessage(String),

    /// Configuration rejected by [`SessionConfig::validate`](crate::SessionConfig::validate)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Wire (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A control operation was invoked after `leave()`
    #[error("Session closed")]
    SessionClosed,
}
