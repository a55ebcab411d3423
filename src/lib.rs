//! Mesh video-room session core
//!
//! This crate manages one participant's membership in a multi-party WebRTC
//! room: signaling, roster tracking, local media, and a full mesh of peer
//! connections.
//!
//! # Features
//!
//! - **Multi-peer mesh topology**: one peer connection per remote participant
//! - **Room signaling**: JSON messages over WebSocket (join/leave, roster
//!   snapshots, SDP, trickle ICE)
//! - **Local media lifecycle**: mute toggles without renegotiation,
//!   camera/screen substitution via in-place track swaps
//! - **Observable state**: one watch channel publishing roster, remote
//!   streams, media flags, and the last fault
//! - **Pluggable seams**: capture providers and peer transports are traits,
//!   so tests and headless deployments swap in synthetic implementations
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  RoomSession (facade)                                     │
//! │  ↓ commands / watch<SessionState>                         │
//! │  Driver task (single owner of mutable state)              │
//! │  ├─ SignalingChannel (JSON over WebSocket)                │
//! │  ├─ Roster (join-ordered participant registry)            │
//! │  ├─ MediaController (local tracks, screen share)          │
//! │  └─ PeerManager (mesh of PeerConnections)                 │
//! │      └─ PeerTransport (WebRTC engine per remote peer)     │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use classmesh::{RoomSession, SessionConfig, SyntheticCapture, RtcTransportFactory};
//! use std::sync::Arc;
//!
//! let config = SessionConfig {
//!     signaling_url: "ws://localhost:8088/signaling".to_string(),
//!     room_id: "lecture-42".to_string(),
//!     display_name: "alice".to_string(),
//!     ..Default::default()
//! };
//!
//! let session = RoomSession::join(
//!     config,
//!     Arc::new(SyntheticCapture::new()),
//!     Arc::new(RtcTransportFactory::new()),
//! )
//! .await?;
//!
//! let mut states = session.subscribe();
//! while states.changed().await.is_ok() {
//!     println!("{} participants", states.borrow().participants.len());
//! }
//!
//! session.leave().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod room;
pub mod session;
pub mod signaling;

// Re-exports for public API
pub use config::{SessionConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{CaptureSource, LocalMediaState, MediaConstraints, SyntheticCapture};
pub use peer::{RtcTransportFactory, TransportFactory};
pub use room::Participant;
pub use session::{ConnectionStatus, RemoteStream, RoomSession, SessionState};
pub use signaling::SignalMessage;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
