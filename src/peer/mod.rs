//! Peer connections: negotiation state, transport seam, WebRTC backend

pub mod connection;
pub mod manager;
pub mod rtc;
pub mod transport;

pub use connection::{ConnectionRole, ConnectionState, PeerConnection};
pub use manager::PeerManager;
pub use rtc::{RtcPeerTransport, RtcTransportFactory};
pub use transport::{PeerTransport, TransportEvent, TransportEventSender, TransportFactory};
