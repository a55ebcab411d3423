//! Session facade: the single owner that wires signaling, roster, media,
//! and peer connections together

pub mod session;
pub mod state;

pub use session::RoomSession;
pub use state::{ConnectionStatus, RemoteStream, SessionState};
