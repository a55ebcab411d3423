//! Signaling channel and wire protocol

pub mod channel;
pub mod protocol;

pub use channel::{ChannelEvent, SignalingChannel};
pub use protocol::{IceCandidatePayload, SdpKind, SdpPayload, SignalMessage, UserInfo};
