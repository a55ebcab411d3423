//! Wire protocol for the signaling service
//!
//! JSON text frames over a persistent WebSocket, tagged by `type`.
//! Message and field names match the signaling service contract exactly
//! (`roomId`, `userId`, `sdpMid`, `sdpMLineIndex`), so every rename lives
//! here and nowhere else.

use serde::{Deserialize, Serialize};

/// A participant identity as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable participant ID
    pub id: String,
    /// Display name
    pub name: String,
}

impl UserInfo {
    /// Create a new user record
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// SDP direction of an [`SdpPayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Session description produced by the initiating side
    Offer,
    /// Session description produced in response to an offer
    Answer,
}

/// A session description as carried inside `offer`/`answer` messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpPayload {
    /// `offer` or `answer`
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Raw SDP text
    pub sdp: String,
}

impl SdpPayload {
    /// Wrap an offer SDP
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Wrap an answer SDP
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate as carried inside `ice-candidate` messages.
///
/// Field casing follows the browser `RTCIceCandidateInit` dictionary, which
/// is what the signaling service relays verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    /// Candidate line (`candidate:...`); empty signals end-of-candidates
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment, relayed when the source includes it
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

/// Every message exchanged with the signaling service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Client → server: enter a room
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Room to join
        room_id: String,
        /// Local identity
        user: UserInfo,
    },

    /// Client → server: exit a room
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        /// Room being left
        room_id: String,
        /// Local participant ID
        user_id: String,
    },

    /// Server → client: the roster grew
    UserJoined {
        /// Who joined
        user: UserInfo,
        /// Full roster after the join
        participants: Vec<UserInfo>,
    },

    /// Server → client: the roster shrank
    UserLeft {
        /// Who left
        user: UserInfo,
        /// Full roster after the departure
        participants: Vec<UserInfo>,
    },

    /// Server → client: full roster snapshot on join
    RoomInfo {
        /// Everyone currently in the room, local participant included
        participants: Vec<UserInfo>,
    },

    /// SDP offer, addressed to one peer (relayed both directions)
    #[serde(rename_all = "camelCase")]
    Offer {
        /// Room the exchange belongs to
        room_id: String,
        /// Sender participant ID
        user_id: String,
        /// Addressee participant ID
        to: String,
        /// The session description
        offer: SdpPayload,
    },

    /// SDP answer, addressed to one peer (relayed both directions)
    #[serde(rename_all = "camelCase")]
    Answer {
        /// Room the exchange belongs to
        room_id: String,
        /// Sender participant ID
        user_id: String,
        /// Addressee participant ID
        to: String,
        /// The session description
        answer: SdpPayload,
    },

    /// Trickled ICE candidate, addressed to one peer.
    /// Some service versions tag this `candidate`; both spellings parse.
    #[serde(rename_all = "camelCase", alias = "candidate")]
    IceCandidate {
        /// Room the exchange belongs to
        room_id: String,
        /// Sender participant ID
        user_id: String,
        /// Addressee participant ID
        to: String,
        /// The candidate
        candidate: IceCandidatePayload,
    },

    /// Server → client: server-reported fault
    Error {
        /// Human-readable description
        error: String,
    },
}

impl SignalMessage {
    /// Wire tag of this message, for logging
    pub fn name(&self) -> &'static str {
        match self {
            SignalMessage::JoinRoom { .. } => "join-room",
            SignalMessage::LeaveRoom { .. } => "leave-room",
            SignalMessage::UserJoined { .. } => "user-joined",
            SignalMessage::UserLeft { .. } => "user-left",
            SignalMessage::RoomInfo { .. } => "room-info",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::Error { .. } => "error",
        }
    }

    /// Sender participant ID for peer-addressed messages
    pub fn from_peer(&self) -> Option<&str> {
        match self {
            SignalMessage::Offer { user_id, .. }
            | SignalMessage::Answer { user_id, .. }
            | SignalMessage::IceCandidate { user_id, .. } => Some(user_id),
            _ => None,
        }
    }
}
