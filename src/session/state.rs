//! Observable session state
//!
//! One [`SessionState`] snapshot is published on a watch channel after every
//! state-changing event, so observers poll or await changes instead of
//! registering callbacks for each concern.

use crate::media::LocalMediaState;
use crate::room::Participant;

/// Signaling-level connectivity of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected (initial and final state)
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Signaling channel open and room joined
    Connected,
}

/// Remote media arriving from one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    /// Peer the media comes from
    pub peer_id: String,
    /// Remote stream ID, shared by the peer's tracks
    pub stream_id: String,
    /// An audio track has arrived
    pub audio: bool,
    /// A video track has arrived
    pub video: bool,
}

/// Snapshot of everything observable about a session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Signaling-level connectivity
    pub status: ConnectionStatus,

    /// Last fault, as a display string. Faults accumulate here instead of
    /// bubbling out of event handlers; the most recent one wins.
    pub error: Option<String>,

    /// Remote participants in join order
    pub participants: Vec<Participant>,

    /// Remote media, one entry per peer that has sent a track
    pub remote_streams: Vec<RemoteStream>,

    /// Local media flags
    pub media: LocalMediaState,
}

impl SessionState {
    /// Remote stream from `peer_id`, if any tracks arrived
    pub fn remote_stream(&self, peer_id: &str) -> Option<&RemoteStream> {
        self.remote_streams.iter().find(|s| s.peer_id == peer_id)
    }

    /// Participant by ID
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected_and_empty() {
        let state = SessionState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.error.is_none());
        assert!(state.participants.is_empty());
        assert!(state.remote_streams.is_empty());
        assert!(!state.media.audio_enabled);
    }

    #[test]
    fn test_remote_stream_lookup() {
        let state = SessionState {
            remote_streams: vec![RemoteStream {
                peer_id: "peer-b".to_string(),
                stream_id: "stream-1".to_string(),
                audio: true,
                video: false,
            }],
            ..Default::default()
        };

        assert!(state.remote_stream("peer-b").unwrap().audio);
        assert!(state.remote_stream("ghost").is_none());
    }
}
