//! Per-peer negotiation state machine
//!
//! A [`PeerConnection`] tracks one remote peer: its negotiation role, its
//! lifecycle state, and the candidate buffer for the offer-before-candidate
//! race. The transport underneath is whatever the factory produced; this
//! layer never touches the engine directly.

use crate::peer::transport::PeerTransport;
use crate::signaling::{IceCandidatePayload, SdpPayload};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no negotiation started
    New,
    /// Offer/answer in flight
    Negotiating,
    /// Media-level connectivity established
    Connected,
    /// Terminal failure; never recovers
    Failed,
    /// Torn down
    Closed,
}

/// Which side of the offer/answer exchange this connection takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// We send the offer (we were already in the room when the peer joined)
    Initiator,
    /// We answer the peer's offer
    Answerer,
}

impl ConnectionRole {
    /// Lowercase name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Initiator => "initiator",
            ConnectionRole::Answerer => "answerer",
        }
    }
}

/// Negotiation state for a single remote peer
pub struct PeerConnection {
    peer_id: String,
    role: ConnectionRole,
    state: ConnectionState,
    transport: Arc<dyn PeerTransport>,

    /// Candidates received before the remote description, applied after
    pending_candidates: Vec<IceCandidatePayload>,
    remote_description_set: bool,
}

impl PeerConnection {
    /// Wrap a transport for `peer_id` in the given role
    pub fn new(peer_id: &str, role: ConnectionRole, transport: Arc<dyn PeerTransport>) -> Self {
        debug!(peer_id = %peer_id, role = role.as_str(), "Peer connection registered");
        Self {
            peer_id: peer_id.to_string(),
            role,
            state: ConnectionState::New,
            transport,
            pending_candidates: Vec::new(),
            remote_description_set: false,
        }
    }

    /// Remote peer ID
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Negotiation role
    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True until the connection fails or closes
    pub fn is_live(&self) -> bool {
        !matches!(self.state, ConnectionState::Failed | ConnectionState::Closed)
    }

    /// Transport handle, for track operations
    pub fn transport(&self) -> Arc<dyn PeerTransport> {
        Arc::clone(&self.transport)
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(
            "Peer {} state transition: {:?} -> {:?}",
            self.peer_id, self.state, next
        );
        self.state = next;
    }

    fn check_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(Error::PeerNegotiationError {
                peer_id: self.peer_id.clone(),
                reason: format!("connection is {:?}", self.state),
            })
        }
    }

    /// Start negotiation as the initiator and return the offer to relay.
    ///
    /// # Errors
    ///
    /// Fails when the connection is closed or the transport rejects the
    /// offer.
    pub async fn initiate(&mut self) -> Result<SdpPayload> {
        self.check_live()?;
        self.set_state(ConnectionState::Negotiating);
        self.transport.create_offer().await
    }

    /// Apply a remote offer and return the answer to relay.
    ///
    /// Also applied for renegotiation on an already-connected peer.
    pub async fn handle_offer(&mut self, offer: SdpPayload) -> Result<SdpPayload> {
        self.check_live()?;
        if self.state == ConnectionState::New {
            self.set_state(ConnectionState::Negotiating);
        }

        let answer = self.transport.accept_offer(offer).await?;
        self.remote_description_set = true;
        self.flush_candidates().await;
        Ok(answer)
    }

    /// Apply the remote answer to our offer.
    pub async fn handle_answer(&mut self, answer: SdpPayload) -> Result<()> {
        self.check_live()?;
        self.transport.accept_answer(answer).await?;
        self.remote_description_set = true;
        self.flush_candidates().await;
        Ok(())
    }

    /// Add a remote ICE candidate, buffering it when the remote description
    /// has not arrived yet.
    pub async fn add_candidate(&mut self, candidate: IceCandidatePayload) -> Result<()> {
        if !self.is_live() {
            debug!(peer_id = %self.peer_id, "Dropping candidate for dead connection");
            return Ok(());
        }
        if !self.remote_description_set {
            debug!(peer_id = %self.peer_id, "Buffering candidate until remote description");
            self.pending_candidates.push(candidate);
            return Ok(());
        }
        self.transport.add_remote_candidate(candidate).await
    }

    async fn flush_candidates(&mut self) {
        if self.pending_candidates.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_candidates);
        debug!(
            peer_id = %self.peer_id,
            count = pending.len(),
            "Applying buffered candidates"
        );
        for candidate in pending {
            if let Err(e) = self.transport.add_remote_candidate(candidate).await {
                warn!(peer_id = %self.peer_id, "Buffered candidate rejected: {}", e);
            }
        }
    }

    /// Record media-level connectivity
    pub fn mark_connected(&mut self) {
        if self.is_live() {
            self.set_state(ConnectionState::Connected);
        }
    }

    /// Record a terminal failure
    pub fn mark_failed(&mut self) {
        if self.state != ConnectionState::Closed {
            self.set_state(ConnectionState::Failed);
        }
    }

    /// Tear the connection down. Idempotent.
    pub async fn destroy(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.pending_candidates.clear();
        if let Err(e) = self.transport.close().await {
            warn!(peer_id = %self.peer_id, "Transport close failed: {}", e);
        }
        self.set_state(ConnectionState::Closed);
    }
}
