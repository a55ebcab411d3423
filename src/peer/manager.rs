//! Connection set for one room
//!
//! [`PeerManager`] owns every [`PeerConnection`] of the session, keyed by
//! remote peer ID. It decides when connections come into existence: eagerly
//! for inbound offers, deferred for outbound ones until local media exists,
//! because a stream-less initiator cannot produce a useful offer.

use crate::config::SessionConfig;
use crate::media::LocalTrack;
use crate::peer::connection::{ConnectionRole, PeerConnection};
use crate::peer::transport::{PeerTransport, TransportEventSender, TransportFactory};
use crate::signaling::{IceCandidatePayload, SdpPayload};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner of all peer connections in a session
pub struct PeerManager {
    config: SessionConfig,
    factory: Arc<dyn TransportFactory>,
    events: TransportEventSender,
    connections: HashMap<String, PeerConnection>,
    /// Peers we should initiate toward once local media is available,
    /// in arrival order
    deferred: Vec<String>,
}

impl PeerManager {
    /// New manager with no connections
    pub fn new(
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
        events: TransportEventSender,
    ) -> Self {
        Self {
            config,
            factory,
            events,
            connections: HashMap::new(),
            deferred: Vec::new(),
        }
    }

    /// Whether a live connection to `peer_id` exists
    pub fn contains(&self, peer_id: &str) -> bool {
        self.connections
            .get(peer_id)
            .map(|c| c.is_live())
            .unwrap_or(false)
    }

    /// Number of live connections
    pub fn live_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_live()).count()
    }

    /// Transports of all live connections, for track swaps
    pub fn transports(&self) -> Vec<Arc<dyn PeerTransport>> {
        self.connections
            .values()
            .filter(|c| c.is_live())
            .map(|c| c.transport())
            .collect()
    }

    fn at_capacity(&self) -> bool {
        self.live_count() >= self.config.max_peers as usize
    }

    /// Initiate a connection toward `peer_id`, attaching `tracks`, and
    /// return the offer to relay.
    ///
    /// Returns `Ok(None)` without side effects when a live connection
    /// already exists or the peer cap is reached, and with the peer queued
    /// when no local media is available yet.
    ///
    /// # Errors
    ///
    /// Propagates transport creation and negotiation failures.
    pub async fn connect_to(
        &mut self,
        peer_id: &str,
        tracks: &[Arc<LocalTrack>],
    ) -> Result<Option<SdpPayload>> {
        if self.contains(peer_id) {
            debug!(peer_id = %peer_id, "Connection already exists, skipping");
            return Ok(None);
        }
        if self.at_capacity() {
            warn!(
                peer_id = %peer_id,
                max_peers = self.config.max_peers,
                "Peer cap reached, not connecting"
            );
            return Ok(None);
        }
        if tracks.is_empty() {
            if !self.deferred.iter().any(|id| id == peer_id) {
                info!(peer_id = %peer_id, "Deferring connection until local media is available");
                self.deferred.push(peer_id.to_string());
            }
            return Ok(None);
        }

        info!(peer_id = %peer_id, "Connecting to peer");
        let transport = self
            .factory
            .create(peer_id, &self.config, self.events.clone())
            .await?;
        let mut conn = PeerConnection::new(peer_id, ConnectionRole::Initiator, transport);

        if let Err(e) = Self::attach_tracks(&conn, tracks).await {
            conn.destroy().await;
            return Err(e);
        }
        let offer = match conn.initiate().await {
            Ok(offer) => offer,
            Err(e) => {
                conn.destroy().await;
                return Err(e);
            }
        };

        self.connections.insert(peer_id.to_string(), conn);
        Ok(Some(offer))
    }

    /// Handle an inbound offer from `peer_id` and return the answer.
    ///
    /// Creates an answerer connection when none exists; an existing live
    /// connection treats the offer as renegotiation. Answerer connections
    /// are created even without local media.
    ///
    /// # Errors
    ///
    /// Fails when the peer cap is reached or negotiation fails.
    pub async fn accept_offer_from(
        &mut self,
        peer_id: &str,
        offer: SdpPayload,
        tracks: &[Arc<LocalTrack>],
    ) -> Result<SdpPayload> {
        // the peer reached us first; no need to initiate later
        self.deferred.retain(|id| id != peer_id);

        if self.contains(peer_id) {
            debug!(peer_id = %peer_id, "Renegotiation offer for existing connection");
            let conn = self.connections.get_mut(peer_id).ok_or_else(|| {
                Error::UnknownPeerMessage(format!("offer from {}", peer_id))
            })?;
            return conn.handle_offer(offer).await;
        }
        if self.at_capacity() {
            return Err(Error::PeerNegotiationError {
                peer_id: peer_id.to_string(),
                reason: format!("peer cap of {} reached", self.config.max_peers),
            });
        }

        info!(peer_id = %peer_id, "Answering offer from peer");
        let transport = self
            .factory
            .create(peer_id, &self.config, self.events.clone())
            .await?;
        let mut conn = PeerConnection::new(peer_id, ConnectionRole::Answerer, transport);

        if let Err(e) = Self::attach_tracks(&conn, tracks).await {
            conn.destroy().await;
            return Err(e);
        }
        let answer = match conn.handle_offer(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                conn.destroy().await;
                return Err(e);
            }
        };

        self.connections.insert(peer_id.to_string(), conn);
        Ok(answer)
    }

    async fn attach_tracks(conn: &PeerConnection, tracks: &[Arc<LocalTrack>]) -> Result<()> {
        let transport = conn.transport();
        for track in tracks {
            transport.attach_track(Arc::clone(track)).await?;
        }
        Ok(())
    }

    /// Apply a remote answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPeerMessage`] when no live connection exists;
    /// callers log and swallow it.
    pub async fn accept_answer_from(&mut self, peer_id: &str, answer: SdpPayload) -> Result<()> {
        match self.connections.get_mut(peer_id).filter(|c| c.is_live()) {
            Some(conn) => conn.handle_answer(answer).await,
            None => Err(Error::UnknownPeerMessage(format!(
                "answer from {}",
                peer_id
            ))),
        }
    }

    /// Apply a remote ICE candidate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPeerMessage`] when no live connection exists;
    /// callers log and swallow it.
    pub async fn add_candidate_from(
        &mut self,
        peer_id: &str,
        candidate: IceCandidatePayload,
    ) -> Result<()> {
        match self.connections.get_mut(peer_id).filter(|c| c.is_live()) {
            Some(conn) => conn.add_candidate(candidate).await,
            None => Err(Error::UnknownPeerMessage(format!(
                "ice-candidate from {}",
                peer_id
            ))),
        }
    }

    /// Record connectivity for `peer_id`; false when unknown
    pub fn mark_connected(&mut self, peer_id: &str) -> bool {
        match self.connections.get_mut(peer_id) {
            Some(conn) => {
                conn.mark_connected();
                true
            }
            None => false,
        }
    }

    /// Record terminal failure for `peer_id`; false when unknown
    pub fn mark_failed(&mut self, peer_id: &str) -> bool {
        match self.connections.get_mut(peer_id) {
            Some(conn) => {
                conn.mark_failed();
                true
            }
            None => false,
        }
    }

    /// Tear down the connection to `peer_id`.
    ///
    /// Returns whether a connection existed. Also clears any deferred entry
    /// so a departed peer is never connected to later.
    pub async fn destroy(&mut self, peer_id: &str) -> bool {
        self.deferred.retain(|id| id != peer_id);
        match self.connections.remove(peer_id) {
            Some(mut conn) => {
                conn.destroy().await;
                true
            }
            None => false,
        }
    }

    /// Tear down every connection
    pub async fn destroy_all(&mut self) {
        self.deferred.clear();
        for (_, mut conn) in self.connections.drain() {
            conn.destroy().await;
        }
    }

    /// Initiate toward every deferred peer now that `tracks` exist.
    ///
    /// Returns `(peer_id, offer)` pairs for the caller to relay.
    pub async fn catch_up(
        &mut self,
        tracks: &[Arc<LocalTrack>],
    ) -> Vec<(String, SdpPayload)> {
        if tracks.is_empty() || self.deferred.is_empty() {
            return Vec::new();
        }

        let pending = std::mem::take(&mut self.deferred);
        info!(count = pending.len(), "Connecting to deferred peers");

        let mut offers = Vec::new();
        for peer_id in pending {
            match self.connect_to(&peer_id, tracks).await {
                Ok(Some(offer)) => offers.push((peer_id, offer)),
                Ok(None) => {}
                Err(e) => warn!(peer_id = %peer_id, "Deferred connection failed: {}", e),
            }
        }
        offers
    }
}
