//! Session facade and event loop
//!
//! [`RoomSession::join`] spawns one driver task that owns every piece of
//! mutable session state: the signaling channel, the roster, the media
//! controller, and the peer set. Signaling traffic, transport callbacks,
//! track hooks, and facade commands all funnel into that task and are
//! handled one at a time, so no state is ever touched concurrently.

use crate::config::SessionConfig;
use crate::media::{CaptureSource, MediaConstraints, MediaController, TrackKind};
use crate::peer::{PeerManager, TransportEvent, TransportFactory};
use crate::room::{Participant, Roster};
use crate::session::state::{ConnectionStatus, RemoteStream, SessionState};
use crate::signaling::{ChannelEvent, SdpPayload, SignalMessage, SignalingChannel, UserInfo};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Facade commands, answered over oneshots
enum Command {
    ToggleAudio(oneshot::Sender<Result<bool>>),
    ToggleVideo(oneshot::Sender<Result<bool>>),
    StartScreenShare(oneshot::Sender<Result<()>>),
    StopScreenShare(oneshot::Sender<Result<()>>),
    Leave(oneshot::Sender<()>),
}

/// Notifications from local track hooks
enum MediaEvent {
    /// A screen track stopped outside our control (capture ended)
    ScreenTrackEnded { track_id: String },
}

/// Handle to a joined room.
///
/// All methods are cheap message sends to the driver task. Dropping the
/// handle tears the session down in the background; call [`leave`] to wait
/// for teardown to finish.
///
/// [`leave`]: RoomSession::leave
#[derive(Debug)]
pub struct RoomSession {
    local: UserInfo,
    room_id: String,
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<SessionState>,
}

impl RoomSession {
    /// Join a room: acquire local media, connect signaling, and start the
    /// session loop.
    ///
    /// A capture failure is recorded in [`SessionState::error`] and the
    /// join proceeds without local media; a signaling failure aborts the
    /// join and releases anything already acquired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a rejected configuration and
    /// [`Error::SignalingTransportError`] when the server is unreachable.
    pub async fn join(
        config: SessionConfig,
        capture: Arc<dyn CaptureSource>,
        transports: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let local = UserInfo::new(
            config
                .user_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            config.display_name.clone(),
        );
        info!(room = %config.room_id, user_id = %local.id, "Joining room");

        let mut media = MediaController::new(capture);
        let constraints = MediaConstraints {
            audio: config.audio,
            video: config.video,
        };
        let mut last_error = None;
        if let Err(e) = media.acquire(constraints).await {
            warn!("Joining without local media: {}", e);
            last_error = Some(e.to_string());
        }

        let (channel_tx, channel_events) = mpsc::channel(64);
        let channel = match SignalingChannel::connect(
            &config.signaling_url,
            &config.room_id,
            local.clone(),
            channel_tx,
        )
        .await
        {
            Ok(channel) => channel,
            Err(e) => {
                media.stop_all();
                return Err(e);
            }
        };

        let (transport_tx, transport_events) = mpsc::unbounded_channel();
        let peers = PeerManager::new(config.clone(), transports, transport_tx);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (media_tx, media_events) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());

        let driver = Driver {
            local_id: local.id.clone(),
            room_id: config.room_id.clone(),
            channel,
            media,
            peers,
            roster: Roster::new(local.id.clone()),
            status: ConnectionStatus::Connected,
            last_error,
            remote_streams: Vec::new(),
            state: state_tx,
            commands: commands_rx,
            channel_events,
            transport_events,
            media_events,
            media_events_tx: media_tx,
            closed: false,
        };
        tokio::spawn(driver.run());

        Ok(Self {
            local,
            room_id: config.room_id,
            commands: commands_tx,
            state_rx,
        })
    }

    /// Local participant ID in this room
    pub fn local_id(&self) -> &str {
        &self.local.id
    }

    /// Room this session joined
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    async fn command<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Flip the microphone mute flag, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaDeviceUnavailable`] without an audio track and
    /// [`Error::SessionClosed`] after [`leave`](RoomSession::leave).
    pub async fn toggle_audio(&self) -> Result<bool> {
        self.command(Command::ToggleAudio).await
    }

    /// Flip the video mute flag, returning the new state.
    pub async fn toggle_video(&self) -> Result<bool> {
        self.command(Command::ToggleVideo).await
    }

    /// Substitute a screen track for the camera on every connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScreenShareDenied`] when capture is refused; local
    /// media is left untouched in that case.
    pub async fn start_screen_share(&self) -> Result<()> {
        self.command(Command::StartScreenShare).await
    }

    /// End the screen share and swap a camera track back in.
    pub async fn stop_screen_share(&self) -> Result<()> {
        self.command(Command::StopScreenShare).await
    }

    /// Leave the room: stop local tracks, destroy every peer connection,
    /// close signaling, and mark the session disconnected.
    ///
    /// Idempotent; a second call returns immediately.
    pub async fn leave(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Leave(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }
}

/// Single owner of all mutable session state
struct Driver {
    local_id: String,
    room_id: String,
    channel: SignalingChannel,
    media: MediaController,
    peers: PeerManager,
    roster: Roster,

    status: ConnectionStatus,
    last_error: Option<String>,
    remote_streams: Vec<RemoteStream>,
    state: watch::Sender<SessionState>,

    commands: mpsc::UnboundedReceiver<Command>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
    media_events_tx: mpsc::UnboundedSender<MediaEvent>,

    closed: bool,
}

impl Driver {
    async fn run(mut self) {
        self.publish();
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    // every facade handle dropped
                    None => break,
                },
                event = self.channel_events.recv() => match event {
                    Some(event) => self.handle_channel_event(event).await,
                    None => break,
                },
                event = self.transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => break,
                },
                event = self.media_events.recv() => match event {
                    Some(event) => self.handle_media_event(event).await,
                    None => break,
                },
            }
        }
        self.teardown().await;
    }

    /// Returns true when the session should end
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::ToggleAudio(reply) => {
                let result = self.media.toggle_audio();
                self.publish();
                let _ = reply.send(result);
            }
            Command::ToggleVideo(reply) => {
                let result = self.media.toggle_video();
                self.publish();
                let _ = reply.send(result);
            }
            Command::StartScreenShare(reply) => {
                let _ = reply.send(self.start_screen_share().await);
            }
            Command::StopScreenShare(reply) => {
                let _ = reply.send(self.stop_screen_share().await);
            }
            Command::Leave(ack) => {
                self.teardown().await;
                let _ = ack.send(());
                return true;
            }
        }
        false
    }

    async fn start_screen_share(&mut self) -> Result<()> {
        let transports = self.peers.transports();
        match self.media.start_screen_share(&transports).await {
            Ok(screen) => {
                let events = self.media_events_tx.clone();
                let track_id = screen.id().to_string();
                screen.on_ended(move || {
                    let _ = events.send(MediaEvent::ScreenTrackEnded {
                        track_id: track_id.clone(),
                    });
                });
                // media may exist for the first time now
                self.sync_deferred().await;
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    async fn stop_screen_share(&mut self) -> Result<()> {
        let transports = self.peers.transports();
        match self.media.stop_screen_share(&transports).await {
            Ok(()) => {
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(msg) => self.handle_signal(msg).await,
            ChannelEvent::TransportError(detail) => {
                let err = Error::SignalingTransportError(detail);
                self.record_error(&err);
            }
            ChannelEvent::Closed => {
                info!("Signaling channel closed");
                self.status = ConnectionStatus::Disconnected;
                self.publish();
            }
        }
    }

    async fn handle_signal(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::RoomInfo { participants } => {
                let diff = self.roster.apply_snapshot(&participants);
                debug!(members = self.roster.len(), "Room info received");
                // existing members initiate toward us; we only wait
                self.remove_departed(&diff.removed).await;
                self.publish();
            }
            SignalMessage::UserJoined { user, participants } => {
                if user.id == self.local_id {
                    return;
                }
                info!(peer_id = %user.id, name = %user.name, "User joined");
                let diff = self.roster.apply_snapshot(&participants);
                self.remove_departed(&diff.removed).await;
                // we were here first, so we initiate toward the newcomer
                self.dial(&user.id).await;
                self.publish();
            }
            SignalMessage::UserLeft { user, participants } => {
                info!(peer_id = %user.id, name = %user.name, "User left");
                let diff = self.roster.apply_snapshot(&participants);
                self.drop_peer(&user.id).await;
                self.remove_departed(&diff.removed).await;
                self.publish();
            }
            SignalMessage::Offer {
                user_id, to, offer, ..
            } => {
                if to != self.local_id {
                    debug!(to = %to, "Offer not addressed to us, ignoring");
                    return;
                }
                let tracks = self.media.tracks();
                match self.peers.accept_offer_from(&user_id, offer, &tracks).await {
                    Ok(answer) => {
                        self.channel.send(&SignalMessage::Answer {
                            room_id: self.room_id.clone(),
                            user_id: self.local_id.clone(),
                            to: user_id,
                            answer,
                        });
                    }
                    Err(e) => {
                        warn!(peer_id = %user_id, "Failed to handle offer: {}", e);
                        self.record_error(&e);
                    }
                }
            }
            SignalMessage::Answer {
                user_id, to, answer, ..
            } => {
                if to != self.local_id {
                    return;
                }
                match self.peers.accept_answer_from(&user_id, answer).await {
                    Ok(()) => {}
                    Err(Error::UnknownPeerMessage(detail)) => {
                        debug!("Ignoring {}", detail);
                    }
                    Err(e) => {
                        warn!(peer_id = %user_id, "Failed to handle answer: {}", e);
                        self.record_error(&e);
                    }
                }
            }
            SignalMessage::IceCandidate {
                user_id,
                to,
                candidate,
                ..
            } => {
                if to != self.local_id {
                    return;
                }
                match self.peers.add_candidate_from(&user_id, candidate).await {
                    Ok(()) => {}
                    Err(Error::UnknownPeerMessage(detail)) => {
                        // teardown race, not an error
                        debug!("Ignoring {}", detail);
                    }
                    Err(e) => {
                        warn!(peer_id = %user_id, "Failed to add candidate: {}", e);
                    }
                }
            }
            SignalMessage::Error { error } => {
                warn!(error = %error, "Signaling server reported an error");
                self.last_error = Some(error);
                self.publish();
            }
            other => debug!(kind = other.name(), "Ignoring unexpected signal"),
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Candidate { peer_id, candidate } => {
                self.channel.send(&SignalMessage::IceCandidate {
                    room_id: self.room_id.clone(),
                    user_id: self.local_id.clone(),
                    to: peer_id,
                    candidate,
                });
            }
            TransportEvent::Connected { peer_id } => {
                if self.peers.mark_connected(&peer_id) {
                    info!(peer_id = %peer_id, "Peer connected");
                }
            }
            TransportEvent::Failed { peer_id, reason } => {
                warn!(peer_id = %peer_id, "Peer connection failed: {}", reason);
                self.peers.mark_failed(&peer_id);
                let err = Error::PeerNegotiationError {
                    peer_id: peer_id.clone(),
                    reason,
                };
                // the roster entry stays until the server says user-left
                self.drop_peer(&peer_id).await;
                self.record_error(&err);
            }
            TransportEvent::Closed { peer_id } => {
                self.drop_peer(&peer_id).await;
                self.publish();
            }
            TransportEvent::RemoteTrack {
                peer_id,
                stream_id,
                track_id,
                kind,
            } => {
                info!(
                    peer_id = %peer_id,
                    track_id = %track_id,
                    kind = kind.as_str(),
                    "Remote media available"
                );
                match self.remote_streams.iter_mut().find(|s| s.peer_id == peer_id) {
                    Some(stream) => {
                        stream.stream_id = stream_id;
                        match kind {
                            TrackKind::Audio => stream.audio = true,
                            TrackKind::Video => stream.video = true,
                        }
                    }
                    None => self.remote_streams.push(RemoteStream {
                        peer_id,
                        stream_id,
                        audio: kind == TrackKind::Audio,
                        video: kind == TrackKind::Video,
                    }),
                }
                self.publish();
            }
        }
    }

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::ScreenTrackEnded { track_id } => {
                let is_current = self
                    .media
                    .video_track()
                    .map(|t| t.id() == track_id)
                    .unwrap_or(false);
                if !self.media.state().screen_sharing || !is_current {
                    // stale notification from an already-replaced track
                    return;
                }
                info!("Screen track ended, stopping share");
                if let Err(e) = self.stop_screen_share().await {
                    warn!("Failed to revert ended screen share: {}", e);
                }
            }
        }
    }

    /// Initiate toward a newcomer and relay the offer
    async fn dial(&mut self, peer_id: &str) {
        let tracks = self.media.tracks();
        match self.peers.connect_to(peer_id, &tracks).await {
            Ok(Some(offer)) => self.send_offer(peer_id.to_string(), offer),
            Ok(None) => {}
            Err(e) => {
                warn!(peer_id = %peer_id, "Failed to connect: {}", e);
                self.record_error(&e);
            }
        }
    }

    /// Dial peers whose connection was deferred for lack of local media
    async fn sync_deferred(&mut self) {
        let tracks = self.media.tracks();
        let offers = self.peers.catch_up(&tracks).await;
        for (peer_id, offer) in offers {
            self.send_offer(peer_id, offer);
        }
    }

    fn send_offer(&self, to: String, offer: SdpPayload) {
        self.channel.send(&SignalMessage::Offer {
            room_id: self.room_id.clone(),
            user_id: self.local_id.clone(),
            to,
            offer,
        });
    }

    async fn drop_peer(&mut self, peer_id: &str) {
        self.peers.destroy(peer_id).await;
        self.remote_streams.retain(|s| s.peer_id != peer_id);
    }

    async fn remove_departed(&mut self, removed: &[Participant]) {
        for participant in removed {
            debug!(peer_id = %participant.id, "Removing departed participant");
            self.drop_peer(&participant.id).await;
        }
    }

    fn record_error(&mut self, err: &Error) {
        self.last_error = Some(err.to_string());
        self.publish();
    }

    /// Full teardown: local tracks, then connections, then signaling.
    /// Idempotent; runs at most once per session.
    async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!(room = %self.room_id, "Leaving room");

        self.media.stop_all();
        self.peers.destroy_all().await;
        self.channel.close();

        self.roster.clear();
        self.remote_streams.clear();
        self.status = ConnectionStatus::Disconnected;
        self.publish();
    }

    fn publish(&self) {
        let _ = self.state.send_replace(SessionState {
            status: self.status,
            error: self.last_error.clone(),
            participants: self.roster.participants().to_vec(),
            remote_streams: self.remote_streams.clone(),
            media: self.media.state(),
        });
    }
}
