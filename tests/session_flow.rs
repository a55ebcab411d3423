//! End-to-end session flows against a scripted signaling server and a
//! channel-backed transport, covering join/offer/answer routing, roster
//! bookkeeping, screen-share swaps, and teardown.

use async_trait::async_trait;
use classmesh::media::{LocalTrack, TrackKind};
use classmesh::peer::{PeerTransport, TransportEvent, TransportEventSender, TransportFactory};
use classmesh::signaling::{IceCandidatePayload, SdpKind, SdpPayload, SignalMessage, UserInfo};
use classmesh::{
    ConnectionStatus, Error, Result, RoomSession, SessionConfig, SessionState, SyntheticCapture,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted in-process signaling endpoint for one client.
///
/// Frames from the client surface on `from_client`; the test injects
/// server-to-client traffic through `push`.
struct SignalingStub {
    url: String,
    to_client: mpsc::UnboundedSender<SignalMessage>,
    from_client: mpsc::UnboundedReceiver<SignalMessage>,
    task: tokio::task::JoinHandle<()>,
}

impl SignalingStub {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<SignalMessage>();
        let (recv_tx, recv_rx) = mpsc::unbounded_channel::<SignalMessage>();

        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            loop {
                tokio::select! {
                    frame = ws.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(msg) = serde_json::from_str(&text) {
                                let _ = recv_tx.send(msg);
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    msg = push_rx.recv() => match msg {
                        Some(msg) => {
                            let json = serde_json::to_string(&msg).unwrap();
                            if ws.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self {
            url: format!("ws://{}", addr),
            to_client: push_tx,
            from_client: recv_rx,
            task,
        }
    }

    fn push(&self, msg: SignalMessage) {
        self.to_client.send(msg).unwrap();
    }

    async fn next_from_client(&mut self) -> SignalMessage {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection")
    }

    /// Remaining frames after the client hung up
    async fn drain(mut self) -> Vec<SignalMessage> {
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
        let mut frames = Vec::new();
        while let Ok(msg) = self.from_client.try_recv() {
            frames.push(msg);
        }
        frames
    }
}

/// Transport double that records negotiation activity per peer
struct MeshTransport {
    peer_id: String,
    events: TransportEventSender,
    offers_created: AtomicUsize,
    offers_received: AtomicUsize,
    answers_received: AtomicUsize,
    candidates_added: parking_lot::Mutex<Vec<String>>,
    attached: parking_lot::Mutex<Vec<(TrackKind, String)>>,
    video_swaps: parking_lot::Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl MeshTransport {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn attached_video_count(&self) -> usize {
        self.attached
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == TrackKind::Video)
            .count()
    }
}

#[async_trait]
impl PeerTransport for MeshTransport {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn create_offer(&self) -> Result<SdpPayload> {
        self.offers_created.fetch_add(1, Ordering::SeqCst);
        Ok(SdpPayload::offer(format!("v=0 offer-to-{}", self.peer_id)))
    }

    async fn accept_offer(&self, _offer: SdpPayload) -> Result<SdpPayload> {
        self.offers_received.fetch_add(1, Ordering::SeqCst);
        Ok(SdpPayload::answer(format!(
            "v=0 answer-to-{}",
            self.peer_id
        )))
    }

    async fn accept_answer(&self, _answer: SdpPayload) -> Result<()> {
        self.answers_received.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidatePayload) -> Result<()> {
        self.candidates_added.lock().push(candidate.candidate);
        Ok(())
    }

    async fn attach_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        self.attached
            .lock()
            .push((track.kind(), track.id().to_string()));
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        self.video_swaps.lock().push(track.id().to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out [`MeshTransport`]s and keeping them inspectable
#[derive(Default)]
struct MeshFactory {
    transports: parking_lot::Mutex<HashMap<String, Arc<MeshTransport>>>,
}

impl MeshFactory {
    fn get(&self, peer_id: &str) -> Option<Arc<MeshTransport>> {
        self.transports.lock().get(peer_id).cloned()
    }
}

#[async_trait]
impl TransportFactory for MeshFactory {
    async fn create(
        &self,
        peer_id: &str,
        _config: &SessionConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = Arc::new(MeshTransport {
            peer_id: peer_id.to_string(),
            events,
            offers_created: AtomicUsize::new(0),
            offers_received: AtomicUsize::new(0),
            answers_received: AtomicUsize::new(0),
            candidates_added: parking_lot::Mutex::new(Vec::new()),
            attached: parking_lot::Mutex::new(Vec::new()),
            video_swaps: parking_lot::Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        self.transports
            .lock()
            .insert(peer_id.to_string(), Arc::clone(&transport));
        Ok(transport)
    }
}

fn config(url: &str, user_id: &str) -> SessionConfig {
    SessionConfig {
        signaling_url: url.to_string(),
        room_id: "lecture-42".to_string(),
        user_id: Some(user_id.to_string()),
        display_name: user_id.to_string(),
        ..Default::default()
    }
}

async fn join(
    stub: &SignalingStub,
    capture: Arc<SyntheticCapture>,
) -> (RoomSession, Arc<MeshFactory>) {
    let factory = Arc::new(MeshFactory::default());
    let session = RoomSession::join(
        config(&stub.url, "alice"),
        capture,
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    )
    .await
    .unwrap();
    (session, factory)
}

async fn wait_for_state(
    session: &RoomSession,
    what: &str,
    cond: impl Fn(&SessionState) -> bool,
) -> SessionState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = session.state();
        if cond(&state) {
            return state;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}; last state: {:?}", what, state);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn bob() -> UserInfo {
    UserInfo::new("bob", "Bob")
}

fn alice() -> UserInfo {
    UserInfo::new("alice", "alice")
}

#[tokio::test]
async fn test_join_announces_itself_and_connects() {
    let mut stub = SignalingStub::start().await;
    let (session, _) = join(&stub, Arc::new(SyntheticCapture::new())).await;

    match stub.next_from_client().await {
        SignalMessage::JoinRoom { room_id, user } => {
            assert_eq!(room_id, "lecture-42");
            assert_eq!(user.id, "alice");
        }
        other => panic!("expected join-room, got {:?}", other),
    }

    let state = wait_for_state(&session, "connected status", |s| {
        s.status == ConnectionStatus::Connected
    })
    .await;
    assert!(state.media.audio_enabled);
    assert!(state.media.video_enabled);

    session.leave().await;
}

#[tokio::test]
async fn test_newcomer_gets_an_offer_from_us() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await; // join-room

    // the room was empty before the newcomer
    stub.push(SignalMessage::RoomInfo {
        participants: vec![alice()],
    });
    stub.push(SignalMessage::UserJoined {
        user: bob(),
        participants: vec![alice(), bob()],
    });

    match stub.next_from_client().await {
        SignalMessage::Offer {
            room_id,
            user_id,
            to,
            offer,
        } => {
            assert_eq!(room_id, "lecture-42");
            assert_eq!(user_id, "alice");
            assert_eq!(to, "bob");
            assert_eq!(offer.kind, SdpKind::Offer);
        }
        other => panic!("expected offer, got {:?}", other),
    }

    let state = wait_for_state(&session, "bob in roster", |s| s.participant("bob").is_some()).await;
    assert_eq!(state.participants.len(), 1);

    // both local tracks went onto the new connection
    let transport = factory.get("bob").expect("transport for bob");
    assert_eq!(transport.attached.lock().len(), 2);
    assert_eq!(transport.offers_created.load(Ordering::SeqCst), 1);

    stub.push(SignalMessage::Answer {
        room_id: "lecture-42".to_string(),
        user_id: "bob".to_string(),
        to: "alice".to_string(),
        answer: SdpPayload::answer("v=0"),
    });
    wait_until("answer applied", || {
        transport.answers_received.load(Ordering::SeqCst) == 1
    })
    .await;

    session.leave().await;
}

#[tokio::test]
async fn test_existing_member_offer_is_answered() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await; // join-room

    // bob was already in the room; he initiates, we only answer
    stub.push(SignalMessage::RoomInfo {
        participants: vec![bob(), alice()],
    });
    stub.push(SignalMessage::Offer {
        room_id: "lecture-42".to_string(),
        user_id: "bob".to_string(),
        to: "alice".to_string(),
        offer: SdpPayload::offer("v=0"),
    });

    match stub.next_from_client().await {
        SignalMessage::Answer { to, answer, .. } => {
            assert_eq!(to, "bob");
            assert_eq!(answer.kind, SdpKind::Answer);
        }
        other => panic!("expected answer, got {:?}", other),
    }

    let transport = factory.get("bob").expect("transport for bob");
    assert_eq!(transport.offers_received.load(Ordering::SeqCst), 1);
    assert_eq!(transport.offers_created.load(Ordering::SeqCst), 0);

    wait_for_state(&session, "bob in roster", |s| s.participant("bob").is_some()).await;
    session.leave().await;
}

#[tokio::test]
async fn test_remote_tracks_surface_and_leave_removes_them() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    stub.push(SignalMessage::UserJoined {
        user: bob(),
        participants: vec![alice(), bob()],
    });
    let _ = stub.next_from_client().await; // offer to bob
    let transport = factory.get("bob").expect("transport for bob");

    transport.emit(TransportEvent::RemoteTrack {
        peer_id: "bob".to_string(),
        stream_id: "bob-stream".to_string(),
        track_id: "bob-audio".to_string(),
        kind: TrackKind::Audio,
    });
    transport.emit(TransportEvent::RemoteTrack {
        peer_id: "bob".to_string(),
        stream_id: "bob-stream".to_string(),
        track_id: "bob-video".to_string(),
        kind: TrackKind::Video,
    });

    let state = wait_for_state(&session, "bob's stream", |s| {
        s.remote_stream("bob").map(|r| r.audio && r.video) == Some(true)
    })
    .await;
    assert_eq!(state.remote_streams.len(), 1);

    stub.push(SignalMessage::UserLeft {
        user: bob(),
        participants: vec![alice()],
    });
    wait_for_state(&session, "bob gone", |s| {
        s.participants.is_empty() && s.remote_streams.is_empty()
    })
    .await;
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);

    session.leave().await;
}

#[tokio::test]
async fn test_candidate_for_unknown_peer_is_tolerated() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    // nobody called "ghost" has a connection; this must be swallowed
    stub.push(SignalMessage::IceCandidate {
        room_id: "lecture-42".to_string(),
        user_id: "ghost".to_string(),
        to: "alice".to_string(),
        candidate: IceCandidatePayload {
            candidate: "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        },
    });

    // the session keeps working for real peers
    stub.push(SignalMessage::UserJoined {
        user: bob(),
        participants: vec![alice(), bob()],
    });
    match stub.next_from_client().await {
        SignalMessage::Offer { to, .. } => assert_eq!(to, "bob"),
        other => panic!("expected offer, got {:?}", other),
    }

    let state = wait_for_state(&session, "bob in roster", |s| s.participant("bob").is_some()).await;
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert!(factory.get("ghost").is_none());

    session.leave().await;
}

#[tokio::test]
async fn test_candidates_route_to_the_right_peer() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    stub.push(SignalMessage::Offer {
        room_id: "lecture-42".to_string(),
        user_id: "bob".to_string(),
        to: "alice".to_string(),
        offer: SdpPayload::offer("v=0"),
    });
    let _ = stub.next_from_client().await; // answer

    stub.push(SignalMessage::IceCandidate {
        room_id: "lecture-42".to_string(),
        user_id: "bob".to_string(),
        to: "alice".to_string(),
        candidate: IceCandidatePayload {
            candidate: "candidate:42 1 udp 1 10.0.0.2 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        },
    });

    let transport = factory.get("bob").expect("transport for bob");
    wait_until("candidate delivered", || {
        !transport.candidates_added.lock().is_empty()
    })
    .await;
    assert!(transport.candidates_added.lock()[0].contains("candidate:42"));

    // and ours go out addressed to bob
    transport.emit(TransportEvent::Candidate {
        peer_id: "bob".to_string(),
        candidate: IceCandidatePayload {
            candidate: "candidate:7 1 udp 1 10.0.0.1 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        },
    });
    match stub.next_from_client().await {
        SignalMessage::IceCandidate { to, candidate, .. } => {
            assert_eq!(to, "bob");
            assert!(candidate.candidate.contains("candidate:7"));
        }
        other => panic!("expected ice-candidate, got {:?}", other),
    }

    session.leave().await;
}

#[tokio::test]
async fn test_screen_share_swaps_in_place_and_back() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    stub.push(SignalMessage::UserJoined {
        user: bob(),
        participants: vec![alice(), bob()],
    });
    let _ = stub.next_from_client().await; // offer
    let transport = factory.get("bob").expect("transport for bob");

    session.start_screen_share().await.unwrap();
    let state = wait_for_state(&session, "sharing", |s| s.media.screen_sharing).await;
    assert!(state.media.video_enabled);
    assert_eq!(transport.video_swaps.lock().len(), 1);

    session.stop_screen_share().await.unwrap();
    let state = wait_for_state(&session, "not sharing", |s| !s.media.screen_sharing).await;
    assert!(state.media.video_enabled);
    assert_eq!(transport.video_swaps.lock().len(), 2);

    // swaps reuse the negotiated sender; only the original camera was attached
    assert_eq!(transport.attached_video_count(), 1);

    session.leave().await;
}

#[tokio::test]
async fn test_join_without_media_defers_until_screen_share() {
    let mut stub = SignalingStub::start().await;
    let capture = Arc::new(SyntheticCapture::new());
    capture.fail_next_user_media(Error::MediaAccessDenied("permission dismissed".to_string()));

    let (session, factory) = join(&stub, Arc::clone(&capture)).await;
    let _ = stub.next_from_client().await;

    let state = wait_for_state(&session, "capture error recorded", |s| s.error.is_some()).await;
    assert!(state.error.unwrap().contains("Media access denied"));
    assert!(!state.media.audio_enabled);

    // a newcomer appears, but with no local media we cannot usefully offer
    stub.push(SignalMessage::UserJoined {
        user: bob(),
        participants: vec![alice(), bob()],
    });
    wait_for_state(&session, "bob in roster", |s| s.participant("bob").is_some()).await;
    assert!(factory.get("bob").is_none());

    // screen capture brings the first local track; the held-back peer gets
    // dialed now
    session.start_screen_share().await.unwrap();
    match stub.next_from_client().await {
        SignalMessage::Offer { to, .. } => assert_eq!(to, "bob"),
        other => panic!("expected offer, got {:?}", other),
    }
    let transport = factory.get("bob").expect("transport for bob");
    assert_eq!(transport.attached_video_count(), 1);

    session.leave().await;
}

#[tokio::test]
async fn test_toggles_flow_through_to_state() {
    let mut stub = SignalingStub::start().await;
    let (session, _) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    assert!(!session.toggle_audio().await.unwrap());
    let state = wait_for_state(&session, "audio muted", |s| !s.media.audio_enabled).await;
    assert!(state.media.video_enabled);

    assert!(session.toggle_audio().await.unwrap());
    wait_for_state(&session, "audio unmuted", |s| s.media.audio_enabled).await;

    session.leave().await;
}

#[tokio::test]
async fn test_leave_tears_down_everything_once() {
    let mut stub = SignalingStub::start().await;
    let (session, factory) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    stub.push(SignalMessage::UserJoined {
        user: bob(),
        participants: vec![alice(), bob()],
    });
    let _ = stub.next_from_client().await; // offer
    let transport = factory.get("bob").expect("transport for bob");

    session.leave().await;
    session.leave().await; // second call is a no-op

    let state = session.state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert!(state.participants.is_empty());
    assert!(state.remote_streams.is_empty());
    assert!(!state.media.audio_enabled);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);

    // facade commands now report the session as gone
    assert!(matches!(
        session.toggle_audio().await,
        Err(Error::SessionClosed)
    ));

    // exactly one leave-room went over the wire
    let frames = stub.drain().await;
    let leaves = frames
        .iter()
        .filter(|m| matches!(m, SignalMessage::LeaveRoom { .. }))
        .count();
    assert_eq!(leaves, 1);
}

#[tokio::test]
async fn test_signaling_drop_marks_disconnected() {
    let mut stub = SignalingStub::start().await;
    let (session, _) = join(&stub, Arc::new(SyntheticCapture::new())).await;
    let _ = stub.next_from_client().await;

    wait_for_state(&session, "connected", |s| {
        s.status == ConnectionStatus::Connected
    })
    .await;

    // kill the server socket without a goodbye
    stub.task.abort();

    wait_for_state(&session, "disconnected", |s| {
        s.status == ConnectionStatus::Disconnected
    })
    .await;

    session.leave().await;
}
