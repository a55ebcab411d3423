//! WebSocket signaling channel
//!
//! Exactly one logical connection per session. Outbound messages flow
//! through an unbounded queue into a sender task; a receiver task parses
//! inbound frames and forwards them as [`ChannelEvent`]s. The channel never
//! reconnects: a dropped transport surfaces as
//! [`ChannelEvent::TransportError`] and the session decides what to do.

use crate::signaling::protocol::{SignalMessage, UserInfo};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Events delivered by the receiver task
#[derive(Debug)]
pub enum ChannelEvent {
    /// A parsed inbound signaling message
    Message(SignalMessage),
    /// The transport failed; the channel is unusable afterwards
    TransportError(String),
    /// The transport closed (cleanly or after an error)
    Closed,
}

/// Persistent bidirectional channel to the signaling service
pub struct SignalingChannel {
    /// Room joined at connect time, echoed in the parting `leave-room`
    room_id: String,

    /// Local identity announced at connect time
    local: UserInfo,

    /// Outgoing frame sender
    tx: mpsc::UnboundedSender<Message>,

    /// False once the channel closed (either side)
    open: Arc<AtomicBool>,

    /// Receiver task handle, aborted on close so no task outlives the session
    recv_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SignalingChannel {
    /// Connect to the signaling service and enter `room_id`.
    ///
    /// Opens the WebSocket, spawns the sender/receiver tasks, and
    /// immediately sends `join-room`. Inbound traffic arrives on `events`.
    pub async fn connect(
        url: &str,
        room_id: &str,
        local: UserInfo,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<Self> {
        info!(url = %url, room = %room_id, "Connecting to signaling server");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::SignalingTransportError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::sender_task(write, rx));

        let recv_task = tokio::spawn(Self::receiver_task(
            read,
            tx.clone(),
            Arc::clone(&open),
            events,
        ));

        let channel = Self {
            room_id: room_id.to_string(),
            local,
            tx,
            open,
            recv_task: parking_lot::Mutex::new(Some(recv_task)),
        };

        channel.send(&SignalMessage::JoinRoom {
            room_id: channel.room_id.clone(),
            user: channel.local.clone(),
        });

        Ok(channel)
    }

    /// Sender task: drains the outbound queue into the WebSocket sink.
    /// A `Close` frame is the terminator; nothing is sent after it.
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
            if is_close {
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: parses inbound frames and forwards channel events.
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        tx: mpsc::UnboundedSender<Message>,
        open: Arc<AtomicBool>,
        events: mpsc::Sender<ChannelEvent>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                    Ok(msg) => {
                        debug!(kind = msg.name(), "Received signaling message");
                        if events.send(ChannelEvent::Message(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping unparseable signaling frame: {}", e);
                    }
                },
                Ok(Message::Ping(payload)) => {
                    let _ = tx.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => {
                    info!("Signaling connection closed by server");
                    break;
                }
                Err(e) => {
                    error!("Signaling transport error: {}", e);
                    let _ = events
                        .send(ChannelEvent::TransportError(e.to_string()))
                        .await;
                    break;
                }
                _ => {}
            }
        }

        open.store(false, Ordering::SeqCst);
        let _ = events.send(ChannelEvent::Closed).await;

        debug!("Signaling receiver task terminated");
    }

    /// Send a signaling message.
    ///
    /// Fire-and-forget per the protocol (no ack exists). Logs and drops the
    /// message when the channel is not open.
    pub fn send(&self, msg: &SignalMessage) {
        if !self.open.load(Ordering::SeqCst) {
            warn!(kind = msg.name(), "Dropping signaling message: channel not open");
            return;
        }

        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                error!(kind = msg.name(), "Failed to serialize signaling message: {}", e);
                return;
            }
        };

        debug!(kind = msg.name(), "Sending signaling message");
        if self.tx.send(Message::Text(json)).is_err() {
            warn!(kind = msg.name(), "Dropping signaling message: sender task gone");
        }
    }

    /// Whether the channel is still open from this side's point of view
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the channel.
    ///
    /// Best-effort sends `leave-room`, then a Close frame, then aborts the
    /// receiver task. Calling on an already-closed channel is a no-op.
    pub fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        let leave = SignalMessage::LeaveRoom {
            room_id: self.room_id.clone(),
            user_id: self.local.id.clone(),
        };
        if let Ok(json) = serde_json::to_string(&leave) {
            let _ = self.tx.send(Message::Text(json));
        }
        let _ = self.tx.send(Message::Close(None));

        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }

        info!(room = %self.room_id, "Signaling channel closed");
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::accept_async;

    /// One-shot in-process signaling endpoint: accepts a single connection
    /// and hands the raw WebSocket to the test body.
    async fn local_server() -> (String, tokio::task::JoinHandle<Vec<SignalMessage>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut received = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        received.push(serde_json::from_str::<SignalMessage>(&text).unwrap());
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            received
        });

        (format!("ws://{}", addr), server)
    }

    #[tokio::test]
    async fn test_connect_sends_join_room() {
        let (url, server) = local_server().await;
        let (events_tx, _events_rx) = mpsc::channel(16);

        let channel =
            SignalingChannel::connect(&url, "lecture-42", UserInfo::new("u1", "Alice"), events_tx)
                .await
                .unwrap();
        channel.close();

        let received = server.await.unwrap();
        assert_eq!(
            received[0],
            SignalMessage::JoinRoom {
                room_id: "lecture-42".to_string(),
                user: UserInfo::new("u1", "Alice"),
            }
        );
    }

    #[tokio::test]
    async fn test_close_sends_leave_room_once() {
        let (url, server) = local_server().await;
        let (events_tx, _events_rx) = mpsc::channel(16);

        let channel =
            SignalingChannel::connect(&url, "lecture-42", UserInfo::new("u1", "Alice"), events_tx)
                .await
                .unwrap();

        channel.close();
        channel.close();
        assert!(!channel.is_open());

        let received = server.await.unwrap();
        let leaves: Vec<_> = received
            .iter()
            .filter(|m| matches!(m, SignalMessage::LeaveRoom { .. }))
            .collect();
        assert_eq!(leaves.len(), 1);
    }

    #[tokio::test]
    async fn test_send_after_close_is_silent() {
        let (url, _server) = local_server().await;
        let (events_tx, _events_rx) = mpsc::channel(16);

        let channel =
            SignalingChannel::connect(&url, "lecture-42", UserInfo::new("u1", "Alice"), events_tx)
                .await
                .unwrap();
        channel.close();

        // Must not panic or error; the message is logged and dropped.
        channel.send(&SignalMessage::LeaveRoom {
            room_id: "lecture-42".to_string(),
            user_id: "u1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_inbound_messages_are_forwarded() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{}", addr);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // Consume join-room, then push a roster snapshot.
            let _ = ws.next().await;
            let snapshot = serde_json::to_string(&SignalMessage::RoomInfo {
                participants: vec![UserInfo::new("u1", "Alice"), UserInfo::new("u2", "Bob")],
            })
            .unwrap();
            ws.send(Message::Text(snapshot)).await.unwrap();
            // Hold the socket open until the client is done.
            let _ = ws.next().await;
        });

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let channel =
            SignalingChannel::connect(&url, "lecture-42", UserInfo::new("u1", "Alice"), events_tx)
                .await
                .unwrap();

        match events_rx.recv().await {
            Some(ChannelEvent::Message(SignalMessage::RoomInfo { participants })) => {
                assert_eq!(participants.len(), 2);
            }
            other => panic!("expected room-info, got {:?}", other),
        }

        channel.close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let (events_tx, _events_rx) = mpsc::channel(16);
        // Nothing listens on this port.
        let result = SignalingChannel::connect(
            "ws://127.0.0.1:9",
            "lecture-42",
            UserInfo::new("u1", "Alice"),
            events_tx,
        )
        .await;

        match result {
            Err(Error::SignalingTransportError(_)) => {}
            other => panic!("expected transport error, got {:?}", other.map(|_| ())),
        }
    }
}
